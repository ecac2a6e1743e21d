use std::path::PathBuf;

use clap::{Args, Subcommand};
use tokio::sync::Mutex;

use crate::cli::input::{self, InputError};
use crate::cli::op::{Op, OpContext};
use common::identity::{
    IdentityError, IdentityRegistry, IdentityService, Registration, RegistryError,
    SessionMissing,
};

crate::command_enum! {
    (New, NewIdentity),
    (Show, ShowIdentity),
}

pub type IdentityCommand = Command;

/// Create a new identity or show an existing one
#[derive(Args, Debug, Clone)]
pub struct Identity {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[async_trait::async_trait]
impl Op for Identity {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityOpError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Session(#[from] SessionMissing),
    #[error("typed phrase does not match; nothing was registered")]
    ConfirmationMismatch,
    #[error("failed to encode registration: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Keeps the registration payload instead of sending it anywhere, so it
/// can be printed for the relay server
#[derive(Debug, Default)]
struct CapturingRegistry {
    captured: Mutex<Option<Registration>>,
}

#[async_trait::async_trait]
impl IdentityRegistry for CapturingRegistry {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError> {
        *self.captured.lock().await = Some(registration.clone());
        Ok(())
    }
}

/// Generate a new identity and its recovery phrase
#[derive(Args, Debug, Clone)]
pub struct NewIdentity {
    /// Ask for the phrase to be typed back, then print the registration payload
    #[arg(long)]
    pub confirm: bool,
}

#[async_trait::async_trait]
impl Op for NewIdentity {
    type Error = IdentityOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let service = IdentityService::new();
        let pending = service.generate_new();

        let mut lines = vec![
            "Recovery phrase (write it down, it is shown only once):".to_string(),
            format!("  {}", pending.phrase().as_str()),
            String::new(),
            format!("Identity hash:         {}", pending.identity_hash()),
            format!("Signing public key:    {}", pending.signing_public_key()),
            format!("Encryption public key: {}", pending.encryption_public_key()),
        ];

        if !self.confirm {
            return Ok(lines.join("\n"));
        }

        eprintln!("{}", lines.join("\n"));
        eprintln!();
        eprintln!("Type the recovery phrase to confirm:");
        let typed = input::read_line().map_err(InputError::from)?;
        let confirmed = pending
            .confirm_with_phrase(&typed)
            .map_err(|_| IdentityOpError::ConfirmationMismatch)?;

        let registry = CapturingRegistry::default();
        service.register_identity(&registry, confirmed).await?;

        lines.clear();
        if let Some(registration) = registry.captured.lock().await.as_ref() {
            lines.push(serde_json::to_string_pretty(registration)?);
        }
        Ok(lines.join("\n"))
    }
}

/// Unlock an identity from its phrase and print its public keys
#[derive(Args, Debug, Clone)]
pub struct ShowIdentity {
    /// Read the phrase from this file instead of stdin
    #[arg(long)]
    pub phrase_file: Option<PathBuf>,
}

#[async_trait::async_trait]
impl Op for ShowIdentity {
    type Error = IdentityOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let phrase = input::read_phrase(self.phrase_file.as_deref())?;

        let service = IdentityService::new();
        let identity_hash = service.unlock_with_seed(phrase.as_str()).await?;
        let session = service.session().require()?;

        Ok(format!(
            "Identity hash:         {}\n\
             Signing public key:    {}\n\
             Encryption public key: {}",
            identity_hash,
            session.signing_public_key(),
            session.encryption_public_key(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_cli::state::AppConfig;

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn test_show_identity_golden_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrase.txt");
        std::fs::write(&path, TEST_PHRASE).unwrap();

        let ctx = OpContext {
            config_path: None,
            config: AppConfig::default(),
        };
        let output = ShowIdentity {
            phrase_file: Some(path),
        }
        .execute(&ctx)
        .await
        .unwrap();

        assert!(output
            .contains("93a3f05678d9f2a9f6b74b8fa84d49dd9b2a694d1926fb23f3e6f5e8a05797da"));
    }

    #[tokio::test]
    async fn test_new_identity_without_confirm() {
        let ctx = OpContext {
            config_path: None,
            config: AppConfig::default(),
        };
        let output = NewIdentity { confirm: false }.execute(&ctx).await.unwrap();
        assert!(output.contains("Recovery phrase"));
        assert!(output.contains("Identity hash:"));
    }
}
