use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::input;
use crate::cli::op::{Op, OpContext};
use common::crypto::{DocumentKey, KeyError};
use common::membership::{Invite as DocumentInvite, InviteError, InviteLink, InviteRecord};

crate::command_enum! {
    (Create, CreateInvite),
    (Accept, AcceptInvite),
}

pub type InviteCommand = Command;

/// Create or accept invite links
#[derive(Args, Debug, Clone)]
pub struct Invite {
    #[command(subcommand)]
    pub command: InviteCommand,
}

#[async_trait::async_trait]
impl Op for Invite {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InviteOpError {
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Invite(#[from] InviteError),
    #[error("invalid invite record: {0}")]
    Record(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Create an invite link for a document key
#[derive(Args, Debug, Clone)]
pub struct CreateInvite {
    /// Read the base64 document key from this file instead of stdin
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Host for the link (defaults to the configured host)
    #[arg(long)]
    pub host: Option<String>,
}

#[async_trait::async_trait]
impl Op for CreateInvite {
    type Error = InviteOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let key = DocumentKey::from_base64(&input::read_secret(self.key_file.as_deref())?)?;
        let host = self.host.as_deref().unwrap_or(&ctx.config.host);

        let invite = DocumentInvite::create(&key, host);
        let record = serde_json::to_string_pretty(&invite.server_payload())?;

        Ok(format!(
            "Invite link (share privately):\n  {}\n\nServer payload:\n{}",
            invite.link(),
            record
        ))
    }
}

/// Recover a document key from an invite link and its server record
#[derive(Args, Debug, Clone)]
pub struct AcceptInvite {
    /// Read the full invite link, including the #fragment, from this file
    /// instead of stdin
    #[arg(long)]
    pub link_file: Option<PathBuf>,

    /// File holding the invite record JSON from the server
    #[arg(long)]
    pub record_file: PathBuf,
}

#[async_trait::async_trait]
impl Op for AcceptInvite {
    type Error = InviteOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let link = InviteLink::parse(&input::read_secret(self.link_file.as_deref())?)?;
        let record: InviteRecord = serde_json::from_str(&std::fs::read_to_string(&self.record_file)?)?;

        let key = link.accept(&record).await?;
        Ok(key.to_base64().to_string())
    }
}
