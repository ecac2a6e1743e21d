use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::input::{self, InputError};
use crate::cli::op::{Op, OpContext};
use common::crypto::{
    seal, unseal, DocumentKey, EncryptionPublicKey, KeyError, KeyWrapError, WrappedDocumentKey,
};

crate::command_enum! {
    (New, NewKey),
    (Seal, SealKey),
    (Unseal, UnsealKey),
}

pub type KeyCommand = Command;

/// Generate and share document keys
#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyOpError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Wrap(#[from] KeyWrapError),
}

/// Print a fresh base64 document key
#[derive(Args, Debug, Clone)]
pub struct NewKey;

#[async_trait::async_trait]
impl Op for NewKey {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        Ok(DocumentKey::generate().to_base64().to_string())
    }
}

/// Seal a document key for a member's encryption public key
#[derive(Args, Debug, Clone)]
pub struct SealKey {
    /// Read the base64 document key from this file instead of stdin
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Base64 encryption public key of the recipient
    #[arg(long)]
    pub recipient: String,
}

#[async_trait::async_trait]
impl Op for SealKey {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let key = DocumentKey::from_base64(&input::read_secret(self.key_file.as_deref())?)?;
        let recipient = EncryptionPublicKey::from_base64(self.recipient.trim())?;
        Ok(seal(&key, &recipient).to_base64())
    }
}

/// Open a sealed document key with the identity unlocked from a phrase
#[derive(Args, Debug, Clone)]
pub struct UnsealKey {
    /// Base64 wrapped document key
    #[arg(long)]
    pub wrapped: String,

    /// Read the phrase from this file instead of stdin
    #[arg(long)]
    pub phrase_file: Option<PathBuf>,
}

#[async_trait::async_trait]
impl Op for UnsealKey {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let wrapped = WrappedDocumentKey::from_base64(self.wrapped.trim())?;
        let keys = input::read_keys(self.phrase_file.as_deref())?;

        let key = unseal(&wrapped, &keys.encryption.public(), &keys.encryption)?;
        Ok(key.to_base64().to_string())
    }
}
