use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::input::{self, InputError};
use crate::cli::op::{Op, OpContext};
use common::crypto::RecoveryPhrase;

crate::command_enum! {
    (New, NewPhrase),
    (Check, CheckPhrase),
}

pub type PhraseCommand = Command;

/// Generate or validate recovery phrases
#[derive(Args, Debug, Clone)]
pub struct Phrase {
    #[command(subcommand)]
    pub command: PhraseCommand,
}

#[async_trait::async_trait]
impl Op for Phrase {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// Print a fresh 12-word recovery phrase
#[derive(Args, Debug, Clone)]
pub struct NewPhrase;

#[async_trait::async_trait]
impl Op for NewPhrase {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        Ok(RecoveryPhrase::generate().as_str().to_string())
    }
}

/// Check a phrase read from a file or stdin
#[derive(Args, Debug, Clone)]
pub struct CheckPhrase {
    /// Read the phrase from this file instead of stdin
    #[arg(long)]
    pub phrase_file: Option<PathBuf>,
}

#[async_trait::async_trait]
impl Op for CheckPhrase {
    type Error = InputError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        input::read_phrase(self.phrase_file.as_deref())?;
        Ok("valid recovery phrase".to_string())
    }
}
