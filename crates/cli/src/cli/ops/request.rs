use std::path::PathBuf;

use clap::{Args, Subcommand};
use http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};

use crate::cli::input::{self, InputError};
use crate::cli::op::{Op, OpContext};
use common::auth::{
    self, AuthError, RejectReason, RequestSigner, Verification, PUBKEY_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use common::identity::{IdentityError, IdentityService};

crate::command_enum! {
    (Sign, SignRequest),
    (Verify, VerifyRequest),
}

pub type RequestCommand = Command;

/// Produce or check request authentication headers
#[derive(Args, Debug, Clone)]
pub struct Request {
    #[command(subcommand)]
    pub command: RequestCommand,
}

#[async_trait::async_trait]
impl Op for Request {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestOpError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("request rejected: {0}")]
    Rejected(RejectReason),
}

/// Sign a request with the identity unlocked from a phrase
#[derive(Args, Debug, Clone)]
pub struct SignRequest {
    /// HTTP method
    #[arg(long)]
    pub method: String,

    /// Request path, e.g. /api/document.create
    #[arg(long)]
    pub path: String,

    /// File holding the exact body bytes to send
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Read the phrase from this file instead of stdin
    #[arg(long)]
    pub phrase_file: Option<PathBuf>,

    /// Sign at this timestamp (ms) instead of now
    #[arg(long)]
    pub timestamp: Option<i64>,
}

#[async_trait::async_trait]
impl Op for SignRequest {
    type Error = RequestOpError;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let phrase = input::read_phrase(self.phrase_file.as_deref())?;
        let body = input::read_body(self.body_file.as_deref())?;

        let service = IdentityService::new();
        service.unlock_with_seed(phrase.as_str()).await?;
        let signer = RequestSigner::new(service.session().clone());

        let signed = match self.timestamp {
            Some(timestamp) => {
                signer.sign_at(&self.method, &self.path, body.as_deref(), timestamp)?
            }
            None => signer.sign(&self.method, &self.path, body.as_deref())?,
        };
        service.lock();

        Ok(format_headers(&signed.headers()))
    }
}

fn format_headers(headers: &HeaderMap) -> String {
    [PUBKEY_HEADER, TIMESTAMP_HEADER, SIGNATURE_HEADER]
        .iter()
        .filter_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some(format!("{}: {}", name.as_str(), value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check a request's authentication headers
#[derive(Args, Debug, Clone)]
pub struct VerifyRequest {
    /// HTTP method
    #[arg(long)]
    pub method: String,

    /// Request path
    #[arg(long)]
    pub path: String,

    /// File holding the exact body bytes received
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// X-Pubkey header value
    #[arg(long)]
    pub pubkey: String,

    /// X-Timestamp header value
    #[arg(long)]
    pub timestamp: String,

    /// X-Signature header value
    #[arg(long)]
    pub signature: String,

    /// Verify as if the current time were this (ms)
    #[arg(long)]
    pub now: Option<i64>,
}

#[async_trait::async_trait]
impl Op for VerifyRequest {
    type Error = RequestOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let body = input::read_body(self.body_file.as_deref())?;

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(PUBKEY_HEADER, HeaderValue::from_str(&self.pubkey)?);
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&self.timestamp)?);
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&self.signature)?);

        let outcome = match self.now {
            Some(now) => auth::verify_at(
                &self.method,
                &self.path,
                body.as_deref(),
                &headers,
                ctx.max_age(),
                now,
            ),
            None => auth::verify(&self.method, &self.path, body.as_deref(), &headers, ctx.max_age()),
        };

        match outcome {
            Verification::Verified { identity_hash } => Ok(format!("verified: {}", identity_hash)),
            Verification::Rejected(reason) => Err(RequestOpError::Rejected(reason)),
        }
    }
}
