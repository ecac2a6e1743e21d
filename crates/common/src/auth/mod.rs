//! Detached-signature request authentication
//!
//! Every API request carries three headers:
//!
//! | header        | value                                   |
//! |---------------|-----------------------------------------|
//! | `X-Pubkey`    | base64 Ed25519 signing public key       |
//! | `X-Timestamp` | milliseconds since the unix epoch       |
//! | `X-Signature` | base64 signature over the canonical form |
//!
//! The canonical form is
//!
//! ```text
//! METHOD \n PATH \n TIMESTAMP \n hex(sha256(BODY))
//! ```
//!
//! with the method uppercased and an absent body hashed as the empty string.
//! Verification recomputes the identity hash from `X-Pubkey`, so the server
//! never needs anything but the hash to recognise a member.

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crypto::{IdentityHash, Signature, SigningPublicKey};
use crate::identity::{SessionMissing, SessionStore};

pub const PUBKEY_HEADER: HeaderName = HeaderName::from_static("x-pubkey");
pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-timestamp");
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-signature");

/// How far a request timestamp may drift from the verifier's clock
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(300_000);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    SessionMissing(#[from] SessionMissing),
    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a signed request was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingHeaders,
    InvalidTimestamp,
    Expired,
    BadSignature,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::MissingHeaders => "missing authentication headers",
            RejectReason::InvalidTimestamp => "invalid timestamp",
            RejectReason::Expired => "request expired",
            RejectReason::BadSignature => "bad signature",
        };
        f.write_str(reason)
    }
}

/// Outcome of checking a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified { identity_hash: IdentityHash },
    Rejected(RejectReason),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }

    pub fn identity_hash(&self) -> Option<&IdentityHash> {
        match self {
            Verification::Verified { identity_hash } => Some(identity_hash),
            Verification::Rejected(_) => None,
        }
    }
}

/// The string that gets signed for a request
pub fn canonical_request(method: &str, path: &str, timestamp: i64, body: Option<&[u8]>) -> String {
    let body_hash = Sha256::digest(body.unwrap_or_default());
    format!(
        "{}\n{}\n{}\n{}",
        method.to_uppercase(),
        path,
        timestamp,
        hex::encode(body_hash)
    )
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The authentication envelope for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub public_key: SigningPublicKey,
    pub timestamp: i64,
    pub signature: Signature,
}

impl SignedRequest {
    pub fn signature_base64(&self) -> String {
        STANDARD.encode(self.signature.to_bytes())
    }

    /// Write the three auth headers, replacing any already present
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(PUBKEY_HEADER, header_value(self.public_key.to_base64()));
        headers.insert(TIMESTAMP_HEADER, header_value(self.timestamp.to_string()));
        headers.insert(SIGNATURE_HEADER, header_value(self.signature_base64()));
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(3);
        self.apply(&mut headers);
        headers
    }
}

fn header_value(value: String) -> HeaderValue {
    // base64 and decimal digits are always visible ascii
    let Ok(value) = HeaderValue::from_str(&value) else {
        unreachable!("auth header values are ascii");
    };
    value
}

/// A JSON body together with the envelope that covers it
///
/// `body` is exactly what was hashed; send these bytes, not a re-serialization.
#[derive(Debug, Clone)]
pub struct SignedJson {
    pub body: Vec<u8>,
    pub request: SignedRequest,
}

/// Signs outgoing requests with the current session's signing key
#[derive(Debug, Clone)]
pub struct RequestSigner {
    session: SessionStore,
}

impl RequestSigner {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    /// Sign with the current wall clock time
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<SignedRequest, AuthError> {
        self.sign_at(method, path, body, now_millis())
    }

    /// Sign with an explicit timestamp. Identical inputs give identical output.
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
        timestamp: i64,
    ) -> Result<SignedRequest, AuthError> {
        let session = self.session.require()?;
        let keypair = session.signing_keypair();

        let canonical = canonical_request(method, path, timestamp, body);
        let signature = keypair.sign(canonical.as_bytes());

        Ok(SignedRequest {
            public_key: keypair.public(),
            timestamp,
            signature,
        })
    }

    /// Serialize `body` to JSON and sign the resulting bytes
    pub fn sign_json<T: Serialize + ?Sized>(
        &self,
        method: &str,
        path: &str,
        body: &T,
    ) -> Result<SignedJson, AuthError> {
        let body = serde_json::to_vec(body)?;
        let request = self.sign(method, path, Some(body.as_slice()))?;
        Ok(SignedJson { body, request })
    }
}

/// Check a request against the wall clock
pub fn verify(
    method: &str,
    path: &str,
    body: Option<&[u8]>,
    headers: &HeaderMap,
    max_age: Duration,
) -> Verification {
    verify_at(method, path, body, headers, max_age, now_millis())
}

/// Check a request as if the current time were `now` (milliseconds)
///
/// A timestamp further than `max_age` from `now` in either direction is
/// [`RejectReason::Expired`].
pub fn verify_at(
    method: &str,
    path: &str,
    body: Option<&[u8]>,
    headers: &HeaderMap,
    max_age: Duration,
    now: i64,
) -> Verification {
    match check(method, path, body, headers, max_age, now) {
        Ok(identity_hash) => Verification::Verified { identity_hash },
        Err(reason) => {
            tracing::warn!(%reason, method, path, "rejected signed request");
            Verification::Rejected(reason)
        }
    }
}

fn check(
    method: &str,
    path: &str,
    body: Option<&[u8]>,
    headers: &HeaderMap,
    max_age: Duration,
    now: i64,
) -> Result<IdentityHash, RejectReason> {
    let pubkey = header(headers, &PUBKEY_HEADER)?;
    let timestamp = header(headers, &TIMESTAMP_HEADER)?;
    let signature = header(headers, &SIGNATURE_HEADER)?;

    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| RejectReason::InvalidTimestamp)?;
    let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
    if now.abs_diff(timestamp) > max_age {
        return Err(RejectReason::Expired);
    }

    let public_key =
        SigningPublicKey::from_base64(pubkey).map_err(|_| RejectReason::BadSignature)?;
    let signature = STANDARD
        .decode(signature)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .ok_or(RejectReason::BadSignature)?;

    let canonical = canonical_request(method, path, timestamp, body);
    public_key
        .verify(canonical.as_bytes(), &signature)
        .map_err(|_| RejectReason::BadSignature)?;

    Ok(public_key.identity_hash())
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<&'a str, RejectReason> {
    headers
        .get(name)
        .ok_or(RejectReason::MissingHeaders)?
        .to_str()
        .map_err(|_| RejectReason::MissingHeaders)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{derive_keys, MasterSeed};
    use crate::identity::SessionData;

    const NOW: i64 = 1_700_000_000_000;

    fn signer() -> (RequestSigner, IdentityHash) {
        let store = SessionStore::new();
        let keys = derive_keys(&MasterSeed::from_bytes([3u8; 64]));
        let hash = keys.identity_hash();
        store.store(SessionData::from_keys(&keys));
        (RequestSigner::new(store), hash)
    }

    #[test]
    fn test_canonical_request() {
        let canonical = canonical_request("post", "/api/x", 42, None);
        assert_eq!(
            canonical,
            "POST\n/api/x\n42\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        // empty body and no body hash the same
        assert_eq!(canonical, canonical_request("POST", "/api/x", 42, Some(&[])));
    }

    #[test]
    fn test_sign_verify() {
        let (signer, hash) = signer();
        let body: &[u8] = br#"{"name":"Test"}"#;
        let signed = signer.sign_at("POST", "/api/document.create", Some(body), NOW).unwrap();

        let outcome = verify_at(
            "POST",
            "/api/document.create",
            Some(body),
            &signed.headers(),
            DEFAULT_MAX_AGE,
            NOW + 1_000,
        );
        assert_eq!(outcome, Verification::Verified { identity_hash: hash });
    }

    #[test]
    fn test_signing_is_deterministic() {
        let (signer, _) = signer();
        let a = signer.sign_at("GET", "/a", None, NOW).unwrap();
        let b = signer.sign_at("get", "/a", None, NOW).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_expired_both_directions() {
        let (signer, _) = signer();
        let headers = signer.sign_at("GET", "/a", None, NOW).unwrap().headers();

        let six_minutes = 6 * 60 * 1000;
        for now in [NOW + six_minutes, NOW - six_minutes] {
            assert_eq!(
                verify_at("GET", "/a", None, &headers, DEFAULT_MAX_AGE, now),
                Verification::Rejected(RejectReason::Expired)
            );
        }
        // exactly at the boundary is still fine
        assert!(verify_at("GET", "/a", None, &headers, DEFAULT_MAX_AGE, NOW + 300_000).is_verified());
    }

    #[test]
    fn test_tampering_is_bad_signature() {
        let (signer, _) = signer();
        let headers = signer
            .sign_at("POST", "/a", Some(&b"body"[..]), NOW)
            .unwrap()
            .headers();

        let cases: [(&str, &str, &[u8]); 3] = [
            ("PUT", "/a", b"body"),
            ("POST", "/b", b"body"),
            ("POST", "/a", b"bodz"),
        ];
        for (method, path, body) in cases {
            assert_eq!(
                verify_at(method, path, Some(body), &headers, DEFAULT_MAX_AGE, NOW),
                Verification::Rejected(RejectReason::BadSignature)
            );
        }
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let (signer, _) = signer();
        let signed = signer.sign_at("GET", "/a", None, NOW).unwrap();

        let mut headers = signed.headers();
        headers.remove(SIGNATURE_HEADER);
        assert_eq!(
            verify_at("GET", "/a", None, &headers, DEFAULT_MAX_AGE, NOW),
            Verification::Rejected(RejectReason::MissingHeaders)
        );

        let mut headers = signed.headers();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("yesterday"));
        assert_eq!(
            verify_at("GET", "/a", None, &headers, DEFAULT_MAX_AGE, NOW),
            Verification::Rejected(RejectReason::InvalidTimestamp)
        );

        let mut headers = signed.headers();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("not-base64!"));
        assert_eq!(
            verify_at("GET", "/a", None, &headers, DEFAULT_MAX_AGE, NOW),
            Verification::Rejected(RejectReason::BadSignature)
        );

        assert_eq!(
            verify_at("GET", "/a", None, &HeaderMap::new(), DEFAULT_MAX_AGE, NOW),
            Verification::Rejected(RejectReason::MissingHeaders)
        );
    }

    #[test]
    fn test_sign_without_session() {
        let signer = RequestSigner::new(SessionStore::new());
        assert!(matches!(
            signer.sign("GET", "/a", None),
            Err(AuthError::SessionMissing(_))
        ));
    }

    #[test]
    fn test_sign_json_covers_exact_bytes() {
        let (signer, hash) = signer();
        let signed = signer
            .sign_json("POST", "/api/document.create", &serde_json::json!({"name": "Test"}))
            .unwrap();
        assert_eq!(signed.body, br#"{"name":"Test"}"#);

        let outcome = verify(
            "POST",
            "/api/document.create",
            Some(signed.body.as_slice()),
            &signed.request.headers(),
            DEFAULT_MAX_AGE,
        );
        assert_eq!(outcome.identity_hash(), Some(&hash));
    }
}
