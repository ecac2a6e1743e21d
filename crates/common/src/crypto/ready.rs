//! One-time library readiness gate

use tokio::sync::OnceCell;

use super::keys::SigningKeypair;
use super::secret::{decrypt, encrypt, DocumentKey};

static READY: OnceCell<()> = OnceCell::const_new();

const SELF_TEST_MESSAGE: &[u8] = b"hearth self-test";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("crypto library not ready: {0}")]
    NotReady(String),
}

/// Resolve once the primitives have passed their self-test.
///
/// Safe to call from any number of tasks; the self-test runs at most once
/// per process on success. A failure leaves the gate unresolved so a later
/// call can try again.
pub async fn ready() -> Result<(), CryptoError> {
    READY
        .get_or_try_init(|| async {
            self_test()?;
            tracing::debug!("crypto self-test passed");
            Ok::<_, CryptoError>(())
        })
        .await
        .map(|_| ())
}

/// Whether [`ready`] has already resolved successfully
pub fn is_ready() -> bool {
    READY.initialized()
}

fn self_test() -> Result<(), CryptoError> {
    let mut probe = [0u8; 32];
    getrandom::getrandom(&mut probe)
        .map_err(|e| CryptoError::NotReady(format!("random source unavailable: {e}")))?;

    let key = DocumentKey::from(probe);
    let blob = encrypt(SELF_TEST_MESSAGE, &key);
    match decrypt(&blob, &key) {
        Ok(plaintext) if plaintext == SELF_TEST_MESSAGE => {}
        _ => return Err(CryptoError::NotReady("symmetric cipher check failed".into())),
    }

    let signer = SigningKeypair::from_seed(&probe);
    let signature = signer.sign(SELF_TEST_MESSAGE);
    signer
        .public()
        .verify(SELF_TEST_MESSAGE, &signature)
        .map_err(|_| CryptoError::NotReady("signature check failed".into()))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_ready_resolves() {
        ready().await.unwrap();
        assert!(is_ready());
        // idempotent
        ready().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_init() {
        let handles: Vec<_> = (0..16).map(|_| tokio::spawn(ready())).collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(is_ready());
    }

    #[test]
    fn test_self_test_passes() {
        self_test().unwrap();
    }
}
