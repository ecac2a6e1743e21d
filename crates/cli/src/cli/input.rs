use std::io::{self, BufRead};
use std::path::Path;

use common::crypto::{derive_keys, DerivedKeys, RecoveryPhrase};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid recovery phrase")]
    InvalidPhrase,
}

/// Read a recovery phrase from `file`, or the first line of stdin.
///
/// Phrases are never taken from argv, where they would end up in shell
/// history and process listings.
pub fn read_phrase(file: Option<&Path>) -> Result<RecoveryPhrase, InputError> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_line()?,
    };
    RecoveryPhrase::parse(&raw).map_err(|_| InputError::InvalidPhrase)
}

/// Read a phrase and derive its keys
pub fn read_keys(file: Option<&Path>) -> Result<DerivedKeys, InputError> {
    let phrase = read_phrase(file)?;
    Ok(derive_keys(&phrase.to_master_seed()))
}

pub fn read_line() -> Result<String, io::Error> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Read a secret value such as a document key or an invite link from
/// `file`, or the first line of stdin. Same argv rule as [`read_phrase`].
pub fn read_secret(file: Option<&Path>) -> Result<String, io::Error> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_line()?,
    };
    Ok(raw.trim().to_string())
}

/// Request body from a file, if one was given
pub fn read_body(file: Option<&Path>) -> Result<Option<Vec<u8>>, io::Error> {
    file.map(std::fs::read).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_read_phrase_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrase.txt");
        std::fs::write(&path, format!("  {}\n", TEST_PHRASE.to_uppercase())).unwrap();

        let phrase = read_phrase(Some(&path)).unwrap();
        assert_eq!(phrase.as_str(), TEST_PHRASE);
    }

    #[test]
    fn test_read_phrase_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrase.txt");
        std::fs::write(&path, "correct horse battery staple").unwrap();

        assert!(matches!(
            read_phrase(Some(&path)),
            Err(InputError::InvalidPhrase)
        ));
    }

    #[test]
    fn test_read_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.txt");
        std::fs::write(&path, "  c2VjcmV0\n").unwrap();

        assert_eq!(read_secret(Some(&path)).unwrap(), "c2VjcmV0");
        assert!(read_secret(Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_read_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, br#"{"name":"Test"}"#).unwrap();

        assert_eq!(read_body(None).unwrap(), None);
        assert_eq!(
            read_body(Some(&path)).unwrap().unwrap(),
            br#"{"name":"Test"}"#.to_vec()
        );
    }
}
