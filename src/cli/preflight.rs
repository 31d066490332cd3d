//! Pre-flight checks before expensive operations.
//!
//! Validates that credentials and the index are available before starting
//! operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{DocchatError, Result};
use std::path::Path;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Serving needs both credentials and the index.
    Serve,
    /// Answering locally has the same needs as serving.
    Ask,
    /// Indexing needs the embedding credential.
    Index,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Serve | Operation::Ask => {
            check_api_key(&settings.llm.api_key_env)?;
            check_api_key(&settings.embedding.api_key_env)?;
            check_index(&settings.index_path())?;
        }
        Operation::Index => {
            check_api_key(&settings.embedding.api_key_env)?;
        }
    }
    Ok(())
}

/// Check that a credential environment variable is set.
fn check_api_key(var: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(DocchatError::Config(format!(
            "{} is empty. Set it with: export {}='...'",
            var, var
        ))),
        Err(_) => Err(DocchatError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            var, var
        ))),
    }
}

/// Check that the index file exists.
fn check_index(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(DocchatError::Config(format!(
            "Index not found at {}. Build it with: docchat index <dir>",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential() {
        let err = check_api_key("DOCCHAT_TEST_UNSET_CREDENTIAL").unwrap_err();
        assert!(err.to_string().contains("DOCCHAT_TEST_UNSET_CREDENTIAL not set"));
    }

    #[test]
    fn test_index_presence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_index(&dir.path().join("index.db")).is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(check_index(file.path()).is_ok());
    }
}
