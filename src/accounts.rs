//! Account list loading
//!
//! Reads the ordered list of accounts to log in from a JSON file. Parsing is
//! strict: a missing or malformed file aborts the run before any browser is
//! launched.

use std::path::Path;

use thiserror::Error;
use tracing::info;

/// Errors raised while loading the accounts file
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Failed to read accounts file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse accounts file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single account record from the accounts file.
///
/// `proxy` is either empty (no proxy), `host:port` (plain proxy) or
/// `host:port:username:password` (authenticated proxy).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub proxy: String,
}

/// Load the account list from a JSON file.
///
/// The file must contain a JSON array of objects with `username`, `password`
/// and `proxy` string fields. All three fields are required.
pub fn load_accounts(path: impl AsRef<Path>) -> Result<Vec<Account>, AccountError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| AccountError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let accounts: Vec<Account> =
        serde_json::from_str(&content).map_err(|source| AccountError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    info!("Loaded {} account(s) from {}", accounts.len(), path.display());
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "threadkeeper-accounts-{}-{}",
            uuid::Uuid::new_v4(),
            name
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_accounts() {
        let path = temp_file(
            "valid.json",
            r#"[
                {"username": "alice", "password": "secret", "proxy": ""},
                {"username": "bob", "password": "hunter2", "proxy": "1.2.3.4:8080:user:pass"}
            ]"#,
        );

        let accounts = load_accounts(&path).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].username, "alice");
        assert_eq!(accounts[0].proxy, "");
        assert_eq!(accounts[1].proxy, "1.2.3.4:8080:user:pass");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("threadkeeper-missing-{}", uuid::Uuid::new_v4()));
        let err = load_accounts(&path).unwrap_err();
        assert!(matches!(err, AccountError::Io { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let path = temp_file("broken.json", "[{ not json");
        let err = load_accounts(&path).unwrap_err();
        assert!(matches!(err, AccountError::Parse { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        // No silent defaults: a record without a proxy field must fail at parse
        // time, not later.
        let path = temp_file(
            "partial.json",
            r#"[{"username": "alice", "password": "secret"}]"#,
        );
        let err = load_accounts(&path).unwrap_err();
        assert!(matches!(err, AccountError::Parse { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_empty_list_parses() {
        let path = temp_file("empty.json", "[]");
        let accounts = load_accounts(&path).unwrap();
        assert!(accounts.is_empty());
        std::fs::remove_file(path).ok();
    }
}
