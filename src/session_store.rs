//! Session cookie persistence
//!
//! Serializes the cookies of a logged-in browser session to a per-account
//! JSON file (`cookies_<username>.json`) and converts them back into CDP
//! cookie params so a later session can be re-authenticated without going
//! through the login form again.

use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, CookieSameSite};
use thiserror::Error;
use tracing::info;

use crate::browser::session::sanitize;

/// Errors raised while persisting or loading session cookies
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access cookie file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize cookies for {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One persisted cookie record
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
            same_site: cookie.same_site.as_ref().map(|s| format!("{s:?}")),
        }
    }
}

/// File name for one account's cookie store.
pub fn cookie_file_name(username: &str) -> String {
    format!("cookies_{}.json", sanitize(username))
}

/// Serialize a session's cookies to `<out_dir>/cookies_<username>.json`,
/// silently overwriting a previous run's file for the same account.
pub fn save_cookies(
    cookies: &[StoredCookie],
    username: &str,
    out_dir: &Path,
) -> Result<PathBuf, StoreError> {
    let path = out_dir.join(cookie_file_name(username));

    std::fs::create_dir_all(out_dir).map_err(|source| StoreError::Io {
        path: out_dir.display().to_string(),
        source,
    })?;

    let content =
        serde_json::to_string_pretty(cookies).map_err(|source| StoreError::Serde {
            path: path.display().to_string(),
            source,
        })?;

    std::fs::write(&path, content).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;

    info!(
        "Saved {} cookie(s) for {} to {}",
        cookies.len(),
        username,
        path.display()
    );
    Ok(path)
}

/// Load a previously persisted cookie file.
pub fn load_cookies(path: &Path) -> Result<Vec<StoredCookie>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Serde {
        path: path.display().to_string(),
        source,
    })
}

/// Convert stored cookies into CDP params for re-injection via
/// `Page::set_cookies` into a future session.
pub fn cookie_params(cookies: &[StoredCookie]) -> Vec<CookieParam> {
    cookies
        .iter()
        .map(|c| {
            let mut param = CookieParam::new(c.name.clone(), c.value.clone());
            param.domain = Some(c.domain.clone());
            param.path = Some(c.path.clone());
            param.secure = Some(c.secure);
            param.http_only = Some(c.http_only);
            param.same_site = c.same_site.as_deref().and_then(parse_same_site);
            param
        })
        .collect()
}

fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value {
        "Strict" => Some(CookieSameSite::Strict),
        "Lax" => Some(CookieSameSite::Lax),
        "None" => Some(CookieSameSite::None),
        _ => Option::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cookies() -> Vec<StoredCookie> {
        vec![
            StoredCookie {
                name: "sessionid".to_string(),
                value: "abc123".to_string(),
                domain: ".threads.net".to_string(),
                path: "/".to_string(),
                secure: true,
                http_only: true,
                same_site: Some("Lax".to_string()),
            },
            StoredCookie {
                name: "csrftoken".to_string(),
                value: "tok".to_string(),
                domain: ".threads.net".to_string(),
                path: "/".to_string(),
                secure: true,
                http_only: false,
                same_site: None,
            },
        ]
    }

    fn temp_out_dir() -> PathBuf {
        std::env::temp_dir().join(format!("threadkeeper-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_cookie_file_name_sanitizes_username() {
        assert_eq!(cookie_file_name("alice"), "cookies_alice.json");
        assert_eq!(
            cookie_file_name("alice@example.com"),
            "cookies_alice_example.com.json"
        );
    }

    #[test]
    fn test_save_load_round_trip() {
        let out_dir = temp_out_dir();
        let cookies = sample_cookies();

        let path = save_cookies(&cookies, "alice", &out_dir).unwrap();
        assert_eq!(path.file_name().unwrap(), "cookies_alice.json");

        let loaded = load_cookies(&path).unwrap();
        assert_eq!(loaded, cookies);

        std::fs::remove_dir_all(out_dir).ok();
    }

    #[test]
    fn test_rerun_overwrites_previous_file() {
        let out_dir = temp_out_dir();
        let mut cookies = sample_cookies();

        save_cookies(&cookies, "alice", &out_dir).unwrap();
        cookies[0].value = "rotated".to_string();
        let path = save_cookies(&cookies, "alice", &out_dir).unwrap();

        let loaded = load_cookies(&path).unwrap();
        assert_eq!(loaded[0].value, "rotated");
        assert_eq!(loaded.len(), 2);

        std::fs::remove_dir_all(out_dir).ok();
    }

    #[test]
    fn test_cookie_params_carry_flags() {
        let params = cookie_params(&sample_cookies());
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "sessionid");
        assert_eq!(params[0].domain.as_deref(), Some(".threads.net"));
        assert_eq!(params[0].secure, Some(true));
        assert_eq!(params[0].http_only, Some(true));
        assert_eq!(params[0].same_site, Some(CookieSameSite::Lax));
        assert_eq!(params[1].same_site, None);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = temp_out_dir().join("cookies_nobody.json");
        let err = load_cookies(&path).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
