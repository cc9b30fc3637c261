//! Per-account proxy handling
//!
//! Parses the proxy string attached to each account and, for authenticated
//! proxies, packages a small Chrome extension that answers the proxy's auth
//! challenge (Chrome's `--proxy-server` switch has no way to carry
//! credentials).

mod extension;

pub use extension::{ExtensionArtifact, ProxyAuthExtension};

use thiserror::Error;

/// Proxy-related errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid proxy port '{0}': must be a number between 1 and 65535")]
    InvalidPort(String),

    #[error("Failed to write proxy extension: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to build proxy extension archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Components of an authenticated proxy spec (`host:port:username:password`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// How an account's proxy string routes browser traffic.
///
/// Exactly four colon-separated segments mean an authenticated proxy; any
/// other non-empty value is handed to Chrome verbatim as `--proxy-server`
/// (which also covers bare `host:port` specs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySpec {
    None,
    Direct(String),
    Authenticated(ProxyAuth),
}

impl ProxySpec {
    /// Parse an account's proxy string into a routing decision.
    pub fn parse(spec: &str) -> Result<Self, ProxyError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::None);
        }

        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() == 4 {
            let port: u16 = parts[1]
                .parse()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ProxyError::InvalidPort(parts[1].to_string()))?;

            return Ok(Self::Authenticated(ProxyAuth {
                host: parts[0].to_string(),
                port,
                username: parts[2].to_string(),
                password: parts[3].to_string(),
            }));
        }

        // 1-3 segment specs (including plain host:port) go straight to Chrome.
        Ok(Self::Direct(spec.to_string()))
    }

    /// True when this spec needs the credential-carrying extension.
    pub fn needs_extension(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
