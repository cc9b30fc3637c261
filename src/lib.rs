//! threadkeeper
//!
//! Batch-logs a list of Threads accounts into threads.net through a
//! CDP-driven Chromium instance, optionally through a per-account proxy, and
//! persists each successful session's cookies for later reuse. Accounts are
//! processed strictly sequentially, one browser session per account.

pub mod accounts;
pub mod browser;
pub mod login;
pub mod proxy;
pub mod runner;
pub mod session_store;

use std::path::PathBuf;

use runner::ErrorPolicy;
use tracing::warn;

/// Default accounts file, next to the working directory
pub const DEFAULT_ACCOUNTS_FILE: &str = "user_data.json";

/// Configuration for one batch run, assembled from argv and
/// `THREADKEEPER_*` environment variables.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Path to the JSON accounts file
    pub accounts_path: PathBuf,
    /// Directory receiving the per-account cookie files
    pub output_dir: PathBuf,
    /// Run Chrome headless
    pub headless: bool,
    /// Explicit Chrome/Chromium binary override
    pub chrome_path: Option<String>,
    /// What to do when an account fails
    pub on_error: ErrorPolicy,
}

impl RunConfig {
    /// Build the run configuration. The first CLI argument (if any) is the
    /// accounts file path; everything else comes from the environment:
    ///
    /// - `THREADKEEPER_ACCOUNTS`   accounts file (default `user_data.json`)
    /// - `THREADKEEPER_OUTPUT_DIR` cookie output directory (default `.`)
    /// - `THREADKEEPER_HEADLESS`   `1`/`true` to run headless
    /// - `THREADKEEPER_CHROME`     Chrome/Chromium binary override
    /// - `THREADKEEPER_ON_ERROR`   `continue` (default) or `abort`
    pub fn from_env(mut args: impl Iterator<Item = String>) -> Self {
        let accounts_path = args
            .next()
            .or_else(|| std::env::var("THREADKEEPER_ACCOUNTS").ok())
            .unwrap_or_else(|| DEFAULT_ACCOUNTS_FILE.to_string());

        let output_dir = std::env::var("THREADKEEPER_OUTPUT_DIR")
            .ok()
            .unwrap_or_else(|| ".".to_string());

        let headless = std::env::var("THREADKEEPER_HEADLESS")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        let chrome_path = std::env::var("THREADKEEPER_CHROME")
            .ok()
            .filter(|v| !v.is_empty());

        let on_error = std::env::var("THREADKEEPER_ON_ERROR")
            .ok()
            .map(|v| {
                v.parse().unwrap_or_else(|e: String| {
                    warn!("{}, falling back to 'continue'", e);
                    ErrorPolicy::Continue
                })
            })
            .unwrap_or_default();

        Self {
            accounts_path: PathBuf::from(accounts_path),
            output_dir: PathBuf::from(output_dir),
            headless,
            chrome_path,
            on_error,
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("threadkeeper").join("logs"))
}

/// Initialize logging: console layer plus a daily-rolling file layer when a
/// log directory is available.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "threadkeeper.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

/// Truncate a string for logging without splitting a UTF-8 character.
/// Keeps secrets like passwords and proxy credentials out of the logs.
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("short", 10), "short");
        assert_eq!(safe_truncate("longer-value", 6), "longer");
        // Multi-byte characters must not be split
        assert_eq!(safe_truncate("投稿する", 2), "投稿");
    }

    #[test]
    fn test_run_config_takes_accounts_path_from_args() {
        let config = RunConfig::from_env(vec!["accounts.json".to_string()].into_iter());
        assert_eq!(config.accounts_path, PathBuf::from("accounts.json"));
    }
}
