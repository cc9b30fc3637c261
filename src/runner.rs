//! Batch runner
//!
//! Processes the account list strictly sequentially: one browser session per
//! account, closed on every exit path before the next account starts. A
//! failing account never takes the batch down unless the error policy says
//! to abort.

use std::str::FromStr;

use tracing::{error, info, warn};

use crate::accounts::{self, Account, AccountError};
use crate::browser::{BrowserSession, BrowserSessionConfig};
use crate::login::{self, LoginStatus};
use crate::proxy::ProxySpec;
use crate::session_store::{self, StoredCookie};
use crate::RunConfig;

/// What to do when one account's processing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and move on to the next account
    #[default]
    Continue,
    /// Stop the batch at the first failure
    Abort,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "Unknown error policy '{}' (expected 'continue' or 'abort')",
                other
            )),
        }
    }
}

/// Outcome of a whole batch run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub logged_in: usize,
    /// Usernames whose processing failed or whose login was not confirmed
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run the whole batch. A malformed accounts file aborts here, before any
/// browser is launched.
pub async fn run(config: &RunConfig) -> Result<RunSummary, AccountError> {
    let accounts = accounts::load_accounts(&config.accounts_path)?;

    if accounts.is_empty() {
        warn!(
            "Account list {} is empty, nothing to do",
            config.accounts_path.display()
        );
        return Ok(RunSummary::default());
    }

    let mut summary = RunSummary::default();

    for account in &accounts {
        summary.attempted += 1;

        let outcome = process_account(config, account).await;
        if !record_outcome(&mut summary, &account.username, outcome, config.on_error) {
            break;
        }
    }

    info!(
        "Batch finished: {} attempted, {} logged in, {} failed",
        summary.attempted,
        summary.logged_in,
        summary.failed.len()
    );
    Ok(summary)
}

/// Record one account's outcome in the summary. Returns false when the
/// error policy says the batch must stop here; an unconfirmed login counts
/// as a failure for the abort policy just like a hard error.
fn record_outcome(
    summary: &mut RunSummary,
    username: &str,
    outcome: anyhow::Result<bool>,
    policy: ErrorPolicy,
) -> bool {
    match outcome {
        Ok(true) => {
            summary.logged_in += 1;
            return true;
        }
        Ok(false) => {
            warn!("Login not confirmed for {}", username);
            summary.failed.push(username.to_string());
        }
        Err(e) => {
            error!("Error while processing {}: {}", username, e);
            summary.failed.push(username.to_string());
        }
    }

    if policy == ErrorPolicy::Abort {
        warn!("Error policy is abort, stopping the batch");
        return false;
    }
    true
}

/// Process one account end to end. The browser session (and its proxy
/// extension artifact) is closed on every path before this returns.
async fn process_account(config: &RunConfig, account: &Account) -> anyhow::Result<bool> {
    let proxy = ProxySpec::parse(&account.proxy)?;

    let session_config = BrowserSessionConfig::for_account(&account.username)
        .headless(config.headless)
        .chrome_path(config.chrome_path.clone());

    let mut session = BrowserSession::launch(&account.username, session_config, &proxy).await?;
    let result = login_and_persist(&session, account, config).await;
    session.close().await;

    result
}

async fn login_and_persist(
    session: &BrowserSession,
    account: &Account,
    config: &RunConfig,
) -> anyhow::Result<bool> {
    let status = login::login(session, account).await?;

    match status {
        LoginStatus::Confirmed => {
            let cookies = session.cookies().await?;
            let stored: Vec<StoredCookie> = cookies.iter().map(StoredCookie::from).collect();
            session_store::save_cookies(&stored, &account.username, &config.output_dir)?;
            Ok(true)
        }
        LoginStatus::TimedOut => {
            if let Ok(url) = session.current_url().await {
                warn!(
                    "Session {} still at {} after the login attempt",
                    session.id, url
                );
            }
            Ok(false)
        }
        LoginStatus::Indeterminate(cause) => {
            warn!(
                "Could not determine login state for {}: {}",
                account.username, cause
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_policy_parsing() {
        assert_eq!("continue".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Continue);
        assert_eq!("Abort".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert_eq!(" ABORT ".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert!("ask-a-human".parse::<ErrorPolicy>().is_err());
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Continue);
    }

    #[test]
    fn test_summary_success_flag() {
        let mut summary = RunSummary::default();
        assert!(summary.all_succeeded());
        summary.failed.push("alice".to_string());
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_unconfirmed_login_stops_batch_under_abort() {
        let mut summary = RunSummary::default();
        let keep_going = record_outcome(&mut summary, "alice", Ok(false), ErrorPolicy::Abort);
        assert!(!keep_going);
        assert_eq!(summary.failed, vec!["alice".to_string()]);
        assert_eq!(summary.logged_in, 0);
    }

    #[test]
    fn test_unconfirmed_login_continues_under_continue_policy() {
        let mut summary = RunSummary::default();
        let keep_going = record_outcome(&mut summary, "alice", Ok(false), ErrorPolicy::Continue);
        assert!(keep_going);
        assert_eq!(summary.failed, vec!["alice".to_string()]);
    }

    #[test]
    fn test_processing_error_stops_batch_under_abort() {
        let mut summary = RunSummary::default();
        let keep_going = record_outcome(
            &mut summary,
            "bob",
            Err(anyhow::anyhow!("browser launch failed")),
            ErrorPolicy::Abort,
        );
        assert!(!keep_going);
        assert_eq!(summary.failed, vec!["bob".to_string()]);
    }

    #[test]
    fn test_confirmed_login_never_stops_batch() {
        let mut summary = RunSummary::default();
        let keep_going = record_outcome(&mut summary, "carol", Ok(true), ErrorPolicy::Abort);
        assert!(keep_going);
        assert_eq!(summary.logged_in, 1);
        assert!(summary.all_succeeded());
    }

    #[tokio::test]
    async fn test_malformed_accounts_file_aborts_before_launch() {
        let path = std::env::temp_dir().join(format!(
            "threadkeeper-runner-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "not json at all").unwrap();

        let config = RunConfig {
            accounts_path: path.clone(),
            output_dir: PathBuf::from("."),
            headless: true,
            chrome_path: None,
            on_error: ErrorPolicy::Continue,
        };

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, AccountError::Parse { .. }));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_empty_account_list_is_a_noop() {
        let path = std::env::temp_dir().join(format!(
            "threadkeeper-runner-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[]").unwrap();

        let config = RunConfig {
            accounts_path: path.clone(),
            output_dir: PathBuf::from("."),
            headless: true,
            chrome_path: None,
            on_error: ErrorPolicy::Continue,
        };

        let summary = run(&config).await.unwrap();
        assert_eq!(summary.attempted, 0);
        assert!(summary.all_succeeded());

        std::fs::remove_file(path).ok();
    }
}
