//! threadkeeper binary
//!
//! Usage: `threadkeeper [accounts.json]`
//!
//! Environment variables:
//! - `THREADKEEPER_ACCOUNTS`   accounts file (default `user_data.json`)
//! - `THREADKEEPER_OUTPUT_DIR` cookie output directory (default `.`)
//! - `THREADKEEPER_HEADLESS`   `1`/`true` to run headless
//! - `THREADKEEPER_CHROME`     Chrome/Chromium binary override
//! - `THREADKEEPER_ON_ERROR`   `continue` (default) or `abort`

use std::process::ExitCode;

use tracing::{error, info};

use threadkeeper::{init_logging, log_dir, runner, RunConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = init_logging();

    info!("Starting threadkeeper");
    if let Some(dir) = log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config = RunConfig::from_env(std::env::args().skip(1));
    info!(
        "Accounts: {}, output dir: {}, headless: {}",
        config.accounts_path.display(),
        config.output_dir.display(),
        config.headless
    );

    match runner::run(&config).await {
        Ok(summary) => {
            if summary.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                error!("Failed accounts: {}", summary.failed.join(", "));
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
