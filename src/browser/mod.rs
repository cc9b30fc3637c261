//! Browser automation module
//!
//! Launches and controls one Chrome/Chromium instance per account, with the
//! account's proxy spec wired in at launch time.

mod errors;
pub(crate) mod session;

pub use errors::BrowserError;
pub use session::{BrowserSession, BrowserSessionConfig};
