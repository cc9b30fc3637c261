//! Threads login flow
//!
//! Drives the threads.net login form through JavaScript evaluated on the
//! page, then verifies the resulting state by polling for the authenticated
//! composer affordance. All waits are condition-based polls with bounded
//! deadlines; there are no blind fixed-duration pauses.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::browser::{BrowserError, BrowserSession};

/// The Threads login page
pub const LOGIN_URL: &str = "https://www.threads.net/login";

/// How long to wait for the username field to render (slow first paint)
const USERNAME_WAIT: Duration = Duration::from_secs(60);
/// How long to wait for the password field and the submit control
const FIELD_WAIT: Duration = Duration::from_secs(10);
/// Default deadline for the post-submit login check
pub const VERIFY_WAIT: Duration = Duration::from_secs(120);
/// Poll interval for all condition waits
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// DOM coupling points. Threads renders obfuscated class names, so fields are
/// matched by type plus stable class fragments and buttons by role plus
/// localized label text (English and Japanese UIs).
mod selectors {
    pub const USERNAME_INPUT: &str = "input[type='text'][class*='x1i10hfl'][class*='x1a2a7pz']";
    pub const PASSWORD_INPUT: &str = "input[type='password']";
    pub const LOGIN_BUTTON_CONTAINER: &str = "div[role='button'][class*='x1i10hfl'][class*='x1qjc9v5']";
    pub const LOGIN_BUTTON_LABELS: [&str; 2] = ["Log in", "ログイン"];
    pub const COMPOSER_CONTAINER: &str = "div[class*='xc26acl'][class*='x6s0dn4'][class*='x78zum5']";
    pub const COMPOSER_LABELS: [&str; 2] = ["Post", "投稿"];
}

/// Outcome of the post-submit login check.
///
/// `TimedOut` means the composer never appeared before the deadline (the user
/// is treated as logged out); `Indeterminate` means the check itself could
/// not run, which is not the same thing and may warrant a retry by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    Confirmed,
    TimedOut,
    Indeterminate(String),
}

impl LoginStatus {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

fn js_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Script that clears an input matched by `selector` and types `value` into
/// it character by character with humanized delays, firing input events so
/// the React form notices.
fn type_into_script(selector: &str, value: &str) -> String {
    format!(
        r#"
        (async function() {{
            const input = document.querySelector("{selector}");
            if (!input) return {{ success: false, error: 'input not found' }};

            input.click();
            input.focus();
            await new Promise(r => setTimeout(r, 100 + Math.random() * 200));

            const setValue = Object.getOwnPropertyDescriptor(
                window.HTMLInputElement.prototype, 'value').set;

            setValue.call(input, '');
            input.dispatchEvent(new Event('input', {{ bubbles: true }}));

            const text = "{value}";
            for (let i = 0; i < text.length; i++) {{
                await new Promise(r => setTimeout(r, 40 + Math.random() * 100));
                setValue.call(input, input.value + text[i]);
                input.dispatchEvent(new Event('input', {{ bubbles: true }}));
            }}

            return {{ success: true }};
        }})()
        "#,
        selector = js_escape(selector),
        value = js_escape(value),
    )
}

/// Script returning true when the login submit control is present and
/// clickable (role=button with a localized "Log in" label, not aria-disabled).
fn login_button_ready_script() -> String {
    format!(
        r#"
        (function() {{
            const labels = {labels};
            const candidates = document.querySelectorAll("{container}");
            for (const el of candidates) {{
                const text = (el.innerText || '').trim();
                if (!labels.some(l => text.includes(l))) continue;
                if (el.getAttribute('aria-disabled') === 'true') continue;
                return true;
            }}
            return false;
        }})()
        "#,
        labels = serde_json::to_string(&selectors::LOGIN_BUTTON_LABELS).unwrap_or_default(),
        container = selectors::LOGIN_BUTTON_CONTAINER,
    )
}

/// Script that clicks the login submit control directly from the DOM,
/// sidestepping overlay interception.
fn click_login_button_script() -> String {
    format!(
        r#"
        (function() {{
            const labels = {labels};
            const candidates = document.querySelectorAll("{container}");
            for (const el of candidates) {{
                const text = (el.innerText || '').trim();
                if (!labels.some(l => text.includes(l))) continue;
                el.click();
                return true;
            }}
            return false;
        }})()
        "#,
        labels = serde_json::to_string(&selectors::LOGIN_BUTTON_LABELS).unwrap_or_default(),
        container = selectors::LOGIN_BUTTON_CONTAINER,
    )
}

/// Script returning true when the authenticated-only composer affordance
/// ("Post" / "投稿") is on the page.
fn composer_present_script() -> String {
    format!(
        r#"
        (function() {{
            const labels = {labels};
            const candidates = document.querySelectorAll("{container}");
            for (const el of candidates) {{
                const text = (el.innerText || '').trim();
                if (labels.some(l => text.includes(l))) return true;
            }}
            return false;
        }})()
        "#,
        labels = serde_json::to_string(&selectors::COMPOSER_LABELS).unwrap_or_default(),
        container = selectors::COMPOSER_CONTAINER,
    )
}

/// Poll `script` (which must evaluate to a boolean) until it turns true or
/// the deadline passes. JS errors propagate; a deadline yields Ok(false).
async fn wait_for_condition(
    session: &BrowserSession,
    script: &str,
    timeout: Duration,
) -> Result<bool, BrowserError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !session.is_alive() {
            return Err(BrowserError::ConnectionLost(
                "Chrome disconnected during wait".into(),
            ));
        }
        let found = session
            .execute_js_with_timeout(script, 10)
            .await?
            .as_bool()
            .unwrap_or(false);
        if found {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn wait_for_selector(
    session: &BrowserSession,
    selector: &str,
    timeout: Duration,
) -> Result<bool, BrowserError> {
    let script = format!(
        r#"!!document.querySelector("{}")"#,
        js_escape(selector)
    );
    wait_for_condition(session, &script, timeout).await
}

/// Drive the login form for one account and report the resulting state.
///
/// Field-wait timeouts surface as `BrowserError::Timeout`; the post-submit
/// check never does, it reports through `LoginStatus` instead.
pub async fn login(
    session: &BrowserSession,
    account: &Account,
) -> Result<LoginStatus, BrowserError> {
    info!("Session {} logging in as {}", session.id, account.username);

    session.navigate(LOGIN_URL).await?;

    if !wait_for_selector(session, selectors::USERNAME_INPUT, USERNAME_WAIT).await? {
        return Err(BrowserError::Timeout(format!(
            "Username field did not appear within {}s",
            USERNAME_WAIT.as_secs()
        )));
    }

    type_into(session, selectors::USERNAME_INPUT, &account.username).await?;
    info!("Session {} entered username", session.id);

    if !wait_for_selector(session, selectors::PASSWORD_INPUT, FIELD_WAIT).await? {
        return Err(BrowserError::Timeout(format!(
            "Password field did not appear within {}s",
            FIELD_WAIT.as_secs()
        )));
    }

    type_into(session, selectors::PASSWORD_INPUT, &account.password).await?;
    info!("Session {} entered password", session.id);

    // The form enables its submit control once client-side validation is
    // happy; wait for that instead of sleeping.
    if !wait_for_condition(session, &login_button_ready_script(), FIELD_WAIT).await? {
        return Err(BrowserError::Timeout(format!(
            "Login button not clickable within {}s",
            FIELD_WAIT.as_secs()
        )));
    }

    let clicked = session
        .execute_js(&click_login_button_script())
        .await?
        .as_bool()
        .unwrap_or(false);
    if !clicked {
        return Err(BrowserError::JavaScriptError(
            "Login button vanished before it could be clicked".into(),
        ));
    }
    info!("Session {} clicked login button", session.id);

    // The verifier's own polling absorbs the post-submit navigation time.
    Ok(verify_login(session, VERIFY_WAIT).await)
}

async fn type_into(
    session: &BrowserSession,
    selector: &str,
    value: &str,
) -> Result<(), BrowserError> {
    let result = session
        .execute_js(&type_into_script(selector, value))
        .await?;

    if result.get("success").and_then(|v| v.as_bool()) != Some(true) {
        let error = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return Err(BrowserError::JavaScriptError(format!(
            "Failed to fill {}: {}",
            selector, error
        )));
    }
    Ok(())
}

/// Poll for the authenticated-only composer affordance.
///
/// Never returns an error: the composer showing up in time is `Confirmed`, a
/// quiet page until the deadline is `TimedOut`, and a check that keeps
/// failing until the deadline is `Indeterminate` with the last cause.
pub async fn verify_login(session: &BrowserSession, timeout: Duration) -> LoginStatus {
    info!("Session {} checking login state", session.id);
    let script = composer_present_script();
    let script = script.as_str();

    let status = poll_for_composer(
        move || async move {
            if !session.is_alive() {
                return Err(BrowserError::ConnectionLost("Chrome disconnected".into()));
            }
            session
                .execute_js_with_timeout(script, 10)
                .await
                .map(|value| value.as_bool().unwrap_or(false))
        },
        timeout,
    )
    .await;

    match &status {
        LoginStatus::Confirmed => {
            info!("Session {} login confirmed (composer present)", session.id);
        }
        LoginStatus::TimedOut => {
            warn!(
                "Session {} composer not found within {}s, treating as logged out",
                session.id,
                timeout.as_secs()
            );
        }
        LoginStatus::Indeterminate(cause) => {
            warn!("Session {} login check failed: {}", session.id, cause);
        }
    }
    status
}

/// Drive a composer check until it reports true, the deadline passes, or the
/// browser connection is lost.
///
/// The post-submit navigation tears down the page's JS context, so evaluation
/// errors here are routinely transient. They only count when they persist to
/// the deadline, in which case the most recent cause is reported. A check
/// that last succeeded (with a quiet page) times out instead.
async fn poll_for_composer<F, Fut>(mut check: F, timeout: Duration) -> LoginStatus
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, BrowserError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_error: Option<String> = None;

    loop {
        match check().await {
            Ok(true) => return LoginStatus::Confirmed,
            Ok(false) => last_error = None,
            Err(e @ BrowserError::ConnectionLost(_)) => {
                return LoginStatus::Indeterminate(e.to_string());
            }
            Err(e) => {
                debug!("Login check attempt failed: {}", e);
                last_error = Some(e.to_string());
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return match last_error.take() {
                Some(cause) => LoginStatus::Indeterminate(cause),
                None => LoginStatus::TimedOut,
            };
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
