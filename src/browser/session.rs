//! Browser session management
//!
//! Handles launching and controlling one Chrome browser instance per account.
//! Authenticated proxies are wired in via a generated proxy-auth extension,
//! plain proxies via `--proxy-server`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::HeadlessMode;
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::BrowserError;
use crate::proxy::{ExtensionArtifact, ProxyAuthExtension, ProxySpec};

/// Find a Chrome/Chromium executable on the system.
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    } else {
        // Chromium MUST come first: Google Chrome blocks --load-extension
        // (chrome/browser/extensions/extension_service.cc: "not allowed in
        // Google Chrome"), and the proxy-auth extension needs it.
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for a browser session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// User data directory
    pub user_data_dir: Option<String>,
    /// JavaScript evaluation timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            timeout_secs: 60,
            window_width: 1280,
            window_height: 900,
        }
    }
}

impl BrowserSessionConfig {
    /// Create config for one account's session with a throwaway data directory.
    pub fn for_account(username: &str) -> Self {
        let user_data_dir = std::env::temp_dir()
            .join("threadkeeper")
            .join("browser_data")
            .join(format!("{}-{}", sanitize(username), uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();

        Self {
            user_data_dir: Some(user_data_dir),
            ..Default::default()
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set JavaScript timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Replace filesystem-hostile characters in a username.
pub fn sanitize(username: &str) -> String {
    username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A live browser session for one account.
///
/// Owned exclusively by the caller for the account's lifetime; `close()` must
/// run on every exit path so the Chrome process and the extension artifact
/// are always released.
pub struct BrowserSession {
    /// Display name for logs (sanitized account username)
    pub id: String,
    browser: Option<Browser>,
    page: Option<Page>,
    config: BrowserSessionConfig,
    alive: Arc<AtomicBool>,
    handler_task: Option<tokio::task::JoinHandle<()>>,
    /// Extension package backing an authenticated proxy, removed on close
    extension: Option<ExtensionArtifact>,
}

impl BrowserSession {
    /// Launch a browser for one account, wiring in its proxy spec.
    pub async fn launch(
        id: &str,
        config: BrowserSessionConfig,
        proxy: &ProxySpec,
    ) -> Result<Self, BrowserError> {
        let id = sanitize(id);
        info!("Launching browser session {} (headless: {})", id, config.headless);

        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "No Chrome/Chromium binary found. Install Chromium and retry.".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();

        if config.headless {
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            debug!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        if let Some(ref dir) = config.user_data_dir {
            std::fs::create_dir_all(dir)?;
            builder = builder.user_data_dir(dir);
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars")
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-restore-session-state")
            .arg("--disable-notifications")
            .arg("--disable-save-password-bubble")
            // Required when running as root (e.g. in Docker or on a VPS)
            .arg("--no-sandbox")
            .window_size(config.window_width, config.window_height);

        // Proxy wiring: an authenticated spec needs the credential-carrying
        // extension, anything else goes straight to --proxy-server.
        let mut extension: Option<ExtensionArtifact> = None;
        match proxy {
            ProxySpec::Authenticated(auth) => {
                let work_dir = std::env::temp_dir()
                    .join("threadkeeper")
                    .join("extensions")
                    .join(uuid::Uuid::new_v4().to_string());
                let artifact = ProxyAuthExtension::new(auth.clone()).build(&work_dir)?;

                info!(
                    "Session {} using authenticated proxy {}:{} (user: {}...)",
                    id,
                    auth.host,
                    auth.port,
                    crate::safe_truncate(&auth.username, 8)
                );
                builder = builder
                    .arg(format!("--load-extension={}", artifact.dir.display()))
                    .arg(format!(
                        "--disable-extensions-except={}",
                        artifact.dir.display()
                    ));
                extension = Some(artifact);
            }
            ProxySpec::Direct(value) => {
                info!("Session {} using direct proxy: {}", id, value);
                builder = builder.arg(format!("--proxy-server={}", value));
            }
            ProxySpec::None => {}
        }

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drain CDP events in the background; when the stream ends, Chrome
        // has disconnected or crashed.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let id_for_handler = id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            warn!("Session {} Chrome disconnected (event handler ended)", id_for_handler);
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with one blank tab; use it and close any extras.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra in pages {
                debug!("Closing extra blank tab");
                let _ = extra.close().await;
            }

            main_page
        };

        info!("Browser session {} created", id);

        Ok(Self {
            id,
            browser: Some(browser),
            page: Some(page),
            config,
            alive,
            handler_task: Some(handler_task),
            extension,
        })
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Session {} navigating to: {}", self.id, url);
        self.page()?
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Execute JavaScript on the page with the configured default timeout.
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.execute_js_with_timeout(script, self.config.timeout_secs)
            .await
    }

    /// Execute JavaScript on the page with a custom timeout (in seconds).
    pub async fn execute_js_with_timeout(
        &self,
        script: &str,
        timeout_secs: u64,
    ) -> Result<serde_json::Value, BrowserError> {
        let page = self.page()?;

        let result = tokio::time::timeout(Duration::from_secs(timeout_secs), page.evaluate(script))
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "JavaScript execution timed out after {}s",
                    timeout_secs
                ))
            })?
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Get the current URL
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        self.page()?
            .url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("No URL".into()))
    }

    /// Extract all cookies from the live session.
    pub async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        self.page()?
            .get_cookies()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))
    }

    /// Close the browser session and release everything it holds.
    pub async fn close(&mut self) {
        self.alive.store(false, Ordering::Relaxed);

        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }

        if let Some(mut browser) = self.browser.take() {
            // Graceful close first, then force kill so no Chrome child
            // processes linger.
            let _ = browser.close().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = browser.kill().await;
        }

        if let Some(task) = self.handler_task.take() {
            let _ = task.await;
        }

        if let Some(extension) = self.extension.take() {
            extension.cleanup();
        }

        if let Some(ref dir) = self.config.user_data_dir {
            let _ = std::fs::remove_dir_all(dir);
        }

        info!("Browser session {} closed", self.id);
    }
}
