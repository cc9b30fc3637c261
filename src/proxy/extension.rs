//! Proxy-auth Chrome extension packaging
//!
//! Chrome accepts `--proxy-server` but offers no switch for proxy credentials,
//! so an ephemeral Manifest V2 extension is generated per account. Its
//! background script installs fixed proxy routing and answers
//! `onAuthRequired` challenges with the account's proxy credentials.
//!
//! The extension is written twice: as an unpacked directory (what
//! `--load-extension` consumes) and as a zip archive next to it (the portable
//! form of the same package). Both live under a unique per-account path and
//! are removed when the account's session closes.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use super::{ProxyAuth, ProxyError};

const MANIFEST_FILE: &str = "manifest.json";
const BACKGROUND_FILE: &str = "background.js";

/// Generator for the proxy-auth extension package
#[derive(Debug, Clone)]
pub struct ProxyAuthExtension {
    auth: ProxyAuth,
    scheme: String,
}

/// An extension package on disk: the unpacked directory plus its archive.
#[derive(Debug)]
pub struct ExtensionArtifact {
    pub dir: PathBuf,
    pub archive: PathBuf,
}

impl ProxyAuthExtension {
    pub fn new(auth: ProxyAuth) -> Self {
        Self {
            auth,
            scheme: "http".to_string(),
        }
    }

    /// Override the proxy scheme (default "http").
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_lowercase();
        self
    }

    /// Render the extension manifest.
    pub fn manifest(&self) -> String {
        r#"{
  "version": "1.0.0",
  "manifest_version": 2,
  "name": "Proxy Auth Helper",
  "permissions": [
    "proxy",
    "tabs",
    "unlimitedStorage",
    "storage",
    "<all_urls>",
    "webRequest",
    "webRequestBlocking"
  ],
  "background": {
    "scripts": ["background.js"]
  },
  "minimum_chrome_version": "22.0.0"
}
"#
        .to_string()
    }

    /// Render the background script with the proxy address and credentials
    /// embedded. Values are escaped for JS string literals.
    pub fn background_script(&self) -> String {
        format!(
            r#"var config = {{
  mode: "fixed_servers",
  rules: {{
    singleProxy: {{
      scheme: "{scheme}",
      host: "{host}",
      port: {port}
    }},
    bypassList: ["localhost"]
  }}
}};

chrome.proxy.settings.set({{value: config, scope: "regular"}}, function() {{}});

function callbackFn(details) {{
  return {{
    authCredentials: {{
      username: "{username}",
      password: "{password}"
    }}
  }};
}}

chrome.webRequest.onAuthRequired.addListener(
  callbackFn,
  {{urls: ["<all_urls>"]}},
  ['blocking']
);
"#,
            scheme = js_escape(&self.scheme),
            host = js_escape(&self.auth.host),
            port = self.auth.port,
            username = js_escape(&self.auth.username),
            password = js_escape(&self.auth.password),
        )
    }

    /// Write the unpacked extension directory and its zip archive under
    /// `work_dir`, overwriting any previous content there.
    pub fn build(&self, work_dir: &Path) -> Result<ExtensionArtifact, ProxyError> {
        let dir = work_dir.join("proxy_auth_extension");
        let archive = work_dir.join("proxy_auth_extension.zip");

        std::fs::create_dir_all(&dir)?;

        let manifest = self.manifest();
        let background = self.background_script();

        std::fs::write(dir.join(MANIFEST_FILE), &manifest)?;
        std::fs::write(dir.join(BACKGROUND_FILE), &background)?;

        let file = std::fs::File::create(&archive)?;
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(MANIFEST_FILE, options)?;
        zip.write_all(manifest.as_bytes())?;
        zip.start_file(BACKGROUND_FILE, options)?;
        zip.write_all(background.as_bytes())?;
        zip.finish()?;

        info!(
            "Proxy auth extension for {}:{} written to {}",
            self.auth.host,
            self.auth.port,
            dir.display()
        );

        Ok(ExtensionArtifact { dir, archive })
    }
}

impl ExtensionArtifact {
    /// Remove the unpacked directory and the archive from disk.
    pub fn cleanup(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            debug!("Could not remove extension dir {}: {}", self.dir.display(), e);
        }
        if let Err(e) = std::fs::remove_file(&self.archive) {
            debug!(
                "Could not remove extension archive {}: {}",
                self.archive.display(),
                e
            );
        }
    }
}

fn js_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn auth() -> ProxyAuth {
        ProxyAuth {
            host: "proxy.example.com".to_string(),
            port: 8080,
            username: "user-1".to_string(),
            password: "p@ss\"word".to_string(),
        }
    }

    fn temp_work_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("threadkeeper-ext-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_manifest_grants_proxy_permissions() {
        let manifest = ProxyAuthExtension::new(auth()).manifest();
        let parsed: serde_json::Value = serde_json::from_str(&manifest).unwrap();

        let permissions: Vec<&str> = parsed["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(permissions.contains(&"proxy"));
        assert!(permissions.contains(&"webRequest"));
        assert!(permissions.contains(&"webRequestBlocking"));
        assert_eq!(parsed["background"]["scripts"][0], "background.js");
    }

    #[test]
    fn test_background_script_embeds_inputs() {
        let script = ProxyAuthExtension::new(auth()).background_script();
        assert!(script.contains(r#"host: "proxy.example.com""#));
        assert!(script.contains("port: 8080"));
        assert!(script.contains(r#"username: "user-1""#));
        assert!(script.contains(r#"password: "p@ss\"word""#));
        assert!(script.contains(r#"scheme: "http""#));
        assert!(script.contains("onAuthRequired"));
        assert!(script.contains(r#"bypassList: ["localhost"]"#));
    }

    #[test]
    fn test_scheme_override() {
        let script = ProxyAuthExtension::new(auth())
            .with_scheme("HTTPS")
            .background_script();
        assert!(script.contains(r#"scheme: "https""#));
    }

    #[test]
    fn test_archive_round_trip() {
        let work_dir = temp_work_dir();
        let ext = ProxyAuthExtension::new(auth());
        let artifact = ext.build(&work_dir).unwrap();

        assert!(artifact.dir.join("manifest.json").exists());
        assert!(artifact.dir.join("background.js").exists());

        // Unpack the archive and check both entries match what was generated.
        let file = std::fs::File::open(&artifact.archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();

        let mut manifest = String::new();
        zip.by_name("manifest.json")
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        assert_eq!(manifest, ext.manifest());

        let mut background = String::new();
        zip.by_name("background.js")
            .unwrap()
            .read_to_string(&mut background)
            .unwrap();
        assert_eq!(background, ext.background_script());
        assert!(background.contains("proxy.example.com"));
        assert!(background.contains("user-1"));

        artifact.cleanup();
        assert!(!artifact.dir.exists());
        assert!(!artifact.archive.exists());
        std::fs::remove_dir_all(work_dir).ok();
    }

    #[test]
    fn test_rebuild_overwrites_existing_package() {
        let work_dir = temp_work_dir();
        let first = ProxyAuthExtension::new(auth()).build(&work_dir).unwrap();

        let mut second_auth = auth();
        second_auth.host = "other.example.com".to_string();
        let second = ProxyAuthExtension::new(second_auth).build(&work_dir).unwrap();

        assert_eq!(first.dir, second.dir);
        let script = std::fs::read_to_string(second.dir.join("background.js")).unwrap();
        assert!(script.contains("other.example.com"));
        assert!(!script.contains(r#"host: "proxy.example.com""#));

        second.cleanup();
        std::fs::remove_dir_all(work_dir).ok();
    }
}
