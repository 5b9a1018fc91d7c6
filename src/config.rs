//! Configuration loading.
//!
//! The surrounding tooling persists a line-oriented `KEY=VALUE` file with
//! `#`-prefixed comments and optionally quoted values. Environment variables
//! override file values; CLI flags override both (applied in `main`).

use crate::error::{ProxyError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 8722;
const DEFAULT_MODEL: &str = "gemini-3-pro";
const DEFAULT_UPSTREAM_BASE_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Bearer token clients must present; generated by the surrounding tooling.
    pub api_key: String,
    pub default_model: String,
    pub upstream_base_url: String,
    /// Upstream access token, managed externally; forwarded uninterpreted.
    pub upstream_token: Option<String>,
    pub debug: bool,
    /// Route unknown model names to `default_model` instead of failing.
    pub fallback: bool,
    /// Seed for the router's 1M-context toggle.
    pub wide_context: bool,
    /// Consumed by the external tunnel helper, not by the proxy itself.
    pub ngrok_auth_token: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_token: None,
            debug: false,
            fallback: false,
            wide_context: false,
            ngrok_auth_token: None,
        }
    }
}

impl ProxyConfig {
    /// Load from a `KEY=VALUE` file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::default();
        config.apply_pairs(&parse_env_file(&content));
        config.apply_environment();
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file. With no file present the
    /// environment alone may still supply a complete configuration.
    /// Priority: CLI arg > CWD > XDG config > home dir.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        let mut config = Self::default();
        config.apply_environment();
        config.validate()?;
        Ok(config)
    }

    fn apply_pairs(&mut self, pairs: &HashMap<String, String>) {
        if let Some(v) = pairs.get("PORT").and_then(|v| v.parse().ok()) {
            self.port = v;
        }
        if let Some(v) = pairs.get("PROXY_API_KEY") {
            self.api_key = v.clone();
        }
        if let Some(v) = pairs.get("DEFAULT_MODEL") {
            self.default_model = v.clone();
        }
        if let Some(v) = pairs.get("UPSTREAM_BASE_URL") {
            self.upstream_base_url = v.clone();
        }
        if let Some(v) = pairs.get("UPSTREAM_TOKEN") {
            self.upstream_token = Some(v.clone());
        }
        if let Some(v) = pairs.get("NGROK_AUTH_TOKEN") {
            self.ngrok_auth_token = Some(v.clone());
        }
        if let Some(v) = pairs.get("DEBUG") {
            self.debug = parse_bool(v);
        }
        if let Some(v) = pairs.get("FALLBACK") {
            self.fallback = parse_bool(v);
        }
        if let Some(v) = pairs.get("WIDE_CONTEXT") {
            self.wide_context = parse_bool(v);
        }
    }

    fn apply_environment(&mut self) {
        let mut pairs = HashMap::new();
        for key in [
            "PORT",
            "PROXY_API_KEY",
            "DEFAULT_MODEL",
            "UPSTREAM_BASE_URL",
            "UPSTREAM_TOKEN",
            "NGROK_AUTH_TOKEN",
            "DEBUG",
            "FALLBACK",
            "WIDE_CONTEXT",
        ] {
            if let Ok(value) = std::env::var(key) {
                pairs.insert(key.to_string(), value);
            }
        }
        self.apply_pairs(&pairs);
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ProxyError::config(
                "No API key configured. Set PROXY_API_KEY in the environment or config file.",
            ));
        }
        Ok(())
    }
}

/// Parse the line-oriented `KEY=VALUE` format: `#` comments, blank lines,
/// values optionally wrapped in single or double quotes.
fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(line, "skipping malformed config line");
            continue;
        };

        pairs.insert(key.trim().to_string(), unquote(value.trim()).to_string());
    }

    pairs
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("cloudcode-proxy.env"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("cloudcode-proxy").join("config.env"));
    }
    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        paths.push(home.join(".config").join("cloudcode-proxy").join("config.env"));
        paths.push(home.join(".cloudcode-proxy.env"));
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_env_file_format() {
        let content = r#"
# proxy settings
PORT=5000
PROXY_API_KEY="sk-local-abc123"
DEFAULT_MODEL='gemini-3-flash'
DEBUG=true
FALLBACK=0

malformed line without equals
"#;

        let pairs = parse_env_file(content);
        assert_eq!(pairs.get("PORT").unwrap(), "5000");
        assert_eq!(pairs.get("PROXY_API_KEY").unwrap(), "sk-local-abc123");
        assert_eq!(pairs.get("DEFAULT_MODEL").unwrap(), "gemini-3-flash");
        assert_eq!(pairs.get("DEBUG").unwrap(), "true");
        assert!(!pairs.contains_key("malformed line without equals"));
    }

    #[test]
    fn test_load_config_file() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            "PORT=5000\nPROXY_API_KEY=sk-test\nDEBUG=yes\nWIDE_CONTEXT=1"
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.api_key, "sk-test");
        assert!(config.debug);
        assert!(config.wide_context);
        assert!(!config.fallback);
        assert_eq!(config.default_model, "gemini-3-pro");
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "PORT=5000").unwrap();

        // Only meaningful when the environment does not supply the key.
        if std::env::var("PROXY_API_KEY").is_err() {
            assert!(ProxyConfig::load(f.path()).is_err());
        }
    }

    #[test]
    fn test_bool_parsing() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool(v), "{v} should be true");
        }
        for v in ["0", "false", "no", "off", ""] {
            assert!(!parse_bool(v), "{v} should be false");
        }
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("\"unbalanced"), "\"unbalanced");
        assert_eq!(unquote("\""), "\"");
    }
}
