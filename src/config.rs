use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

pub const CHANNEL_PATH: &str = "/ws/video_feed";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    /// Missing file means defaults; a file that exists but does not parse is an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VIEWER_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(url) = lookup("VIEWER_CHANNEL_URL") {
            self.backend.channel_url = Some(url);
        }
        if let Some(source) = lookup("VIEWER_SOURCE") {
            self.stream.source = Some(source);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base = &self.backend.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("backend.base_url must be an http(s) URL, got '{}'", base);
        }
        if let Some(url) = &self.backend.channel_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                bail!("backend.channel_url must be a ws(s) URL, got '{}'", url);
            }
        }
        if self.backend.timeout_secs == 0 || self.backend.upload_timeout_secs == 0 {
            bail!("backend timeouts must be greater than 0");
        }
        if let Some(viewport) = self.display.viewport {
            if viewport.is_empty() {
                bail!("display.viewport must be non-zero, got {}", viewport);
            }
        }
        if self.display.preview_every == 0 {
            bail!("display.preview_every must be greater than 0");
        }
        if self.stream.max_notices == 0 {
            bail!("stream.max_notices must be greater than 0");
        }
        Ok(())
    }

    /// Frame channel address: explicit override, else the base URL with its
    /// scheme swapped to ws/wss.
    pub fn channel_url(&self) -> String {
        if let Some(url) = &self.backend.channel_url {
            return url.clone();
        }
        let base = self.backend.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, CHANNEL_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_point_at_local_backend() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.channel_url(), "ws://localhost:8000/ws/video_feed");
        assert!(config.display.viewport.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_url_derivation() {
        let mut config = Config::default();
        config.backend.base_url = "https://viewer.example.org/".to_string();
        assert_eq!(config.channel_url(), "wss://viewer.example.org/ws/video_feed");

        config.backend.channel_url = Some("ws://10.0.0.5:9000/feed".to_string());
        assert_eq!(config.channel_url(), "ws://10.0.0.5:9000/feed");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend:\n  base_url: http://analysis:8080\ndisplay:\n  viewport:\n    width: 1280\n    height: 720\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.backend.base_url, "http://analysis:8080");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.display.viewport, Some(Size::new(1280, 720)));
        assert_eq!(config.stream.max_notices, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_uses_defaults_but_bad_yaml_fails() {
        let config = Config::load_or_default("/nonexistent/viewer-config.yaml").unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8000");

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "backend: [not, a, map").unwrap();
        assert!(Config::load_or_default(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VIEWER_BACKEND_URL", "http://gpu-box:8000"),
            ("VIEWER_SOURCE", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend.base_url, "http://gpu-box:8000");
        assert_eq!(config.backend.channel_url, None);
        assert_eq!(config.stream.source.as_deref(), Some("0"));
        assert_eq!(config.channel_url(), "ws://gpu-box:8000/ws/video_feed");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();

        config.backend.base_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());
        config.backend.base_url = "http://localhost:8000".to_string();

        config.backend.channel_url = Some("http://localhost:8000/ws".to_string());
        assert!(config.validate().is_err());
        config.backend.channel_url = None;

        config.display.viewport = Some(Size::new(0, 480));
        assert!(config.validate().is_err());
        config.display.viewport = None;

        config.display.preview_every = 0;
        assert!(config.validate().is_err());
        config.display.preview_every = 30;

        assert!(config.validate().is_ok());
    }
}
