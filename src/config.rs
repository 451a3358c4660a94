//! Options model: the immutable configuration record every other
//! component is constructed from.
//!
//! Assembled by layering CLI flags over an optional JSON config file
//! layered over defaults, validated once in [`Options::validate`].

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Options {
    pub logging: LoggingOptions,
    pub chrome: ChromeOptions,
    pub scan: ScanOptions,
    pub writer: WriterOptions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingOptions {
    /// Raise the log level to DEBUG.
    pub debug: bool,
    /// Log per-target errors (invalid scheme, navigation failure, ...).
    pub log_scan_errors: bool,
    /// Suppress everything but ERROR.
    pub silence: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            debug: false,
            log_scan_errors: true,
            silence: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChromeOptions {
    /// Path to a Chrome/Chromium binary. Mutually exclusive with `wss_url`.
    pub binary_path: Option<String>,
    /// DevTools websocket endpoint of an already-running browser. When set,
    /// the engine connects instead of launching its own browser.
    pub wss_url: Option<String>,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub extra_headers: Vec<String>,
    pub window_x: u32,
    pub window_y: u32,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            binary_path: None,
            wss_url: None,
            proxy: None,
            user_agent: "Mozilla/5.0 (compatible; webwitness/0.1)".to_string(),
            extra_headers: Vec::new(),
            window_x: 1920,
            window_y: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanOptions {
    pub driver_name: String,
    pub workers: usize,
    pub timeout_seconds: u64,
    pub delay_seconds: u64,
    pub allowed_schemes: Vec<String>,
    pub skip_html: bool,
    pub screenshot_path: PathBuf,
    pub screenshot_format: ScreenshotFormat,
    pub screenshot_full_page: bool,
    pub screenshot_embed_in_result: bool,
    pub screenshot_skip_disk: bool,
    pub javascript_file: Option<PathBuf>,
    #[serde(skip)]
    pub javascript: Option<String>,
    pub save_content: bool,
    pub selector: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            driver_name: "chromedp".to_string(),
            workers: 4,
            timeout_seconds: 30,
            delay_seconds: 0,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            skip_html: false,
            screenshot_path: PathBuf::from("./screenshots"),
            screenshot_format: ScreenshotFormat::Jpeg,
            screenshot_full_page: false,
            screenshot_embed_in_result: false,
            screenshot_skip_disk: false,
            javascript_file: None,
            javascript: None,
            save_content: false,
            selector: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    Jpeg,
    Png,
}

impl ScreenshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ScreenshotFormat::Jpeg => "jpeg",
            ScreenshotFormat::Png => "png",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ScreenshotFormat::Jpeg => image::ImageFormat::Jpeg,
            ScreenshotFormat::Png => image::ImageFormat::Png,
        }
    }
}

impl std::str::FromStr for ScreenshotFormat {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ScreenshotFormat::Jpeg),
            "png" => Ok(ScreenshotFormat::Png),
            other => Err(ProbeError::Config(format!(
                "unsupported screenshot format: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterOptions {
    pub stdout: bool,
    pub jsonl_path: Option<PathBuf>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            jsonl_path: None,
        }
    }
}

impl Options {
    /// Read `javascript_file` (if set) and create `screenshot_path` (unless
    /// disk writes are skipped), then validate.
    pub async fn finalize(mut self) -> Result<Self, ProbeError> {
        if let Some(path) = &self.scan.javascript_file {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                ProbeError::Config(format!("failed to read javascript_file {path:?}: {e}"))
            })?;
            self.scan.javascript = Some(content);
        }

        if !self.scan.screenshot_skip_disk {
            tokio::fs::create_dir_all(&self.scan.screenshot_path).await?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.scan.workers == 0 {
            return Err(ProbeError::Config("workers must be greater than 0".into()));
        }
        if self.scan.timeout_seconds == 0 {
            return Err(ProbeError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.chrome.window_x == 0 || self.chrome.window_y == 0 {
            return Err(ProbeError::Config(
                "window dimensions must be greater than 0".into(),
            ));
        }
        if self.chrome.binary_path.is_some() && self.chrome.wss_url.is_some() {
            return Err(ProbeError::Config(
                "binary_path and wss_url are mutually exclusive".into(),
            ));
        }
        if self.scan.allowed_schemes.is_empty() {
            return Err(ProbeError::Config("allowed_schemes must not be empty".into()));
        }
        Ok(())
    }

    pub async fn load_file(path: &Path) -> Result<Options, ProbeError> {
        let content = tokio::fs::read_to_string(path).await?;
        let options: Options = serde_json::from_str(&content)?;
        Ok(options)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            logging: LoggingOptions::default(),
            chrome: ChromeOptions::default(),
            scan: ScanOptions::default(),
            writer: WriterOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut options = Options::default();
        options.scan.workers = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn binary_path_and_wss_url_conflict() {
        let mut options = Options::default();
        options.chrome.binary_path = Some("/usr/bin/chromium".to_string());
        options.chrome.wss_url = Some("ws://127.0.0.1:9222".to_string());
        assert!(options.validate().is_err());
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!(
            "JPEG".parse::<ScreenshotFormat>().unwrap(),
            ScreenshotFormat::Jpeg
        );
        assert!("webp".parse::<ScreenshotFormat>().is_err());
    }
}
