//! The `Driver` implementation built on chromiumoxide. Every target gets
//! its own freshly launched browser process (or, when `wss_url` is set,
//! a fresh page on a shared remote browser) with its own temporary
//! user-data directory. A shared browser with per-target tabs is cheaper
//! but tends to cascade screenshot failures under load, so full
//! per-target isolation is the deliberate trade here.

use crate::assembler::EventAssembler;
use crate::config::Options;
use crate::error::ProbeError;
use crate::fingerprint::FingerprintEngine;
use crate::result::ProbeResult;
use crate::screenshot::capture_screenshot;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::driver::Driver;

/// Chrome command-line flags that disable the batch-automation pain points
/// (media router, first-run prompts, renderer/GPU throttling, sandbox).
fn chrome_args(options: &Options, user_data_dir: &std::path::Path) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=MediaRouter,TranslateUI".to_string(),
        "--disable-client-side-phishing-detection".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--mute-audio".to_string(),
        "--hide-scrollbars".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--explicitly-allowed-ports=1,7,9,11,13,15,17,19,20,21,22,23,25,37,42,43,53,77,79,87,95,101,102,103,104,109,110,111,113,115,117,119,123,135,137,139,143,161,179,389,427,465,512,513,514,515,526,530,531,532,540,548,554,556,563,587,601,636,989,990,993,995,1719,1720,1723,2049,3659,4045,6000,6566,6665,6666,6667,6668,6669,6697".to_string(),
        format!("--window-size={},{}", options.chrome.window_x, options.chrome.window_y),
        format!("--user-agent={}", options.chrome.user_agent),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];

    if let Some(proxy) = &options.chrome.proxy {
        args.push(format!("--proxy-server={proxy}"));
    }

    args
}

/// Owns one target's browser process and its temporary user-data
/// directory. Teardown cancels the browser and removes the directory;
/// never leaves either behind.
struct BrowserAllocation {
    browser: Option<Browser>,
    handler_task: Option<tokio::task::JoinHandle<()>>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserAllocation {
    async fn launch(options: &Options) -> Result<Self, ProbeError> {
        if let Some(wss_url) = &options.chrome.wss_url {
            let (browser, mut handler) = Browser::connect(wss_url)
                .await
                .map_err(|e| ProbeError::BrowserLaunch(e.to_string()))?;
            let handler_task = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });
            return Ok(Self {
                browser: Some(browser),
                handler_task: Some(handler_task),
                user_data_dir: None,
            });
        }

        // This prefix is an external-interface contract (§6), not branding —
        // keep it as `gowitness-v3-*` regardless of the crate's own name.
        let user_data_dir = std::env::temp_dir().join(format!(
            "gowitness-v3-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .map_err(|e| ProbeError::BrowserLaunch(format!("temp dir: {e}")))?;

        let mut builder = BrowserConfig::builder().args(chrome_args(options, &user_data_dir));
        if let Some(chrome_path) = &options.chrome.binary_path {
            builder = builder.chrome_executable(chrome_path);
        }
        let config = builder
            .build()
            .map_err(|e| ProbeError::BrowserLaunch(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            warn!("chrome launch failed: {e}");
            ProbeError::BrowserNotFound
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler_task: Some(handler_task),
            user_data_dir: Some(user_data_dir),
        })
    }

    fn browser(&self) -> &Browser {
        self.browser.as_ref().expect("allocation not yet torn down")
    }

    /// Close the browser, wait for its process to actually exit, then
    /// remove its temporary user-data directory. Each step is awaited
    /// before the next runs so no directory removal races a Chrome
    /// process that still has files open under it.
    async fn teardown(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("error closing browser for {:?}: {e}", self.user_data_dir);
            }
            if let Err(e) = browser.wait().await {
                debug!("error waiting for browser exit for {:?}: {e}", self.user_data_dir);
            }
        }
        if let Some(handle) = self.handler_task.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                debug!("failed to remove temp user-data dir {dir:?}: {e}");
            }
        }
    }
}

pub struct ChromiumDriver {
    options: Arc<Options>,
    fingerprint: Arc<dyn FingerprintEngine>,
}

impl ChromiumDriver {
    pub fn new(options: Arc<Options>, fingerprint: Arc<dyn FingerprintEngine>) -> Self {
        Self { options, fingerprint }
    }

    async fn witness_inner(&self, target: String) -> Result<ProbeResult, ProbeError> {
        let allocation = BrowserAllocation::launch(&self.options).await?;

        let page = allocation
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| ProbeError::Cdp(e.to_string()))?;

        let outcome = self.run_target(&page, &target).await;

        let _ = page.close().await;
        allocation.teardown().await;

        outcome
    }

    async fn run_target(&self, page: &Page, target: &str) -> Result<ProbeResult, ProbeError> {
        let timeout = Duration::from_secs(self.options.scan.timeout_seconds);
        let assembler = EventAssembler::new(target.to_string());

        assembler.prepare(page, &self.options).await?;
        let listeners = assembler.spawn_listeners(page, &self.options).await?;

        // Every subsequent browser interaction for this target — navigation,
        // the delay, user JS, cookies/title/HTML collection — shares one
        // deadline. A timeout anywhere in here is tolerated (partial data is
        // still useful); an actual navigation error is not.
        let navigate = tokio::time::timeout(timeout, async {
            page.goto(target)
                .await
                .map_err(|e| ProbeError::Navigation(e.to_string()))?;

            if self.options.scan.delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(self.options.scan.delay_seconds)).await;
            }

            if let Some(js) = &self.options.scan.javascript {
                if let Err(e) = page.evaluate(js.as_str()).await {
                    debug!("javascript evaluation failed for {target}: {e}");
                }
            }

            assembler.collect_cookies(page).await;
            assembler.collect_title(page).await;
            if !self.options.scan.skip_html {
                assembler.collect_html(page).await;
            }

            Ok::<(), ProbeError>(())
        })
        .await;

        listeners.stop().await;

        let mut result = assembler.into_result().await;

        match navigate {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                result.mark_failed(e.to_string());
                return Ok(result);
            }
            Err(_) => {
                debug!("per-target deadline expired for {target}, continuing with partial data");
            }
        }

        let technologies = self
            .fingerprint
            .detect(&result.headers, result.html.as_deref().unwrap_or(""));
        result.technologies = technologies
            .into_iter()
            .map(|name| crate::result::Technology { name })
            .collect();

        match capture_screenshot(page, &self.options, &mut result).await {
            Ok(()) => {}
            Err(ProbeError::Screenshot(reason)) => {
                result.mark_failed(reason);
            }
            Err(e) => return Err(e),
        }

        Ok(result)
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn witness(&self, target: String) -> Result<ProbeResult, ProbeError> {
        info!("witnessing {target}");
        self.witness_inner(target).await
    }

    async fn close(&self) {
        // No long-lived resources: every target owns its own allocation.
    }
}

impl Drop for BrowserAllocation {
    fn drop(&mut self) {
        if let Some(handle) = self.handler_task.take() {
            handle.abort();
        }
        if self.browser.is_some() {
            error!("BrowserAllocation dropped without teardown(); browser process may leak");
        }
    }
}
