use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::Page;
use futures::stream::StreamExt;
use lantern_core::BrowserConfig;
use lantern_scanner::{ContextProvider, ScanError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Chromium instance handing out one page per scanner worker.
pub struct BrowserEngine {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserEngine {
    /// Launch Chromium with the given settings.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = Browser::launch(chromium_config(config)?)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Drive the CDP connection
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });

        debug!(headless = config.headless, "launched browser");
        Ok(Self { browser, handler })
    }

    /// Open a blank page.
    pub async fn new_page(&self) -> Result<Page> {
        Ok(self.browser.new_page("about:blank").await?)
    }
}

impl Drop for BrowserEngine {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl ContextProvider for BrowserEngine {
    type Context = Page;

    async fn launch(&self) -> lantern_scanner::Result<Page> {
        self.new_page()
            .await
            .map_err(|e| ScanError::WorkerLaunch(e.to_string()))
    }

    async fn release(&self, page: Page) {
        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close worker page");
        }
    }
}

fn chromium_config(config: &BrowserConfig) -> Result<ChromiumConfig> {
    let mut builder = ChromiumConfig::builder()
        .no_sandbox()
        .window_size(config.window_width, config.window_height)
        .request_timeout(config.navigation_timeout());
    if !config.headless {
        builder = builder.with_head();
    }
    builder.build().map_err(BrowserError::ChromiumError)
}
