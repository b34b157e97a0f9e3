//! The one browser session the harvest phase drives. Thin wrapper over
//! chromiumoxide: launch options, bounded element waits, typing/clicking,
//! in-page evaluation, snapshots, proxy auth.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, Proxy};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:70.0) Gecko/20100101 Firefox/70.0";

/// Launch args for running Chromium inside a container.
const HARDENING_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--single-process",
    "--disable-gpu",
];

/// Upper bound for element-appearance waits.
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    slow_mo: Duration,
}

impl Session {
    pub async fn launch(config: &Config) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.browser.viewport.width, config.browser.viewport.height);
        if !config.browser.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.browser.executable {
            builder = builder.chrome_executable(executable);
        }

        let mut args: Vec<String> = HARDENING_ARGS.iter().map(|s| s.to_string()).collect();
        args.extend(config.browser.args.iter().cloned());
        if let Some(proxy) = &config.proxy {
            args.push(format!("--proxy-server={}", proxy.server));
        }
        for arg in args {
            builder = builder.arg(arg);
        }

        let browser_config = builder.build().map_err(|e| anyhow!(e))?;

        info!("Launching browser");
        let (browser, mut cdp) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = cdp.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;
        page.set_user_agent(USER_AGENT).await?;

        let session = Self {
            browser,
            page,
            handler,
            slow_mo: Duration::from_millis(config.browser.slow_mo_ms),
        };
        if let Some(proxy) = &config.proxy {
            if proxy.username.is_some() || proxy.password.is_some() {
                session.authenticate_proxy(proxy).await?;
            }
        }
        Ok(session)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!("goto {}", url);
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;
        self.pause().await;
        Ok(())
    }

    /// Wait for a selector to appear, polling up to a bounded deadline.
    pub async fn wait_for(&self, selector: &str) -> Result<Element> {
        let deadline = Instant::now() + ELEMENT_TIMEOUT;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => sleep(POLL_INTERVAL).await,
                Err(e) => {
                    return Err(anyhow!(e).context(format!(
                        "Timed out after {:?} waiting for `{}`",
                        ELEMENT_TIMEOUT, selector
                    )))
                }
            }
        }
    }

    /// Single lookup. Absence is a normal state here, not a wait condition.
    pub async fn try_find(&self, selector: &str) -> Option<Element> {
        self.page.find_element(selector).await.ok()
    }

    /// Trimmed `innerText` of the first match, `None` when the element is
    /// missing or empty.
    pub async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        let Some(element) = self.try_find(selector).await else {
            return Ok(None);
        };
        let text = element.inner_text().await?;
        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    pub async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.wait_for(selector).await?;
        element.click().await?;
        element.type_str(text).await?;
        self.pause().await;
        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let element = self.wait_for(selector).await?;
        element.scroll_into_view().await?;
        element.click().await?;
        self.pause().await;
        Ok(())
    }

    pub async fn evaluate<T: DeserializeOwned>(&self, js: &str) -> Result<T> {
        let value = self
            .page
            .evaluate(js)
            .await
            .context("Page evaluation failed")?;
        value
            .into_value::<T>()
            .context("Unexpected evaluation result shape")
    }

    pub async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await
            .with_context(|| format!("Failed to save screenshot {}", path.display()))?;
        Ok(())
    }

    pub async fn html(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page HTML")
    }

    /// Fixed settle delay for renders that expose no completion signal.
    pub async fn settle(&self, duration: Duration) {
        sleep(duration).await;
    }

    async fn pause(&self) {
        if !self.slow_mo.is_zero() {
            sleep(self.slow_mo).await;
        }
    }

    /// Answer the proxy's auth challenge through the CDP fetch domain. Once
    /// the domain is enabled every request stalls until continued, so the
    /// responder also keeps ordinary traffic flowing.
    async fn authenticate_proxy(&self, proxy: &Proxy) -> Result<()> {
        info!("Enabling proxy authentication");
        let username = proxy.username.clone().unwrap_or_default();
        let password = proxy.password.clone().unwrap_or_default();

        self.page
            .execute(EnableParams {
                patterns: None,
                handle_auth_requests: Some(true),
            })
            .await
            .context("Failed to enable request interception")?;

        let mut auth_events = self
            .page
            .event_listener::<EventAuthRequired>()
            .await
            .context("Failed to listen for auth challenges")?;
        let mut paused_events = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("Failed to listen for paused requests")?;

        let page = self.page.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = auth_events.next() => {
                        let response = AuthChallengeResponse {
                            response: AuthChallengeResponseResponse::ProvideCredentials,
                            username: Some(username.clone()),
                            password: Some(password.clone()),
                        };
                        let cmd = ContinueWithAuthParams::new(event.request_id.clone(), response);
                        if let Err(e) = page.execute(cmd).await {
                            warn!("Proxy auth response failed: {}", e);
                        }
                    }
                    Some(event) = paused_events.next() => {
                        let cmd = ContinueRequestParams::new(event.request_id.clone());
                        if let Err(e) = page.execute(cmd).await {
                            debug!("Continue request failed: {}", e);
                        }
                    }
                    else => break,
                }
            }
        });
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.context("Failed to close browser")?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}
