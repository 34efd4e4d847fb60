//! WebDriver backend built on fantoccini
//!
//! Each launched page is its own WebDriver session, so every session gets a
//! fresh browser profile. Frame-scoped calls re-enter the frame from the top
//! level each time: the host may replace the frame element between calls.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    BrowserError, BrowserLauncher, BrowserPage, BrowserResult, ElementSnapshot, FrameHandle,
    Locator, Role, Scope,
};
use crate::config::{BrowserKind, HarnessConfig, Viewport};
use crate::error::{HarnessError, HarnessResult};
use crate::wait::{poll_until, Probe};

/// WebDriver key code for Tab
const TAB_KEY: &str = "\u{e004}";

/// Snapshot every element matched by an XPath or CSS expression.
const QUERY_SCRIPT: &str = r#"
const [kind, expr] = arguments;
let nodes = [];
if (kind === 'css') {
  nodes = Array.from(document.querySelectorAll(expr));
} else {
  const found = document.evaluate(expr, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  for (let i = 0; i < found.snapshotLength; i++) nodes.push(found.snapshotItem(i));
}
const norm = s => (s || '').replace(/\s+/g, ' ').trim();
return nodes.map(el => {
  const style = window.getComputedStyle(el);
  const visible = style.display !== 'none' && style.visibility !== 'hidden' && el.getClientRects().length > 0;
  const value = typeof el.value === 'string' ? norm(el.value) : '';
  const text = norm(el.innerText !== undefined ? el.innerText : el.textContent) || value;
  const label = el.labels && el.labels.length ? norm(el.labels[0].innerText) : '';
  const name = norm(el.getAttribute('aria-label')) || label || text || norm(el.getAttribute('title'));
  return { name, text, visible };
});
"#;

/// Token identifying the document currently loaded in the frame, or null
/// while it is still loading.
const CONTENT_TOKEN_SCRIPT: &str = r#"
if (document.readyState === 'loading' || !document.body) return null;
// A freshly injected frame holds the initial blank document first
if (!document.URL || document.URL === 'about:blank') return null;
if (!document.__rolecheckToken) {
  document.__rolecheckToken = Date.now().toString(36) + Math.random().toString(36).slice(2);
}
return document.__rolecheckToken;
"#;

/// Quote `text` as an XPath string literal.
pub(crate) fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn role_xpath(role: Role) -> &'static str {
    match role {
        Role::Button => {
            "//button | //*[@role='button'] | //input[@type='button' or @type='submit' or @type='reset']"
        }
        Role::MenuItem => {
            "//*[@role='menuitem' or @role='menuitemcheckbox' or @role='menuitemradio']"
        }
        Role::Link => "//a[@href] | //*[@role='link']",
        Role::Tab => "//*[@role='tab']",
        Role::Textbox => {
            "//input[not(@type) or @type='text' or @type='password' or @type='email' or @type='search' or @type='tel' or @type='url' or @type='number'] | //textarea | //*[@role='textbox']"
        }
        Role::Heading => "//h1 | //h2 | //h3 | //h4 | //h5 | //h6 | //*[@role='heading']",
        Role::Checkbox => "//input[@type='checkbox'] | //*[@role='checkbox']",
        Role::Dialog => "//dialog | //*[@role='dialog' or @role='alertdialog']",
    }
}

/// Engine expression for a locator: `("css", selector)` or `("xpath", expr)`.
pub(crate) fn expression(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Css(selector) => ("css", selector.clone()),
        Locator::Role(role) => ("xpath", role_xpath(*role).to_string()),
        Locator::Label(label) => {
            let l = xpath_literal(label.trim());
            (
                "xpath",
                format!(
                    "//*[@id = //label[normalize-space(.)={l}]/@for] \
                     | //label[normalize-space(.)={l}]//*[self::input or self::select or self::textarea] \
                     | //*[(self::input or self::select or self::textarea) and (@aria-label={l} or @placeholder={l})]"
                ),
            )
        }
        Locator::Text(fragment) => {
            let t = xpath_literal(fragment);
            (
                "xpath",
                format!(
                    "//body//*[not(self::script or self::style) and contains(normalize-space(.), {t}) \
                     and not(*[contains(normalize-space(.), {t})])]"
                ),
            )
        }
    }
}

fn frame_selector(name: &str) -> String {
    format!("iframe[name=\"{name}\"], frame[name=\"{name}\"]")
}

/// Map a WebDriver error message onto the transient/fatal classification.
pub(crate) fn classify_message(message: &str) -> BrowserError {
    let lower = message.to_lowercase();
    let message = message.to_string();
    if lower.contains("stale element") {
        BrowserError::StaleElement(message)
    } else if lower.contains("no such frame") {
        BrowserError::NoSuchFrame(message)
    } else if lower.contains("no such element") || lower.contains("not interactable") {
        BrowserError::NoSuchElement(message)
    } else if lower.contains("invalid session id")
        || lower.contains("no such window")
        || lower.contains("disconnected")
        || lower.contains("connection refused")
    {
        BrowserError::Disconnected(message)
    } else {
        BrowserError::Protocol(message)
    }
}

fn classify(e: CmdError) -> BrowserError {
    classify_message(&e.to_string())
}

/// Launches one WebDriver session per page.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    webdriver_url: String,
    browser: BrowserKind,
    headless: bool,
    viewport: Viewport,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: impl Into<String>, browser: BrowserKind) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            browser,
            headless: true,
            viewport: Viewport::default(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            browser: config.browser,
            headless: config.headless,
            viewport: config.viewport,
        }
    }

    pub fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut caps = serde_json::Map::new();
        match self.browser {
            BrowserKind::Firefox => {
                let mut args = Vec::new();
                if self.headless {
                    args.push("--headless".to_string());
                }
                args.push(format!("--width={}", self.viewport.width));
                args.push(format!("--height={}", self.viewport.height));
                caps.insert("browserName".to_string(), json!("firefox"));
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserKind::Chromium => {
                let mut args = vec!["--no-sandbox".to_string()];
                if self.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                args.push(format!(
                    "--window-size={},{}",
                    self.viewport.width, self.viewport.height
                ));
                caps.insert("browserName".to_string(), json!("chrome"));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }
        caps
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        debug!("Connecting to WebDriver at {}", self.webdriver_url);
        let client = ClientBuilder::rustls()
            .map_err(|e| BrowserError::Launch(e.to_string()))?
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        if let Err(e) = client
            .set_window_size(self.viewport.width, self.viewport.height)
            .await
        {
            debug!("Could not set window size: {e}");
        }

        Ok(Box::new(WebDriverPage { client }))
    }
}

/// One WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    async fn enter(&mut self, scope: &Scope) -> BrowserResult<()> {
        self.client.enter_frame(None).await.map_err(classify)?;
        if let Scope::Frame(frame) = scope {
            self.enter_named(&frame.name).await?;
            let token = self.content_token().await?;
            if token.map(|t| format!("{}#{}", frame.name, t)).as_deref()
                != Some(frame.content_id.as_str())
            {
                return Err(BrowserError::FrameReplaced(frame.name.clone()));
            }
        }
        Ok(())
    }

    async fn enter_named(&mut self, name: &str) -> BrowserResult<()> {
        let frame = self
            .client
            .find(WdLocator::Css(&frame_selector(name)))
            .await
            .map_err(|_| BrowserError::NoSuchFrame(name.to_string()))?;
        frame.enter_frame().await.map_err(classify)?;
        Ok(())
    }

    async fn content_token(&mut self) -> BrowserResult<Option<String>> {
        let value = self
            .client
            .execute(CONTENT_TOKEN_SCRIPT, vec![])
            .await
            .map_err(classify)?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn element(
        &mut self,
        scope: &Scope,
        locator: &Locator,
        index: usize,
    ) -> BrowserResult<fantoccini::elements::Element> {
        self.enter(scope).await?;
        let (kind, expr) = expression(locator);
        let found = if kind == "css" {
            self.client.find_all(WdLocator::Css(&expr)).await
        } else {
            self.client.find_all(WdLocator::XPath(&expr)).await
        }
        .map_err(classify)?;
        found
            .into_iter()
            .nth(index)
            .ok_or_else(|| BrowserError::NoSuchElement(format!("{locator} #{index}")))
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.client.goto(url).await.map_err(classify)
    }

    async fn query(&mut self, scope: &Scope, locator: &Locator) -> BrowserResult<Vec<ElementSnapshot>> {
        self.enter(scope).await?;
        let (kind, expr) = expression(locator);
        let value = self
            .client
            .execute(QUERY_SCRIPT, vec![json!(kind), json!(expr)])
            .await
            .map_err(classify)?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::Protocol(format!("unexpected query result: {e}")))
    }

    async fn click(&mut self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<()> {
        let element = self.element(scope, locator, index).await?;
        element.click().await.map_err(classify)?;
        Ok(())
    }

    async fn fill(
        &mut self,
        scope: &Scope,
        locator: &Locator,
        index: usize,
        value: &str,
    ) -> BrowserResult<()> {
        let element = self.element(scope, locator, index).await?;
        element.clear().await.map_err(classify)?;
        element.send_keys(value).await.map_err(classify)
    }

    async fn press_tab(&mut self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<()> {
        let element = self.element(scope, locator, index).await?;
        element.send_keys(TAB_KEY).await.map_err(classify)
    }

    async fn frame_attached(&mut self, name: &str) -> BrowserResult<bool> {
        self.client.enter_frame(None).await.map_err(classify)?;
        let frames = self
            .client
            .find_all(WdLocator::Css(&frame_selector(name)))
            .await
            .map_err(classify)?;
        Ok(!frames.is_empty())
    }

    async fn frame_content(&mut self, name: &str) -> BrowserResult<Option<FrameHandle>> {
        self.client.enter_frame(None).await.map_err(classify)?;
        self.enter_named(name).await?;
        Ok(self.content_token().await?.map(|token| FrameHandle {
            name: name.to_string(),
            content_id: format!("{name}#{token}"),
        }))
    }

    async fn screenshot(
        &mut self,
        scope: &Scope,
        element: Option<(&Locator, usize)>,
    ) -> BrowserResult<Vec<u8>> {
        match element {
            Some((locator, index)) => {
                let element = self.element(scope, locator, index).await?;
                element.screenshot().await.map_err(classify)
            }
            None => {
                self.client.enter_frame(None).await.map_err(classify)?;
                self.client.screenshot().await.map_err(classify)
            }
        }
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.client.clone().close().await.map_err(classify)
    }
}

/// Wait until the WebDriver server at `url` reports itself ready.
pub async fn check_webdriver(url: &str, timeout: Duration) -> HarnessResult<()> {
    let status_url = format!("{}/status", url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| HarnessError::Config(format!("cannot build HTTP client: {e}")))?;

    info!("Waiting for WebDriver at {}", status_url);
    poll_until(timeout, Duration::from_millis(500), || {
        let request = client.get(&status_url).send();
        async move {
            match request.await {
                Ok(response) => match response.json::<Value>().await {
                    Ok(body) if body["value"]["ready"].as_bool().unwrap_or(true) => Probe::Ready(()),
                    Ok(body) => Probe::Pending(format!(
                        "not ready: {}",
                        body["value"]["message"].as_str().unwrap_or("no message")
                    )),
                    Err(e) => Probe::Pending(format!("unreadable status: {e}")),
                },
                Err(e) => Probe::Pending(e.to_string()),
            }
        }
    })
    .await
    .map_err(|e| {
        HarnessError::Browser(BrowserError::Launch(format!(
            "WebDriver at {url} is not available: {e}"
        )))
    })
}
