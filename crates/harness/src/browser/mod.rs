//! Browser capability interface
//!
//! The harness never talks to a browser engine directly. Everything it needs
//! (navigation, element queries, clicks, frame lookup, screenshots) goes
//! through [`BrowserPage`], one instance per session. Engines only resolve
//! coarse [`Locator`]s; accessible-name matching happens in
//! [`crate::target`] so every backend shares the same semantics.

pub mod webdriver;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ARIA roles the harness addresses controls by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Button,
    #[serde(rename = "menuitem", alias = "menu_item")]
    MenuItem,
    Link,
    Tab,
    Textbox,
    Heading,
    Checkbox,
    Dialog,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Button => "button",
            Role::MenuItem => "menuitem",
            Role::Link => "link",
            Role::Tab => "tab",
            Role::Textbox => "textbox",
            Role::Heading => "heading",
            Role::Checkbox => "checkbox",
            Role::Dialog => "dialog",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-level element query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// A CSS selector; only for stable, documented attributes.
    Css(String),
    /// Every element exposing the given accessible role.
    Role(Role),
    /// The form control associated with a visible label text.
    Label(String),
    /// Innermost elements whose text contains the fragment.
    Text(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={s}"),
            Locator::Role(r) => write!(f, "role={r}"),
            Locator::Label(l) => write!(f, "label=\"{l}\""),
            Locator::Text(t) => write!(f, "text=\"{t}\""),
        }
    }
}

/// What an engine reports about one matched element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Accessible name (aria-label, else text, else title/value)
    pub name: String,
    /// Rendered text content
    pub text: String,
    /// Whether the element is displayed
    pub visible: bool,
}

/// Handle to the content of the named embedded frame.
///
/// `content_id` identifies the document loaded in the frame: two handles
/// with equal ids refer to the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameHandle {
    pub name: String,
    pub content_id: String,
}

/// Where a query or action is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Page,
    Frame(FrameHandle),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Page => f.write_str("page"),
            Scope::Frame(frame) => write!(f, "frame '{}'", frame.name),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("no element matches {0}")]
    NoSuchElement(String),

    #[error("element went stale: {0}")]
    StaleElement(String),

    #[error("frame '{0}' is not available")]
    NoSuchFrame(String),

    /// The frame now holds a different document than the handle refers to.
    /// Waiting on the old handle cannot succeed, so this is not transient.
    #[error("content of frame '{0}' was replaced")]
    FrameReplaced(String),

    #[error("browser disconnected: {0}")]
    Disconnected(String),

    #[error("failed to launch browser session: {0}")]
    Launch(String),

    #[error("webdriver protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Transient errors are expected while the UI settles and are retried
    /// by bounded waits until their deadline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::NoSuchElement(_)
                | BrowserError::StaleElement(_)
                | BrowserError::NoSuchFrame(_)
        )
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// One browser page/tab in its own isolated context.
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;

    /// Snapshot every element matching `locator` in `scope`, in document order.
    /// No match is an empty list, not an error.
    async fn query(&mut self, scope: &Scope, locator: &Locator)
        -> BrowserResult<Vec<ElementSnapshot>>;

    /// Click the `index`-th element matching `locator`.
    async fn click(&mut self, scope: &Scope, locator: &Locator, index: usize) -> BrowserResult<()>;

    /// Replace the value of the `index`-th matching form control.
    async fn fill(
        &mut self,
        scope: &Scope,
        locator: &Locator,
        index: usize,
        value: &str,
    ) -> BrowserResult<()>;

    /// Send a Tab key press to the `index`-th matching element.
    async fn press_tab(&mut self, scope: &Scope, locator: &Locator, index: usize)
        -> BrowserResult<()>;

    /// Whether a frame element with this name exists in the page.
    async fn frame_attached(&mut self, name: &str) -> BrowserResult<bool>;

    /// Handle to the frame's content once it is loaded and queryable.
    async fn frame_content(&mut self, name: &str) -> BrowserResult<Option<FrameHandle>>;

    /// PNG screenshot of the viewport, or of one element when given.
    async fn screenshot(
        &mut self,
        scope: &Scope,
        element: Option<(&Locator, usize)>,
    ) -> BrowserResult<Vec<u8>>;

    /// Tear down the browser context.
    async fn close(&mut self) -> BrowserResult<()>;
}

/// Creates a fresh, isolated page per scenario instance.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserPage>>;
}
