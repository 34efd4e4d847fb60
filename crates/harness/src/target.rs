//! Accessible-name matching and bounded element lookup
//!
//! A [`Target`] is a coarse engine [`Locator`] narrowed by an accessible-name
//! [`TextMatch`]. Matching defaults to exact text so that sibling menu
//! entries such as "Global Tariffs" and "Global Tariffs (Quick Lookup)" can
//! never be confused.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserPage, ElementSnapshot, Locator, Role, Scope};
use crate::wait::{Deadline, WaitError};

/// Collapse runs of whitespace and trim, the way accessible names are computed.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How an accessible name is compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TextMatchRepr", into = "TextMatchRepr")]
pub enum TextMatch {
    /// Whitespace-normalised equality
    Exact(String),
    /// Full-string regular expression match
    Pattern { source: String, regex: Regex },
    /// Normalised name starts with the given text
    Prefix(String),
}

impl TextMatch {
    pub fn exact(text: impl Into<String>) -> Self {
        TextMatch::Exact(text.into())
    }

    /// Compile `pattern` anchored at both ends.
    pub fn pattern(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let source = pattern.into();
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(TextMatch::Pattern { source, regex })
    }

    pub fn prefix(text: impl Into<String>) -> Self {
        TextMatch::Prefix(text.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = normalize_text(candidate);
        match self {
            TextMatch::Exact(text) => candidate == normalize_text(text),
            TextMatch::Pattern { regex, .. } => regex.is_match(&candidate),
            TextMatch::Prefix(text) => candidate.starts_with(&normalize_text(text)),
        }
    }
}

impl PartialEq for TextMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TextMatch::Exact(a), TextMatch::Exact(b)) => a == b,
            (TextMatch::Pattern { source: a, .. }, TextMatch::Pattern { source: b, .. }) => a == b,
            (TextMatch::Prefix(a), TextMatch::Prefix(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(text) => write!(f, "\"{text}\""),
            TextMatch::Pattern { source, .. } => write!(f, "/{source}/"),
            TextMatch::Prefix(text) => write!(f, "\"{text}\"*"),
        }
    }
}

/// On-disk shape: a bare string is an exact match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TextMatchRepr {
    Plain(String),
    Tagged(TaggedMatch),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedMatch {
    Exact(String),
    Regex(String),
    Prefix(String),
}

impl TryFrom<TextMatchRepr> for TextMatch {
    type Error = regex::Error;

    fn try_from(repr: TextMatchRepr) -> Result<Self, Self::Error> {
        match repr {
            TextMatchRepr::Plain(text) | TextMatchRepr::Tagged(TaggedMatch::Exact(text)) => {
                Ok(TextMatch::Exact(text))
            }
            TextMatchRepr::Tagged(TaggedMatch::Regex(pattern)) => TextMatch::pattern(pattern),
            TextMatchRepr::Tagged(TaggedMatch::Prefix(text)) => Ok(TextMatch::Prefix(text)),
        }
    }
}

impl From<TextMatch> for TextMatchRepr {
    fn from(matcher: TextMatch) -> Self {
        match matcher {
            TextMatch::Exact(text) => TextMatchRepr::Plain(text),
            TextMatch::Pattern { source, .. } => TextMatchRepr::Tagged(TaggedMatch::Regex(source)),
            TextMatch::Prefix(text) => TextMatchRepr::Tagged(TaggedMatch::Prefix(text)),
        }
    }
}

/// An addressable control: engine locator plus optional name filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(flatten)]
    pub locator: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<TextMatch>,
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            locator: Locator::Css(selector.into()),
            name: None,
        }
    }

    pub fn role(role: Role, name: TextMatch) -> Self {
        Self {
            locator: Locator::Role(role),
            name: Some(name),
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self {
            locator: Locator::Label(text.into()),
            name: None,
        }
    }

    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            locator: Locator::Text(fragment.into()),
            name: None,
        }
    }

    pub fn accepts(&self, element: &ElementSnapshot) -> bool {
        self.name
            .as_ref()
            .map_or(true, |matcher| matcher.matches(&element.name))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} name={}", self.locator, name),
            None => write!(f, "{}", self.locator),
        }
    }
}

/// Elements accepted by `target`, paired with their index in the locator result.
pub async fn locate(
    page: &mut dyn BrowserPage,
    scope: &Scope,
    target: &Target,
) -> crate::browser::BrowserResult<Vec<(usize, ElementSnapshot)>> {
    let elements = page.query(scope, &target.locator).await?;
    Ok(elements
        .into_iter()
        .enumerate()
        .filter(|(_, element)| target.accepts(element))
        .collect())
}

fn describe(found: &[(usize, ElementSnapshot)]) -> String {
    let visible = found.iter().filter(|(_, e)| e.visible).count();
    format!("{} match(es), {} visible", found.len(), visible)
}

/// Wait until at least one accepted element is visible; returns the first.
pub async fn wait_visible(
    page: &mut dyn BrowserPage,
    scope: &Scope,
    target: &Target,
    deadline: &Deadline,
) -> Result<usize, WaitError> {
    loop {
        let last = match locate(page, scope, target).await {
            Ok(found) => {
                if let Some((index, _)) = found.iter().find(|(_, e)| e.visible) {
                    return Ok(*index);
                }
                describe(&found)
            }
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(WaitError::Fatal(e)),
        };
        debug!(target = %target, %scope, "waiting for visible: {last}");
        if !deadline.tick().await {
            return Err(WaitError::TimedOut {
                waited: deadline.elapsed(),
                last,
            });
        }
    }
}

/// Wait until exactly one accepted element is visible.
///
/// More than one visible match fails immediately with
/// [`WaitError::Ambiguous`]: a clearer matcher is needed, not more time.
pub async fn wait_unique(
    page: &mut dyn BrowserPage,
    scope: &Scope,
    target: &Target,
    deadline: &Deadline,
) -> Result<usize, WaitError> {
    loop {
        let last = match locate(page, scope, target).await {
            Ok(found) => {
                let visible: Vec<usize> = found
                    .iter()
                    .filter(|(_, e)| e.visible)
                    .map(|(index, _)| *index)
                    .collect();
                match visible.as_slice() {
                    [index] => return Ok(*index),
                    [] => describe(&found),
                    many => return Err(WaitError::Ambiguous { count: many.len() }),
                }
            }
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(WaitError::Fatal(e)),
        };
        if !deadline.tick().await {
            return Err(WaitError::TimedOut {
                waited: deadline.elapsed(),
                last,
            });
        }
    }
}

/// Wait until no accepted element is visible.
pub async fn wait_hidden(
    page: &mut dyn BrowserPage,
    scope: &Scope,
    target: &Target,
    deadline: &Deadline,
) -> Result<(), WaitError> {
    loop {
        let last = match locate(page, scope, target).await {
            Ok(found) if found.iter().all(|(_, e)| !e.visible) => return Ok(()),
            Ok(found) => describe(&found),
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(WaitError::Fatal(e)),
        };
        if !deadline.tick().await {
            return Err(WaitError::TimedOut {
                waited: deadline.elapsed(),
                last,
            });
        }
    }
}
