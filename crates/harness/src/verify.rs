//! Verification engine
//!
//! Each assertion carries its own bounded wait. An assertion passes only
//! when two consecutive observations, one poll interval apart, both satisfy
//! it, so an element that flickers into view does not count.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::browser::{BrowserError, BrowserResult, ElementSnapshot, FrameHandle, Locator, Scope};
use crate::config::Timeouts;
use crate::error::{HarnessError, HarnessResult};
use crate::evidence::Artifact;
use crate::session::Session;
use crate::target::{locate, normalize_text, Target};
use crate::wait::Deadline;

/// The condition an assertion checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Expectation {
    /// At least one matching element is displayed
    Visible,
    /// No matching element is displayed
    Hidden,
    /// A displayed element's text equals `value` (whitespace-normalised)
    Text { value: String },
    /// A displayed element's text contains `value`
    Contains { value: String },
    /// At least `min` matching elements are displayed
    CountAtLeast { min: usize },
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Visible => f.write_str("visible"),
            Expectation::Hidden => f.write_str("hidden"),
            Expectation::Text { value } => write!(f, "text \"{value}\""),
            Expectation::Contains { value } => write!(f, "text containing \"{value}\""),
            Expectation::CountAtLeast { min } => write!(f, "at least {min} displayed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(flatten)]
    pub expect: Expectation,
    pub target: Target,
    /// Overrides the default assertion timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Account roles the assertion applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Assertion {
    pub fn new(expect: Expectation, target: Target) -> Self {
        Self {
            expect,
            target,
            timeout_ms: None,
            roles: Vec::new(),
        }
    }

    pub fn visible(target: Target) -> Self {
        Self::new(Expectation::Visible, target)
    }

    pub fn hidden(target: Target) -> Self {
        Self::new(Expectation::Hidden, target)
    }

    pub fn text(target: Target, value: impl Into<String>) -> Self {
        Self::new(Expectation::Text { value: value.into() }, target)
    }

    pub fn contains(target: Target, value: impl Into<String>) -> Self {
        Self::new(Expectation::Contains { value: value.into() }, target)
    }

    pub fn count_at_least(target: Target, min: usize) -> Self {
        Self::new(Expectation::CountAtLeast { min }, target)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn for_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn applies_to(&self, account: &Account) -> bool {
        self.roles.is_empty()
            || account
                .role
                .as_ref()
                .map_or(false, |role| self.roles.iter().any(|r| r == role))
    }

    fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is {}", self.target, self.expect)
    }
}

/// Outcome of one assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub assertion: String,
    pub passed: bool,
    pub expected: String,
    pub observed: String,
    pub waited_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl VerificationResult {
    /// The typed failure for a result that did not pass.
    pub fn to_error(&self) -> Option<HarnessError> {
        (!self.passed).then(|| HarnessError::Verification {
            assertion: self.assertion.clone(),
            expected: self.expected.clone(),
            observed: self.observed.clone(),
        })
    }
}

struct Observation {
    satisfied: bool,
    observed: String,
    captured_text: Option<String>,
}

fn observe(expect: &Expectation, found: &[(usize, ElementSnapshot)]) -> Observation {
    let displayed: Vec<String> = found
        .iter()
        .filter(|(_, e)| e.visible)
        .map(|(_, e)| normalize_text(&e.text))
        .collect();

    let summary = if displayed.is_empty() {
        format!("{} match(es), none displayed", found.len())
    } else {
        format!("{} displayed: {:?}", displayed.len(), displayed)
    };

    let (satisfied, captured) = match expect {
        Expectation::Visible => (!displayed.is_empty(), displayed.first().cloned()),
        Expectation::Hidden => (displayed.is_empty(), None),
        Expectation::Text { value } => {
            let wanted = normalize_text(value);
            let hit = displayed.iter().find(|t| **t == wanted).cloned();
            (hit.is_some(), hit.or_else(|| displayed.first().cloned()))
        }
        Expectation::Contains { value } => {
            let hit = displayed.iter().find(|t| t.contains(value.as_str())).cloned();
            (hit.is_some(), hit.or_else(|| displayed.first().cloned()))
        }
        Expectation::CountAtLeast { min } => (displayed.len() >= *min, None),
    };

    Observation {
        satisfied,
        observed: summary,
        captured_text: captured.filter(|t| !t.is_empty()),
    }
}

pub struct VerificationEngine {
    default_timeout: Duration,
    poll_interval: Duration,
}

impl VerificationEngine {
    pub fn new(timeouts: &Timeouts) -> Self {
        Self {
            default_timeout: timeouts.assertion,
            poll_interval: timeouts.poll_interval,
        }
    }

    /// Evaluate `assertion` inside `frame`.
    ///
    /// A failed assertion is an `Ok` result with `passed == false`, returned
    /// only once the assertion's own timeout has elapsed. `Err` means the
    /// browser itself failed.
    pub async fn verify(
        &self,
        session: &mut Session,
        frame: &FrameHandle,
        assertion: &Assertion,
    ) -> HarnessResult<VerificationResult> {
        let timeout = assertion.timeout(self.default_timeout);
        let deadline = Deadline::after(timeout, self.poll_interval);
        let scope = Scope::Frame(frame.clone());
        let mut first_sighting = false;

        loop {
            let last = match locate(session.page(), &scope, &assertion.target).await {
                Ok(found) => {
                    let observation = observe(&assertion.expect, &found);
                    if observation.satisfied && first_sighting {
                        info!(assertion = %assertion, "Assertion passed");
                        return Ok(VerificationResult {
                            assertion: assertion.to_string(),
                            passed: true,
                            expected: assertion.expect.to_string(),
                            observed: observation.observed,
                            waited_ms: deadline.elapsed().as_millis() as u64,
                            captured_text: observation.captured_text,
                            artifact: None,
                        });
                    }
                    if observation.satisfied {
                        // Confirm on the next observation, never past the deadline
                        first_sighting = true;
                        sleep(self.poll_interval.min(deadline.remaining())).await;
                        continue;
                    }
                    first_sighting = false;
                    observation.observed
                }
                Err(e) if e.is_transient() => {
                    first_sighting = false;
                    e.to_string()
                }
                Err(BrowserError::FrameReplaced(name)) => {
                    return Err(HarnessError::FrameUnavailable {
                        frame: name,
                        reason: format!(
                            "document '{}' is no longer loaded while checking {assertion}",
                            frame.content_id
                        ),
                    });
                }
                Err(e) => return Err(e.into()),
            };

            debug!(assertion = %assertion, "not yet: {last}");
            if !deadline.tick().await {
                warn!(assertion = %assertion, observed = %last, "Assertion failed");
                return Ok(VerificationResult {
                    assertion: assertion.to_string(),
                    passed: false,
                    expected: assertion.expect.to_string(),
                    observed: last,
                    waited_ms: deadline.elapsed().as_millis() as u64,
                    captured_text: None,
                    artifact: None,
                });
            }
        }
    }

    /// Look for the host's transient group overlay.
    ///
    /// Its presence is only an observation: it is logged and returned, never
    /// dismissed, and never fails the instance.
    pub async fn probe_overlay(&self, session: &mut Session) -> Option<String> {
        let text = session.settings().host.overlay_text.clone();
        if text.trim().is_empty() {
            return None;
        }
        let probe: BrowserResult<Vec<ElementSnapshot>> = session
            .page()
            .query(&Scope::Page, &Locator::Text(text.clone()))
            .await;
        match probe {
            Ok(found) if found.iter().any(|e| e.visible) => {
                let note = format!("overlay \"{text}\" was displayed before verification");
                warn!(account = %session.account().id, "{note}");
                Some(note)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("overlay probe failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::browser::Role;
    use crate::config::{HostProfile, Settings};
    use crate::frame::FrameResolver;
    use crate::menu::{MenuNavigator, MenuStep};
    use crate::sim::{HostScript, SimElement, SimScreen, SimulatedHost};
    use crate::target::TextMatch;

    async fn on_screen(script: HostScript, account: Account, screen: &str) -> (Session, FrameHandle) {
        let account = Arc::new(account);
        let host = SimulatedHost::new(script.with_account(&account));
        let timeouts = Timeouts::default();
        let settings = Arc::new(Settings::new("http://portal.test", HostProfile::default(), timeouts));
        let mut session = Session::open(&host, account, settings).await.unwrap();
        session.login().await.unwrap();

        let navigator = MenuNavigator::new(FrameResolver::new("contentFrame", &timeouts), &timeouts);
        let path = [MenuStep::button("Content"), MenuStep::menu_item(screen)];
        let arrival = navigator.open(&mut session, &path, None).await.unwrap();
        (session, arrival.frame)
    }

    fn tester() -> Account {
        Account::new("TESTER01", "Acme Corp", "secret")
    }

    fn engine() -> VerificationEngine {
        VerificationEngine::new(&Timeouts::default())
    }

    fn portal() -> HostScript {
        HostScript::demo_portal(HostProfile::default())
    }

    #[test]
    fn test_assertion_yaml_shapes() {
        let assertion: Assertion = serde_yaml::from_str(
            "expect: text\ntarget:\n  role: heading\n  name: ECN Detail\nvalue: ECN Detail\ntimeout_ms: 5000\n",
        )
        .unwrap();
        assert_eq!(
            assertion.expect,
            Expectation::Text {
                value: "ECN Detail".into()
            }
        );
        assert_eq!(assertion.timeout_ms, Some(5000));

        let assertion: Assertion = serde_yaml::from_str(
            "expect: count_at_least\nmin: 2\ntarget:\n  css: '.results-grid tr'\nroles: [admin]\n",
        )
        .unwrap();
        assert_eq!(assertion.expect, Expectation::CountAtLeast { min: 2 });
        assert_eq!(assertion.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_role_restricted_assertion() {
        let assertion = Assertion::visible(Target::css("#export")).for_roles(["admin"]);
        assert!(assertion.applies_to(&tester().with_role("admin")));
        assert!(!assertion.applies_to(&tester().with_role("viewer")));
        assert!(!assertion.applies_to(&tester()));
        assert!(Assertion::visible(Target::css("#export")).applies_to(&tester()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_element_passes_within_its_own_timeout() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;
        let search = Assertion::visible(Target::css("#searchButton"));

        let result = engine().verify(&mut session, &frame, &search).await.unwrap();
        assert!(result.passed, "{result:?}");
        assert!(result.waited_ms >= 800);
        assert_eq!(result.captured_text.as_deref(), Some("Search"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_only_after_timeout() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;
        let missing = Assertion::visible(Target::css("#printButton"))
            .with_timeout(Duration::from_secs(3));

        let result = engine().verify(&mut session, &frame, &missing).await.unwrap();
        assert!(!result.passed);
        assert!(result.waited_ms >= 3000);
        assert!(matches!(result.to_error(), Some(HarnessError::Verification { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flickering_element_does_not_pass() {
        let script = portal().with_screen(
            "Content",
            SimScreen::new("Saved").with(
                SimElement::css("#toast", "Saved").vanishing_after(Duration::from_millis(50)),
            ),
        );
        let (mut session, frame) = on_screen(script, tester(), "Saved").await;
        let toast = Assertion::visible(Target::css("#toast")).with_timeout(Duration::from_secs(2));

        let result = engine().verify(&mut session, &frame, &toast).await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passed_element_is_still_present_afterwards() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;
        let status = Assertion::visible(Target::css("#statusBar"));

        let result = engine().verify(&mut session, &frame, &status).await.unwrap();
        assert!(result.passed);
        let again = locate(session.page(), &Scope::Frame(frame), &status.target)
            .await
            .unwrap();
        assert!(again.iter().any(|(_, e)| e.visible));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_contains_and_count() {
        let (mut session, frame) = on_screen(portal(), tester(), "Country Information").await;
        let engine = engine();

        let heading = Assertion::text(
            Target::role(Role::Heading, TextMatch::exact("Country Information")),
            "Country Information",
        );
        assert!(engine.verify(&mut session, &frame, &heading).await.unwrap().passed);

        let rows = Assertion::count_at_least(Target::css(".results-grid tr"), 2);
        assert!(engine.verify(&mut session, &frame, &rows).await.unwrap().passed);

        let row = Assertion::contains(Target::css(".results-grid tr"), "Territory");
        let result = engine.verify(&mut session, &frame, &row).await.unwrap();
        assert_eq!(result.captured_text.as_deref(), Some("Acme Territory"));

        let wrong = Assertion::text(Target::css(".results-grid tr"), "Country")
            .with_timeout(Duration::from_secs(1));
        assert!(!engine.verify(&mut session, &frame, &wrong).await.unwrap().passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_gated_control_is_hidden_from_other_roles() {
        let edit = Target::role(Role::Button, TextMatch::exact("Edit"));

        let (mut session, frame) =
            on_screen(portal(), tester().with_role("viewer"), "Country Information").await;
        let hidden = Assertion::hidden(edit.clone());
        assert!(engine().verify(&mut session, &frame, &hidden).await.unwrap().passed);

        let (mut session, frame) =
            on_screen(portal(), tester().with_role("admin"), "Country Information").await;
        let visible = Assertion::visible(edit);
        assert!(engine().verify(&mut session, &frame, &visible).await.unwrap().passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_is_observed_not_fatal() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;
        // The demo portal keeps its overlay up for two seconds after login
        let note = engine().probe_overlay(&mut session).await;
        assert!(note.is_some());

        let status = Assertion::visible(Target::css("#statusBar"));
        assert!(engine().verify(&mut session, &frame, &status).await.unwrap().passed);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine().probe_overlay(&mut session).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopened_screen_makes_old_handle_unavailable() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;

        // buttons: user menu, Content; the first item is ECN Detail again
        session.page().click(&Scope::Page, &Locator::Role(Role::Button), 1).await.unwrap();
        session.page().click(&Scope::Page, &Locator::Role(Role::MenuItem), 0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        let status = Assertion::visible(Target::css("#statusBar"));
        let err = engine().verify(&mut session, &frame, &status).await.unwrap_err();
        assert!(matches!(err, HarnessError::FrameUnavailable { .. }), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_postback_fails_fast_instead_of_timing_out() {
        let script = HostScript {
            postback_after: Some(Duration::from_millis(500)),
            ..portal()
        };
        let (mut session, frame) = on_screen(script, tester(), "ECN Detail").await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        let status = Assertion::visible(Target::css("#statusBar"));
        let err = engine().verify(&mut session, &frame, &status).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FrameUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_stays_within_timeout() {
        let (mut session, frame) = on_screen(portal(), tester(), "ECN Detail").await;

        // The search button settles 800 ms after the frame is ready
        let search = Assertion::visible(Target::css("#searchButton"))
            .with_timeout(Duration::from_millis(800));
        let result = engine().verify(&mut session, &frame, &search).await.unwrap();
        assert!(result.waited_ms <= 800, "waited {} ms", result.waited_ms);
    }
}
