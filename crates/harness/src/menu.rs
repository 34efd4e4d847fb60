//! Menu navigation through the host shell
//!
//! A menu path is an ordered list of controls addressed by role and
//! accessible name. Every step must match exactly one visible control; a
//! pass only counts once the content frame resolves and, when configured,
//! the screen's ready marker is visible inside it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, FrameHandle, Role, Scope};
use crate::config::Timeouts;
use crate::error::{HarnessError, HarnessResult};
use crate::frame::FrameResolver;
use crate::session::Session;
use crate::target::{wait_unique, wait_visible, Target, TextMatch};
use crate::wait::{Deadline, RetryPolicy, WaitError};

/// One control on the way to a screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuStep {
    pub role: Role,
    pub name: TextMatch,
}

impl MenuStep {
    pub fn new(role: Role, name: TextMatch) -> Self {
        Self { role, name }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::new(Role::Button, TextMatch::exact(name))
    }

    pub fn menu_item(name: impl Into<String>) -> Self {
        Self::new(Role::MenuItem, TextMatch::exact(name))
    }

    pub fn target(&self) -> Target {
        Target::role(self.role, self.name.clone())
    }
}

impl fmt::Display for MenuStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.name)
    }
}

/// Where a successful navigation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub frame: FrameHandle,
    pub attempts: u32,
}

pub struct MenuNavigator {
    frame: FrameResolver,
    policy: RetryPolicy,
    step_timeout: Duration,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl MenuNavigator {
    pub fn new(frame: FrameResolver, timeouts: &Timeouts) -> Self {
        Self {
            frame,
            policy: RetryPolicy::new(timeouts.navigation_budget),
            step_timeout: timeouts.menu_step,
            ready_timeout: timeouts.assertion,
            poll_interval: timeouts.poll_interval,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Walk `path` and wait for the screen to land, repeating the whole
    /// path while the navigation budget allows.
    ///
    /// An ambiguous step is never retried.
    pub async fn open(
        &self,
        session: &mut Session,
        path: &[MenuStep],
        ready: Option<&Target>,
    ) -> HarnessResult<Arrival> {
        let mut retry = self.policy.start();
        loop {
            let attempt = retry.attempt();
            match self.pass(session, path, ready).await {
                Ok(frame) => {
                    info!(attempt, frame = %frame.content_id, "Screen reached");
                    return Ok(Arrival {
                        frame,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, "Navigation pass did not land: {e}");
                    if !retry.backoff().await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn pass(
        &self,
        session: &mut Session,
        path: &[MenuStep],
        ready: Option<&Target>,
    ) -> HarnessResult<FrameHandle> {
        for step in path {
            self.click_step(session, step).await?;
        }

        let frame = self.frame.resolve_default(session).await?;

        if let Some(marker) = ready {
            let deadline = Deadline::after(self.ready_timeout, self.poll_interval);
            let scope = Scope::Frame(frame.clone());
            wait_visible(session.page(), &scope, marker, &deadline)
                .await
                .map_err(|e| match e {
                    WaitError::Fatal(BrowserError::FrameReplaced(name)) => {
                        HarnessError::FrameUnavailable {
                            frame: name,
                            reason: "content replaced before the screen was ready".to_string(),
                        }
                    }
                    WaitError::Fatal(e) => HarnessError::Browser(e),
                    other => HarnessError::Verification {
                        assertion: format!("screen ready marker {marker}"),
                        expected: "visible".to_string(),
                        observed: other.to_string(),
                    },
                })?;
        }
        Ok(frame)
    }

    async fn click_step(&self, session: &mut Session, step: &MenuStep) -> HarnessResult<()> {
        let target = step.target();
        let deadline = Deadline::after(self.step_timeout, self.poll_interval);
        let index = wait_unique(session.page(), &Scope::Page, &target, &deadline)
            .await
            .map_err(|e| match e {
                WaitError::Ambiguous { count } => HarnessError::AmbiguousMatch {
                    target: target.to_string(),
                    count,
                },
                WaitError::Fatal(e) => HarnessError::Browser(e),
                timed_out => HarnessError::Navigation {
                    step: step.to_string(),
                    reason: timed_out.to_string(),
                },
            })?;

        session
            .page()
            .click(&Scope::Page, &target.locator, index)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    HarnessError::Navigation {
                        step: step.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    HarnessError::Browser(e)
                }
            })?;
        debug!(step = %step, "clicked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::account::Account;
    use crate::config::{HostProfile, Settings};
    use crate::sim::{HostScript, SimElement, SimEvent, SimulatedHost};

    fn account() -> Arc<Account> {
        Arc::new(Account::new("TESTER01", "Acme Corp", "secret"))
    }

    async fn signed_in(script: HostScript) -> (SimulatedHost, Session) {
        let host = SimulatedHost::new(script.with_account(&account()));
        let settings = Arc::new(Settings::new(
            "http://portal.test",
            HostProfile::default(),
            Timeouts::default(),
        ));
        let mut session = Session::open(&host, account(), settings).await.unwrap();
        session.login().await.unwrap();
        (host, session)
    }

    fn navigator() -> MenuNavigator {
        let timeouts = Timeouts::default();
        MenuNavigator::new(FrameResolver::new("contentFrame", &timeouts), &timeouts)
    }

    fn portal() -> HostScript {
        HostScript::demo_portal(HostProfile::default())
    }

    #[test]
    fn test_menu_step_yaml() {
        let steps: Vec<MenuStep> = serde_yaml::from_str(
            "- role: button\n  name: Content\n- role: menuitem\n  name:\n    regex: 'Global Tariffs'\n",
        )
        .unwrap();
        assert_eq!(steps[0], MenuStep::button("Content"));
        assert_eq!(steps[1].to_string(), "menuitem /Global Tariffs/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_name_picks_one_of_two_siblings() {
        let (host, mut session) = signed_in(portal()).await;
        let path = [MenuStep::button("Content"), MenuStep::menu_item("Global Tariffs")];

        let arrival = navigator().open(&mut session, &path, None).await.unwrap();
        assert_eq!(arrival.attempts, 1);

        let opened: Vec<_> = host
            .events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::ScreenOpened(_)))
            .collect();
        assert_eq!(opened, vec![SimEvent::ScreenOpened("Global Tariffs".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_pattern_excludes_quick_lookup() {
        let (host, mut session) = signed_in(portal()).await;
        let path = [
            MenuStep::button("Content"),
            MenuStep::new(Role::MenuItem, TextMatch::pattern("Global Tariffs").unwrap()),
        ];

        navigator().open(&mut session, &path, None).await.unwrap();
        assert!(host
            .events()
            .contains(&SimEvent::ScreenOpened("Global Tariffs".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loose_pattern_is_ambiguous_and_not_retried() {
        let (host, mut session) = signed_in(portal()).await;
        let path = [
            MenuStep::button("Content"),
            MenuStep::new(Role::MenuItem, TextMatch::pattern("Global Tariffs.*").unwrap()),
        ];

        let started = tokio::time::Instant::now();
        let err = navigator().open(&mut session, &path, None).await.unwrap_err();
        assert!(matches!(err, HarnessError::AmbiguousMatch { count: 2, .. }), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!host
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::ScreenOpened(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swallowed_click_is_retried() {
        let script = HostScript {
            ignored_menu_clicks: 1,
            ..portal()
        };
        let (_host, mut session) = signed_in(script).await;
        let path = [MenuStep::button("Content"), MenuStep::menu_item("ECN Detail")];

        let arrival = navigator().open(&mut session, &path, None).await.unwrap();
        assert_eq!(arrival.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_control_is_navigation_error() {
        let (_host, mut session) = signed_in(portal()).await;
        let path = [MenuStep::button("Content"), MenuStep::menu_item("Vessel Schedule")];

        let err = navigator().open(&mut session, &path, None).await.unwrap_err();
        assert!(matches!(err, HarnessError::Navigation { .. }), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_marker_must_appear_in_frame() {
        let (_host, mut session) = signed_in(portal()).await;
        let path = [MenuStep::button("Content"), MenuStep::menu_item("Country Information")];
        let ready = Target::css(".results-grid tr");

        let arrival = navigator().open(&mut session, &path, Some(&ready)).await.unwrap();
        assert_eq!(arrival.attempts, 1);
        assert_eq!(session.frame(), Some(&arrival.frame));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_marker_hidden_from_role_is_not_landed() {
        let script = portal().with_screen(
            "Admin",
            crate::sim::SimScreen::new("Audit Log")
                .with(SimElement::role(Role::Heading, "Audit Log").visible_to("admin")),
        );
        let (_host, mut session) = signed_in(script).await;
        let path = [MenuStep::button("Admin"), MenuStep::menu_item("Audit Log")];
        let ready = Target::role(Role::Heading, TextMatch::exact("Audit Log"));

        let navigator = navigator().with_policy(RetryPolicy::new(Duration::from_secs(1)));
        let err = navigator.open(&mut session, &path, Some(&ready)).await.unwrap_err();
        assert!(matches!(err, HarnessError::Verification { .. }), "got {err}");
    }
}
