//! Scenario runner: login, navigate, verify and logout per (account, scenario)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::account::{Account, AccountSource};
use crate::browser::BrowserLauncher;
use crate::config::{HarnessConfig, Settings};
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::evidence::{Artifact, EvidenceCollector};
use crate::frame::FrameResolver;
use crate::menu::MenuNavigator;
use crate::scenario::{Scenario, ScenarioStep};
use crate::session::Session;
use crate::verify::{VerificationEngine, VerificationResult};

/// Lifecycle of one scenario instance. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    LoggedIn,
    Navigated,
    Verified,
    LoggedOut,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// What the instance was doing when it left this phase.
    fn activity(&self) -> &'static str {
        match self {
            Phase::Init => "login",
            Phase::LoggedIn => "navigation",
            Phase::Navigated => "verification",
            Phase::Verified => "logout",
            Phase::LoggedOut | Phase::Done | Phase::Failed => "teardown",
        }
    }
}

/// Error kind and message as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&HarnessError> for FailureReport {
    fn from(e: &HarnessError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Result of running one scenario as one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    pub scenario: String,
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub phase: Phase,
    pub trace: Vec<Phase>,
    pub navigation_attempts: u32,
    pub results: Vec<VerificationResult>,
    /// Non-fatal observations such as the group overlay
    pub observations: Vec<String>,
    pub evidence: Vec<Artifact>,
    /// Primary cause of failure
    pub error: Option<FailureReport>,
    /// Failure during best-effort logout or teardown, never the primary cause
    pub teardown_error: Option<FailureReport>,
    pub duration_ms: u64,
}

impl InstanceReport {
    fn new(scenario: &Scenario, account: &Account) -> Self {
        Self {
            scenario: scenario.name.clone(),
            account: account.id.clone(),
            role: account.role.clone(),
            phase: Phase::Init,
            trace: vec![Phase::Init],
            navigation_attempts: 0,
            results: Vec::new(),
            observations: Vec::new(),
            evidence: Vec::new(),
            error: None,
            teardown_error: None,
            duration_ms: 0,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
        self.trace.push(phase);
    }

    pub fn passed(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<InstanceReport>,
}

impl SuiteReport {
    pub fn new(started_at: DateTime<Utc>, duration: Duration, results: Vec<InstanceReport>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstanceReport> {
        self.results.iter().filter(|r| !r.passed())
    }
}

/// Where the runner writes and how wide it fans out.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub evidence_dir: PathBuf,
    pub output_dir: PathBuf,
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            evidence_dir: PathBuf::from("test-results/evidence"),
            output_dir: PathBuf::from("test-results"),
            concurrency: 4,
        }
    }
}

impl From<&HarnessConfig> for RunnerConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            evidence_dir: config.evidence_dir.clone(),
            output_dir: config.output_dir.clone(),
            concurrency: config.concurrency,
        }
    }
}

pub struct ScenarioRunner {
    launcher: Arc<dyn BrowserLauncher>,
    settings: Arc<Settings>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settings: Settings, config: RunnerConfig) -> Self {
        Self {
            launcher,
            settings: Arc::new(settings),
            config,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load accounts and run every scenario for every account.
    ///
    /// Only a bad account dataset aborts the run; instance failures are
    /// reported in the returned [`SuiteReport`].
    pub async fn run_suite(
        &self,
        source: &dyn AccountSource,
        scenarios: &[Scenario],
    ) -> HarnessResult<SuiteReport> {
        let accounts: Vec<Arc<Account>> = source.load()?.into_iter().map(Arc::new).collect();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            "Running {} scenario(s) for {} account(s)",
            scenarios.len(),
            accounts.len()
        );

        let mut results = Vec::new();
        for scenario in scenarios {
            results.extend(self.run_scenario(scenario, &accounts).await);
        }

        let report = SuiteReport::new(started_at, start.elapsed(), results);
        info!(
            "Suite finished: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );
        Ok(report)
    }

    /// Run one scenario for each account, concurrently when the scenario
    /// allows it. Reports keep the account order.
    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        accounts: &[Arc<Account>],
    ) -> Vec<InstanceReport> {
        if scenario.parallel && self.config.concurrency > 1 {
            stream::iter(accounts.iter().cloned())
                .map(|account| self.run_instance(scenario, account))
                .buffered(self.config.concurrency)
                .collect()
                .await
        } else {
            let mut reports = Vec::with_capacity(accounts.len());
            for account in accounts {
                reports.push(self.run_instance(scenario, account.clone()).await);
            }
            reports
        }
    }

    /// Run one (account, scenario) instance to a terminal phase.
    pub async fn run_instance(&self, scenario: &Scenario, account: Arc<Account>) -> InstanceReport {
        let span = info_span!("instance", scenario = %scenario.name, account = %account.id);
        self.execute(scenario, account).instrument(span).await
    }

    async fn execute(&self, scenario: &Scenario, account: Arc<Account>) -> InstanceReport {
        let start = Instant::now();
        let mut report = InstanceReport::new(scenario, &account);
        let mut evidence =
            EvidenceCollector::new(&self.config.evidence_dir, &scenario.name, &account.id);

        let mut session =
            match Session::open(self.launcher.as_ref(), account, self.settings.clone()).await {
                Ok(session) => session,
                Err(e) => {
                    error!("✗ cannot open session: {e}");
                    report.error = Some(FailureReport::from(&e));
                    report.enter(Phase::Failed);
                    report.duration_ms = start.elapsed().as_millis() as u64;
                    return report;
                }
            };

        let ceiling = scenario
            .ceiling_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settings.timeouts.test_ceiling);

        let outcome = tokio::time::timeout(
            ceiling,
            self.drive(&mut session, scenario, &mut evidence, &mut report),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(HarnessError::Timeout(ceiling.as_millis() as u64)),
        };

        match failure {
            None => report.enter(Phase::Done),
            Some(e) => {
                error!(kind = %e.kind(), "✗ {} failed during {}: {e}", scenario.name, report.phase.activity());
                evidence
                    .capture_failure(&mut session, report.phase.activity())
                    .await;

                if session.is_authenticated() {
                    if let Err(logout) = session.logout().await {
                        warn!("best-effort logout failed: {logout}");
                        report.teardown_error = Some(FailureReport::from(&logout));
                    }
                }
                report.error = Some(FailureReport::from(&e));
                report.enter(Phase::Failed);
            }
        }

        if let Err(e) = session.close().await {
            warn!("closing browser context failed: {e}");
            report.teardown_error.get_or_insert(FailureReport::from(&e));
        }

        report.evidence = evidence.into_artifacts();
        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.passed() {
            info!("✓ {} ({} ms)", scenario.name, report.duration_ms);
        }
        report
    }

    async fn drive(
        &self,
        session: &mut Session,
        scenario: &Scenario,
        evidence: &mut EvidenceCollector,
        report: &mut InstanceReport,
    ) -> HarnessResult<()> {
        let timeouts = self.settings.timeouts;

        session.login().await?;
        report.enter(Phase::LoggedIn);

        let resolver = FrameResolver::new(self.settings.host.content_frame.clone(), &timeouts);
        let navigator = MenuNavigator::new(resolver.clone(), &timeouts);
        let arrival = navigator
            .open(session, &scenario.menu, scenario.ready.as_ref())
            .await?;
        report.navigation_attempts = arrival.attempts;
        let mut frame = arrival.frame;
        report.enter(Phase::Navigated);

        let engine = VerificationEngine::new(&timeouts);
        if let Some(note) = engine.probe_overlay(session).await {
            report.observations.push(note);
        }

        let final_index = scenario.final_verify_index(session.account());
        for (index, step) in scenario.steps.iter().enumerate() {
            match step {
                ScenarioStep::Verify(assertion) => {
                    if !assertion.applies_to(session.account()) {
                        debug!(assertion = %assertion, "not applicable to this role");
                        continue;
                    }
                    let mut result = match engine.verify(session, &frame, assertion).await {
                        // The screen replaced its document; look it up once more
                        Err(HarnessError::FrameUnavailable { reason, .. }) => {
                            warn!(assertion = %assertion, "{reason}, resolving the frame again");
                            frame = resolver.resolve_default(session).await?;
                            engine.verify(session, &frame, assertion).await?
                        }
                        other => other?,
                    };
                    if let Some(failure) = result.to_error() {
                        report.results.push(result);
                        return Err(failure);
                    }
                    if Some(index) == final_index {
                        let name = format!("{} verified", scenario.screen_name());
                        result.artifact = evidence.capture(session, &name, None).await;
                    }
                    report.results.push(result);
                }
                ScenarioStep::Capture { name, target } => {
                    evidence.capture(session, name, target.as_ref()).await;
                }
            }
        }
        report.enter(Phase::Verified);

        session.logout().await?;
        report.enter(Phase::LoggedOut);
        Ok(())
    }

    /// Write the suite report as pretty JSON.
    pub fn write_results(&self, report: &SuiteReport) -> HarnessResult<PathBuf> {
        write_results(&self.config.output_dir, report)
    }
}

pub fn write_results(output_dir: &Path, report: &SuiteReport) -> HarnessResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("rolecheck-results.json");
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
