//! Full login/navigate/verify/logout lifecycles against the simulated host
//!
//! Run with: cargo test --package rolecheck --test lifecycle

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rolecheck::error::ErrorKind;
use rolecheck::evidence::ArtifactKind;
use rolecheck::sim::SimEvent;
use rolecheck::{
    Account, HarnessError, HostProfile, HostScript, InstanceReport, Phase, RunnerConfig, Scenario,
    ScenarioRunner, Settings, SimulatedHost, StaticAccounts, Timeouts,
};

const ECN_DETAIL: &str = include_str!("../../../scenarios/ecn-detail.yaml");
const COUNTRY_INFORMATION: &str = include_str!("../../../scenarios/country-information.yaml");
const GLOBAL_TARIFFS: &str = include_str!("../../../scenarios/global-tariffs.yaml");

fn tester() -> Account {
    Account::new("TESTER01", "Acme Corp", "secret")
}

fn runner(host: &SimulatedHost, evidence: &Path) -> ScenarioRunner {
    ScenarioRunner::new(
        Arc::new(host.clone()),
        Settings::new("http://portal.test", HostProfile::default(), Timeouts::default()),
        RunnerConfig {
            evidence_dir: evidence.join("evidence"),
            output_dir: evidence.to_path_buf(),
            concurrency: 4,
        },
    )
}

fn portal(accounts: &[Account]) -> HostScript {
    accounts
        .iter()
        .fold(HostScript::demo_portal(HostProfile::default()), |script, account| {
            script.with_account(account)
        })
}

fn error_kind(report: &InstanceReport) -> Option<ErrorKind> {
    report.error.as_ref().map(|e| e.kind)
}

#[tokio::test(start_paused = true)]
async fn ecn_detail_completes_with_two_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let host = SimulatedHost::new(portal(&[tester()]));
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;

    assert_eq!(report.phase, Phase::Done, "{:?}", report.error);
    assert_eq!(
        report.trace,
        vec![
            Phase::Init,
            Phase::LoggedIn,
            Phase::Navigated,
            Phase::Verified,
            Phase::LoggedOut,
            Phase::Done
        ]
    );
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.passed));

    assert_eq!(report.evidence.len(), 2);
    for artifact in &report.evidence {
        assert_eq!(artifact.kind, ArtifactKind::Evidence);
        assert!(artifact.label.contains("TESTER01"), "{}", artifact.label);
        assert!(artifact.path.exists());
    }
    assert!(report.results[1].artifact.is_some());

    // The demo portal shows its group overlay right after login
    assert_eq!(report.observations.len(), 1);

    let events = host.events();
    assert!(events.contains(&SimEvent::SignedOut("TESTER01".into())));
    assert_eq!(events.last(), Some(&SimEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn frame_that_never_attaches_fails_and_still_logs_out() {
    let dir = tempfile::tempdir().unwrap();
    let script = HostScript {
        frame_never_attaches: true,
        ..portal(&[tester()])
    };
    let host = SimulatedHost::new(script);
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;

    assert_eq!(report.phase, Phase::Failed);
    assert_eq!(error_kind(&report), Some(ErrorKind::FrameUnavailable));
    assert_eq!(report.trace, vec![Phase::Init, Phase::LoggedIn, Phase::Failed]);
    assert!(report.teardown_error.is_none());

    assert_eq!(report.evidence.len(), 1);
    assert_eq!(report.evidence[0].kind, ArtifactKind::Failure);
    assert!(report.evidence[0].label.starts_with("FAILED ECN Detail [TESTER01]"));

    let events = host.events();
    assert!(events.contains(&SimEvent::SignedOut("TESTER01".into())));
    assert!(events.contains(&SimEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn failed_logout_does_not_mask_verification_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = HostScript {
        sign_out_broken: true,
        ..portal(&[tester()])
    };
    let host = SimulatedHost::new(script);
    let scenario = Scenario::from_yaml(
        r#"
name: Vessel Schedule
menu:
  - { role: button, name: Content }
  - { role: menuitem, name: ECN Detail }
steps:
  - action: verify
    expect: visible
    target: { css: '#vesselGrid' }
    timeout_ms: 2000
"#,
    )
    .unwrap();

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;

    assert_eq!(report.phase, Phase::Failed);
    assert_eq!(error_kind(&report), Some(ErrorKind::Verification));
    assert_eq!(
        report.teardown_error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Session)
    );
    assert_eq!(report.results.len(), 1);
    assert!(!report.results[0].passed);
    assert!(host.events().contains(&SimEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn rejected_login_fails_without_logout() {
    let dir = tempfile::tempdir().unwrap();
    // The host knows no accounts at all
    let host = SimulatedHost::new(HostScript::demo_portal(HostProfile::default()));
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;

    assert_eq!(error_kind(&report), Some(ErrorKind::Auth));
    assert_eq!(report.trace, vec![Phase::Init, Phase::Failed]);
    let events = host.events();
    assert!(!events.iter().any(|e| matches!(e, SimEvent::SignedOut(_))));
    assert!(events.contains(&SimEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn ceiling_closes_the_browser_context() {
    let dir = tempfile::tempdir().unwrap();
    let script = HostScript {
        frame_never_attaches: true,
        ..portal(&[tester()])
    };
    let host = SimulatedHost::new(script);
    let mut scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();
    scenario.ceiling_ms = Some(5_000);

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;

    assert_eq!(report.phase, Phase::Failed);
    assert_eq!(error_kind(&report), Some(ErrorKind::Timeout));
    let events = host.events();
    assert!(events.contains(&SimEvent::SignedOut("TESTER01".into())));
    assert!(events.contains(&SimEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn postback_on_the_screen_is_followed_to_the_new_document() {
    let dir = tempfile::tempdir().unwrap();
    let script = HostScript {
        postback_after: Some(Duration::from_millis(100)),
        ..portal(&[tester()])
    };
    let host = SimulatedHost::new(script);

    let report = runner(&host, dir.path())
        .run_instance(&Scenario::from_yaml(ECN_DETAIL).unwrap(), Arc::new(tester()))
        .await;

    assert_eq!(report.phase, Phase::Done, "{:?}", report.error);
    assert!(!report.results.is_empty());
    assert!(report.results.iter().all(|r| r.passed));
}

#[tokio::test(start_paused = true)]
async fn one_failing_account_does_not_abort_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let ghost = Account::new("GHOST99", "Acme Corp", "nope");
    let host = SimulatedHost::new(portal(&[tester()]));
    let scenarios = vec![
        Scenario::from_yaml(ECN_DETAIL).unwrap(),
        Scenario::from_yaml(GLOBAL_TARIFFS).unwrap(),
    ];
    let accounts = StaticAccounts(vec![ghost, tester()]);

    let runner = runner(&host, dir.path());
    let suite = runner.run_suite(&accounts, &scenarios).await.unwrap();

    assert_eq!(suite.total, 4);
    assert_eq!(suite.passed, 2);
    assert_eq!(suite.failed, 2);
    for report in &suite.results {
        assert!(report.phase.is_terminal());
        assert_eq!(report.passed(), report.account == "TESTER01");
    }
    // Reports keep the dataset order even for parallel scenarios
    assert_eq!(suite.results[0].account, "GHOST99");
    assert_eq!(suite.results[1].account, "TESTER01");

    let path = runner.write_results(&suite).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["failed"], 2);
    assert!(!json.to_string().contains("nope"));
}

#[tokio::test(start_paused = true)]
async fn role_specific_assertions_follow_the_account_role() {
    let dir = tempfile::tempdir().unwrap();
    let viewer = Account::new("VIEWER02", "Acme Corp", "pw").with_role("viewer");
    let admin = Account::new("ADMIN001", "Acme Corp", "pw").with_role("admin");
    let host = SimulatedHost::new(portal(&[viewer.clone(), admin.clone()]));
    let scenarios = vec![
        Scenario::from_yaml(GLOBAL_TARIFFS).unwrap(),
        Scenario::from_yaml(COUNTRY_INFORMATION).unwrap(),
    ];

    let suite = runner(&host, dir.path())
        .run_suite(&StaticAccounts(vec![viewer, admin]), &scenarios)
        .await
        .unwrap();

    assert!(suite.success(), "{:#?}", suite.failures().collect::<Vec<_>>());
    let tariffs: Vec<_> = suite
        .results
        .iter()
        .filter(|r| r.scenario == "Global Tariffs")
        .collect();
    assert_eq!(tariffs.len(), 2);
    for report in tariffs {
        // The shared heading check plus the role's own export check
        assert_eq!(report.results.len(), 2);
    }
    // Only the full tariff screen was ever opened
    assert!(!host
        .events()
        .contains(&SimEvent::ScreenOpened("Global Tariffs (Quick Lookup)".into())));
}

#[tokio::test(start_paused = true)]
async fn parallel_instances_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let accounts: Vec<Account> = (1..=4)
        .map(|n| Account::new(format!("TESTER0{n}"), "Acme Corp", "secret"))
        .collect();
    let host = SimulatedHost::new(portal(&accounts));
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();
    assert!(scenario.parallel);

    let shared: Vec<Arc<Account>> = accounts.into_iter().map(Arc::new).collect();
    let reports = runner(&host, dir.path()).run_scenario(&scenario, &shared).await;

    assert_eq!(reports.len(), 4);
    for (report, account) in reports.iter().zip(&shared) {
        assert_eq!(report.account, account.id);
        assert_eq!(report.phase, Phase::Done);
        assert!(report
            .evidence
            .iter()
            .all(|a| a.path.to_string_lossy().contains(account.id.as_str())));
    }
    let closed = host.events().iter().filter(|e| **e == SimEvent::Closed).count();
    assert_eq!(closed, 4);
}

#[tokio::test]
async fn empty_dataset_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let host = SimulatedHost::new(HostScript::default());
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();

    let err = runner(&host, dir.path())
        .run_suite(&StaticAccounts(Vec::new()), &[scenario])
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Data(_)));
    assert!(err.is_fatal_to_run());
}

#[tokio::test]
async fn launch_failure_is_reported_per_instance() {
    let dir = tempfile::tempdir().unwrap();
    let host = SimulatedHost::new(HostScript {
        launch_failure: true,
        ..HostScript::default()
    });
    let scenario = Scenario::from_yaml(ECN_DETAIL).unwrap();

    let report = runner(&host, dir.path())
        .run_instance(&scenario, Arc::new(tester()))
        .await;
    assert_eq!(report.phase, Phase::Failed);
    assert_eq!(error_kind(&report), Some(ErrorKind::Browser));
}
