//! Rolecheck: role-based UI verification harness
//!
//! This crate drives a framed legacy web application through a browser and
//! checks, per account, which controls each role gets to see:
//! - Loads an ordered account dataset
//! - Logs in through the host's own login form and logs out again
//! - Walks the shell's menus by role and accessible name
//! - Waits for the dynamically injected content frame
//! - Asserts visibility, text and counts with per-assertion bounded waits
//! - Captures screenshot evidence on success and on failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ScenarioRunner (per account)                │
//! │  Init -> LoggedIn -> Navigated -> Verified -> LoggedOut     │
//! │       -> Done            (any step) -> Failed               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AccountSource     load() -> [Account]                      │
//! │  Session           login() / logout() / close()             │
//! │  MenuNavigator     open(path) with bounded-time retry       │
//! │  FrameResolver     attached? -> content ready? -> handle    │
//! │  VerificationEngine verify(frame, assertion)                │
//! │  EvidenceCollector capture() / capture_failure()            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserPage (trait)                                        │
//! │    ├── WebDriverPage  (fantoccini)                          │
//! │    └── SimulatedPage  (in-memory host, tests and dry runs)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod account;
pub mod browser;
pub mod config;
pub mod error;
pub mod evidence;
pub mod frame;
pub mod menu;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod sim;
pub mod target;
pub mod verify;
pub mod wait;

pub use account::{Account, AccountFile, AccountSource, Secret, StaticAccounts, UserMenuRule};
pub use browser::webdriver::{check_webdriver, WebDriverLauncher};
pub use browser::{BrowserLauncher, BrowserPage, FrameHandle, Locator, Role, Scope};
pub use config::{HarnessConfig, HostProfile, Settings, Timeouts};
pub use error::{ErrorKind, HarnessError, HarnessResult};
pub use evidence::{Artifact, ArtifactKind, EvidenceCollector};
pub use frame::FrameResolver;
pub use menu::{MenuNavigator, MenuStep};
pub use runner::{InstanceReport, Phase, RunnerConfig, ScenarioRunner, SuiteReport};
pub use scenario::{Scenario, ScenarioStep};
pub use session::Session;
pub use sim::{HostScript, SimulatedHost};
pub use target::{Target, TextMatch};
pub use verify::{Assertion, Expectation, VerificationEngine, VerificationResult};
