//! Harness configuration
//!
//! Loaded from TOML; every field has a default so a missing file or a
//! partial file both work. Timeouts are tuning knobs, not contracts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::account::UserMenuRule;
use crate::error::{HarnessError, HarnessResult};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the host application
    pub base_url: String,

    /// WebDriver endpoint (chromedriver / geckodriver)
    pub webdriver_url: String,

    /// Browser to drive
    pub browser: BrowserKind,

    /// Run without a visible window
    pub headless: bool,

    pub viewport: Viewport,

    /// Credential dataset (JSON or YAML)
    pub accounts_path: PathBuf,

    /// Directory searched recursively for scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Root directory for screenshots
    pub evidence_dir: PathBuf,

    /// Directory for the results JSON
    pub output_dir: PathBuf,

    /// Maximum concurrent instances for parallel-safe scenarios
    pub concurrency: usize,

    pub timeouts: TimeoutConfig,

    pub host: HostProfile,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            browser: BrowserKind::Chromium,
            headless: true,
            viewport: Viewport::default(),
            accounts_path: PathBuf::from("data/accounts.json"),
            scenarios_dir: PathBuf::from("scenarios"),
            evidence_dir: PathBuf::from("test-results/evidence"),
            output_dir: PathBuf::from("test-results"),
            concurrency: 4,
            timeouts: TimeoutConfig::default(),
            host: HostProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    #[serde(alias = "chrome")]
    Chromium,
    Firefox,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            other => Err(HarnessError::Config(format!("unsupported browser: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Wait ceilings, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Login form must appear, and disappear after submit, within this
    pub login_ms: u64,
    /// Content frame element attachment
    pub frame_attach_ms: u64,
    /// Content frame document readiness once attached
    pub frame_content_ms: u64,
    /// Default per-assertion wait
    pub assertion_ms: u64,
    /// Each logout stage
    pub logout_ms: u64,
    /// Each menu control on the navigation path
    pub menu_step_ms: u64,
    /// Time after which no further navigation pass is started
    pub navigation_budget_ms: u64,
    /// Whole-instance ceiling
    pub test_ceiling_ms: u64,
    /// Poll interval of every condition wait
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_ms: 30_000,
            frame_attach_ms: 30_000,
            frame_content_ms: 30_000,
            assertion_ms: 20_000,
            logout_ms: 15_000,
            menu_step_ms: 10_000,
            navigation_budget_ms: 45_000,
            test_ceiling_ms: 180_000,
            poll_interval_ms: 100,
        }
    }
}

/// Resolved durations handed to the components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub login: Duration,
    pub frame_attach: Duration,
    pub frame_content: Duration,
    pub assertion: Duration,
    pub logout: Duration,
    pub menu_step: Duration,
    pub navigation_budget: Duration,
    pub test_ceiling: Duration,
    pub poll_interval: Duration,
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            login: Duration::from_millis(config.login_ms),
            frame_attach: Duration::from_millis(config.frame_attach_ms),
            frame_content: Duration::from_millis(config.frame_content_ms),
            assertion: Duration::from_millis(config.assertion_ms),
            logout: Duration::from_millis(config.logout_ms),
            menu_step: Duration::from_millis(config.menu_step_ms),
            navigation_budget: Duration::from_millis(config.navigation_budget_ms),
            test_ceiling: Duration::from_millis(config.test_ceiling_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Page-specific facts about the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Authentication entry point, relative to `base_url`
    pub login_path: String,
    /// Query parameter carrying the post-login return path
    pub return_param: String,
    pub return_path: String,
    pub company_label: String,
    pub username_label: String,
    pub password_label: String,
    pub login_button: String,
    /// Move focus out of the company field before typing the username
    pub tab_after_company: bool,
    /// Name attribute of the frame the shell injects legacy screens into
    pub content_frame: String,
    pub sign_out_label: String,
    /// Text of the transient "view as" group panel
    pub overlay_text: String,
    pub user_menu: UserMenuRule,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            return_param: "ReturnUrl".to_string(),
            return_path: "/".to_string(),
            company_label: "Company".to_string(),
            username_label: "Username".to_string(),
            password_label: "Password".to_string(),
            login_button: "Log in".to_string(),
            tab_after_company: true,
            content_frame: "contentFrame".to_string(),
            sign_out_label: "Sign out".to_string(),
            overlay_text: "Select group(s) to view as".to_string(),
            user_menu: UserMenuRule::default(),
        }
    }
}

/// Read-only settings shared by every session of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub host: HostProfile,
    pub timeouts: Timeouts,
}

impl Settings {
    pub fn new(base_url: impl Into<String>, host: HostProfile, timeouts: Timeouts) -> Self {
        Self {
            base_url: base_url.into(),
            host,
            timeouts,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(format!("cannot serialise config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(HarnessError::Config("base_url must be set".to_string()));
        }
        if self.host.content_frame.trim().is_empty() {
            return Err(HarnessError::Config(
                "host.content_frame must name the embedded frame".to_string(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "timeouts.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(HarnessError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from(&self.timeouts)
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.base_url.clone(), self.host.clone(), self.timeouts())
    }
}
