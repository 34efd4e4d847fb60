//! Run Command

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use rolecheck::{
    check_webdriver, AccountFile, AccountSource, BrowserLauncher, HarnessConfig, HostScript,
    RunnerConfig, Scenario, ScenarioRunner, SimulatedHost, WebDriverLauncher,
};

use crate::output::{self, OutputFormat};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

const WEBDRIVER_PREFLIGHT: Duration = Duration::from_secs(10);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Account dataset (JSON or YAML)
    #[arg(long, env = "ROLECHECK_ACCOUNTS")]
    pub accounts: Option<PathBuf>,

    /// Scenario directory
    #[arg(long, env = "ROLECHECK_SCENARIOS")]
    pub scenarios: Option<PathBuf>,

    /// Base URL of the host application
    #[arg(long, env = "ROLECHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// WebDriver endpoint
    #[arg(long, env = "ROLECHECK_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Directory for the results JSON and evidence
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Only run scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only run the named scenario (repeatable)
    #[arg(short, long)]
    pub scenario: Vec<String>,

    /// Maximum concurrent instances for parallel-safe scenarios
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Drive the built-in simulated portal instead of a browser
    #[arg(long)]
    pub simulate: bool,
}

impl RunArgs {
    /// Command-line values win over the configuration file.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(path) = &self.accounts {
            config.accounts_path = path.clone();
        }
        if let Some(dir) = &self.scenarios {
            config.scenarios_dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver_url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.evidence_dir = dir.join("evidence");
            config.output_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
    }
}

/// Load the configuration file and apply overrides.
pub fn load_config(path: &Path, args: &RunArgs) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load(path)
        .with_context(|| format!("cannot load configuration '{}'", path.display()))?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Scenarios under the configured directory, narrowed by tag and name.
pub fn select_scenarios(config: &HarnessConfig, args: &RunArgs) -> Result<Vec<Scenario>> {
    let mut scenarios = Scenario::load_all(&config.scenarios_dir)?;

    if let Some(tag) = &args.tag {
        scenarios.retain(|s| s.tags.iter().any(|t| t == tag));
    }
    if !args.scenario.is_empty() {
        for name in &args.scenario {
            if !scenarios.iter().any(|s| &s.name == name) {
                bail!("no scenario named '{name}'");
            }
        }
        scenarios.retain(|s| args.scenario.contains(&s.name));
    }

    if scenarios.is_empty() {
        bail!(
            "no scenarios selected from '{}'",
            config.scenarios_dir.display()
        );
    }
    Ok(scenarios)
}

pub async fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> Result<i32> {
    let config = load_config(config_path, &args)?;
    let scenarios = select_scenarios(&config, &args)?;
    let source = AccountFile::new(&config.accounts_path);

    let launcher: Arc<dyn BrowserLauncher> = if args.simulate {
        // Every dataset account is a valid login on the simulated portal
        let script = source
            .load()?
            .iter()
            .fold(HostScript::demo_portal(config.host.clone()), |script, account| {
                script.with_account(account)
            });
        output::print_notice("Using the simulated portal", format);
        Arc::new(SimulatedHost::new(script))
    } else {
        check_webdriver(&config.webdriver_url, WEBDRIVER_PREFLIGHT)
            .await
            .with_context(|| format!("WebDriver at {} is not ready", config.webdriver_url))?;
        Arc::new(WebDriverLauncher::from_config(&config))
    };

    info!(
        base_url = %config.base_url,
        scenarios = scenarios.len(),
        "Starting run"
    );
    let runner = ScenarioRunner::new(launcher, config.settings(), RunnerConfig::from(&config));
    let report = runner.run_suite(&source, &scenarios).await?;
    let path = runner.write_results(&report)?;

    output::print_suite(&report, format);
    output::print_notice(&format!("Results written to {}", path.display()), format);

    Ok(if report.success() {
        EXIT_OK
    } else {
        EXIT_FAILURES
    })
}
