//! Validate Command
//!
//! Loads everything a run would load and reports problems without opening a
//! browser.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use rolecheck::{AccountFile, AccountSource, Scenario, ScenarioStep};

use super::run::{load_config, select_scenarios, RunArgs, EXIT_OK};
use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

/// Scenario summary for display
#[derive(Debug, Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub menu: String,
    pub verifications: usize,
    pub captures: usize,
    pub parallel: bool,
    pub tags: Vec<String>,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        let verifications = scenario
            .steps
            .iter()
            .filter(|s| matches!(s, ScenarioStep::Verify(_)))
            .count();
        Self {
            name: scenario.name.clone(),
            menu: scenario
                .menu
                .iter()
                .map(|step| step.to_string())
                .collect::<Vec<_>>()
                .join(" > "),
            verifications,
            captures: scenario.steps.len() - verifications,
            parallel: scenario.parallel,
            tags: scenario.tags.clone(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Menu path", "Checks", "Captures", "Parallel", "Tags"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.menu.clone(),
            self.verifications.to_string(),
            self.captures.to_string(),
            if self.parallel { "✓" } else { "-" }.to_string(),
            self.tags.join(", "),
        ]
    }
}

pub fn execute(args: ValidateArgs, config_path: &Path, format: OutputFormat) -> Result<i32> {
    let config = load_config(config_path, &args.run)?;
    let scenarios = select_scenarios(&config, &args.run)?;
    let accounts = AccountFile::new(&config.accounts_path).load()?;

    let rows: Vec<ScenarioDisplay> = scenarios.iter().map(ScenarioDisplay::from).collect();
    print_list(&rows, format);
    if !format.is_machine_readable() {
        print_success(&format!(
            "{} scenario(s) and {} account(s) are valid",
            scenarios.len(),
            accounts.len()
        ));
    }
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_counts_steps() {
        let scenario = Scenario::from_yaml(
            r#"
name: ECN Detail
menu:
  - { role: button, name: Content }
  - { role: menuitem, name: ECN Detail }
steps:
  - { action: verify, expect: visible, target: { css: '#statusBar' } }
  - { action: capture, name: Status bar }
"#,
        )
        .unwrap();

        let display = ScenarioDisplay::from(&scenario);
        assert_eq!(display.verifications, 1);
        assert_eq!(display.captures, 1);
        assert_eq!(display.row()[0], "ECN Detail");
        assert!(display.menu.contains(" > "));
    }
}
