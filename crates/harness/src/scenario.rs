//! Declarative YAML scenario files

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::account::Account;
use crate::error::{HarnessError, HarnessResult};
use crate::menu::MenuStep;
use crate::target::Target;
use crate::verify::Assertion;

/// One screen-verification workflow, independent of the account running it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, also used in evidence labels
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether accounts may run this scenario concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Legacy screen the menu path leads to; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,

    /// Controls to click, in order, to reach the screen
    pub menu: Vec<MenuStep>,

    /// Element inside the content frame that marks the screen as landed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Target>,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,

    /// Overrides the whole-instance ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling_ms: Option<u64>,
}

/// A single step after the screen is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Assert a condition inside the content frame
    Verify(Assertion),

    /// Take a screenshot mid-scenario
    Capture {
        name: String,
        /// Element of the content frame; the whole page when omitted
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Target>,
    },
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios under a directory, ordered by path
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "scenario directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut scenarios: Vec<Self> = Vec::new();
        let mut names = HashSet::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let scenario = Self::from_file(entry.path())?;
            if !names.insert(scenario.name.clone()) {
                return Err(HarnessError::Config(format!(
                    "scenario name '{}' is used by more than one file",
                    scenario.name
                )));
            }
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::Config("scenario name is empty".to_string()));
        }
        if self.menu.is_empty() {
            return Err(HarnessError::Config(format!(
                "scenario '{}' has an empty menu path",
                self.name
            )));
        }
        if !self.steps.iter().any(|s| matches!(s, ScenarioStep::Verify(_))) {
            return Err(HarnessError::Config(format!(
                "scenario '{}' has no verify step",
                self.name
            )));
        }
        Ok(())
    }

    pub fn screen_name(&self) -> &str {
        self.screen.as_deref().unwrap_or(&self.name)
    }

    /// Index of the last verify step that applies to `account`; the success
    /// evidence is captured there.
    pub fn final_verify_index(&self, account: &Account) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|step| matches!(step, ScenarioStep::Verify(a) if a.applies_to(account)))
    }
}
