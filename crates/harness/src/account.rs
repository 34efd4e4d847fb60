//! Account dataset loading and the identifier-to-display-name rule

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

/// An opaque credential. Never printed, never serialised.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// One login the suite runs every scenario as.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// Login identifier, unique within a run
    #[serde(alias = "identifier", alias = "username")]
    pub id: String,
    /// Company the account signs in under
    #[serde(default)]
    pub company: String,
    #[serde(alias = "password", alias = "secret")]
    pub pass: Secret,
    /// Permission level, used to select role-specific assertions
    #[serde(default)]
    pub role: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, company: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company: company.into(),
            pass: Secret::new(pass),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// How the host renders the signed-in user's menu button.
///
/// The button name is `prefix` followed by the identifier with its first
/// `skip` characters removed. The host appends further characters, so the
/// derived name is matched as a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMenuRule {
    pub prefix: String,
    pub skip: usize,
}

impl UserMenuRule {
    /// Expected user-menu name for `identifier`.
    ///
    /// Identifiers no longer than `skip` keep all their characters: an empty
    /// suffix would make the prefix match any signed-in user.
    pub fn derive(&self, identifier: &str) -> String {
        let length = identifier.chars().count();
        let suffix: String = if length > self.skip {
            identifier.chars().skip(self.skip).collect()
        } else {
            identifier.to_string()
        };
        format!("{}{}", self.prefix, suffix)
    }
}

/// Supplies the ordered account list for a run.
pub trait AccountSource {
    fn load(&self) -> HarnessResult<Vec<Account>>;
}

/// Accounts read from a JSON or YAML file.
#[derive(Debug, Clone)]
pub struct AccountFile {
    path: PathBuf,
}

impl AccountFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountSource for AccountFile {
    fn load(&self) -> HarnessResult<Vec<Account>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            HarnessError::Data(format!(
                "cannot read account dataset '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let is_yaml = self
            .path
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);

        let accounts: Vec<Account> = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                HarnessError::Data(format!("malformed dataset '{}': {}", self.path.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                HarnessError::Data(format!("malformed dataset '{}': {}", self.path.display(), e))
            })?
        };

        let accounts = validate(accounts)?;
        info!("Loaded {} account(s) from {}", accounts.len(), self.path.display());
        Ok(accounts)
    }
}

/// Accounts supplied in code.
#[derive(Debug, Clone)]
pub struct StaticAccounts(pub Vec<Account>);

impl AccountSource for StaticAccounts {
    fn load(&self) -> HarnessResult<Vec<Account>> {
        validate(self.0.clone())
    }
}

/// Reject empty datasets, blank identifiers or credentials, and duplicates.
pub fn validate(accounts: Vec<Account>) -> HarnessResult<Vec<Account>> {
    if accounts.is_empty() {
        return Err(HarnessError::Data("account dataset is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for (position, account) in accounts.iter().enumerate() {
        if account.id.trim().is_empty() {
            return Err(HarnessError::Data(format!(
                "account #{} has an empty identifier",
                position + 1
            )));
        }
        if account.pass.is_empty() {
            return Err(HarnessError::Data(format!(
                "account '{}' has an empty credential",
                account.id
            )));
        }
        if !seen.insert(account.id.clone()) {
            return Err(HarnessError::Data(format!(
                "account identifier '{}' appears more than once",
                account.id
            )));
        }
        debug!(account = %account.id, role = ?account.role, "account accepted");
    }

    Ok(accounts)
}
