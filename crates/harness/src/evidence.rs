//! Screenshot evidence
//!
//! Artifacts are written under
//! `{root}/{scenario-slug}/{account}/NN-{name-slug}.png` and recorded with a
//! SHA-256 digest. Capturing never changes the outcome of an instance:
//! failures to capture are logged and dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::browser::Scope;
use crate::error::{HarnessError, HarnessResult};
use crate::session::Session;
use crate::target::{locate, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Intended proof of the verified state
    Evidence,
    /// Debug capture taken when the instance failed
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub label: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// Lowercase ASCII slug used in directory and file names.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn path_safe(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Per-instance evidence stream.
pub struct EvidenceCollector {
    dir: PathBuf,
    scenario: String,
    account: String,
    sequence: u32,
    artifacts: Vec<Artifact>,
}

impl EvidenceCollector {
    pub fn new(root: &Path, scenario: &str, account: &str) -> Self {
        Self {
            dir: root.join(slug(scenario)).join(path_safe(account)),
            scenario: scenario.to_string(),
            account: account.to_string(),
            sequence: 0,
            artifacts: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn label(&self, name: &str) -> String {
        format!("{} [{}] {}", self.scenario, self.account, name)
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }

    /// Capture intended evidence: the whole viewport, or one element of the
    /// content frame when `element` is given.
    pub async fn capture(
        &mut self,
        session: &mut Session,
        name: &str,
        element: Option<&Target>,
    ) -> Option<Artifact> {
        let label = self.label(name);
        self.record(session, ArtifactKind::Evidence, name, label, element)
            .await
    }

    /// Capture debug evidence after a failure.
    pub async fn capture_failure(&mut self, session: &mut Session, name: &str) -> Option<Artifact> {
        let label = format!("FAILED {}", self.label(name));
        let name = format!("failed-{name}");
        self.record(session, ArtifactKind::Failure, &name, label, None)
            .await
    }

    async fn record(
        &mut self,
        session: &mut Session,
        kind: ArtifactKind,
        name: &str,
        label: String,
        element: Option<&Target>,
    ) -> Option<Artifact> {
        match self.try_capture(session, kind, name, label.clone(), element).await {
            Ok(artifact) => {
                info!(label = %artifact.label, path = %artifact.path.display(), "Evidence captured");
                self.artifacts.push(artifact.clone());
                Some(artifact)
            }
            Err(e) => {
                warn!(label = %label, "Evidence capture failed: {e}");
                None
            }
        }
    }

    async fn try_capture(
        &mut self,
        session: &mut Session,
        kind: ArtifactKind,
        name: &str,
        label: String,
        element: Option<&Target>,
    ) -> HarnessResult<Artifact> {
        let png = match element {
            None => session.page().screenshot(&Scope::Page, None).await?,
            Some(target) => {
                let frame = session.frame().cloned().ok_or_else(|| HarnessError::FrameUnavailable {
                    frame: session.settings().host.content_frame.clone(),
                    reason: "no resolved content frame to capture from".to_string(),
                })?;
                let scope = Scope::Frame(frame);
                let found = locate(session.page(), &scope, target).await?;
                let index = found
                    .iter()
                    .find(|(_, e)| e.visible)
                    .map(|(index, _)| *index)
                    .ok_or_else(|| HarnessError::Verification {
                        assertion: format!("capture {target}"),
                        expected: "visible".to_string(),
                        observed: format!("{} match(es), none displayed", found.len()),
                    })?;
                session
                    .page()
                    .screenshot(&scope, Some((&target.locator, index)))
                    .await?
            }
        };
        self.store(kind, name, label, png).await
    }

    async fn store(
        &mut self,
        kind: ArtifactKind,
        name: &str,
        label: String,
        png: Vec<u8>,
    ) -> HarnessResult<Artifact> {
        self.sequence += 1;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{:02}-{}.png", self.sequence, slug(name)));
        tokio::fs::write(&path, &png).await?;

        Ok(Artifact {
            label,
            kind,
            path,
            sha256: hex::encode(Sha256::digest(&png)),
            bytes: png.len() as u64,
            captured_at: Utc::now(),
        })
    }
}
