//! Pipeline configuration stored in `launchpad.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::StepError;
use crate::core::retry::RetryBudget;
use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "launchpad.toml";

/// Pipeline configuration (TOML).
///
/// Missing fields fall back to defaults, so an empty or absent file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding working copies, one per repository name.
    pub workspace_dir: PathBuf,

    /// Captured stdout/stderr per tool invocation is truncated beyond this.
    pub output_limit_bytes: usize,

    /// Working directory for fastlane lanes. Defaults to the app root.
    pub fastlane_dir: Option<PathBuf>,

    /// Remove and reclone a non-repository directory even for commit or tag
    /// targets under the preserve strategy.
    pub reclone_untrusted: bool,

    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
    /// Per-attempt timeout for `melos bootstrap`.
    pub timeout_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 2,
            timeout_secs: 300,
        }
    }
}

impl BootstrapConfig {
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_attempts, Duration::from_secs(self.delay_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("repo"),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            fastlane_dir: None,
            reclone_untrusted: false,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), StepError> {
        if self.workspace_dir.as_os_str().is_empty() {
            return Err(StepError::Config("workspace_dir must not be empty".into()));
        }
        if self.output_limit_bytes == 0 {
            return Err(StepError::Config("output_limit_bytes must be > 0".into()));
        }
        if self.bootstrap.max_attempts == 0 {
            return Err(StepError::Config("bootstrap.max_attempts must be > 0".into()));
        }
        if self.bootstrap.timeout_secs == 0 {
            return Err(StepError::Config("bootstrap.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Working copy location for a repository name.
    pub fn working_copy(&self, repo_name: &str) -> PathBuf {
        self.workspace_dir.join(repo_name)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launchpad.toml");
        let cfg = PipelineConfig {
            reclone_untrusted: true,
            fastlane_dir: Some(PathBuf::from("fastlane")),
            ..PipelineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launchpad.toml");
        fs::write(&path, "[bootstrap]\nmax_attempts = 5\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.bootstrap.max_attempts, 5);
        assert_eq!(cfg.bootstrap.timeout_secs, 300);
        assert_eq!(cfg.workspace_dir, PathBuf::from("repo"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launchpad.toml");
        fs::write(&path, "[bootstrap]\nmax_attempts = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bootstrap.max_attempts"));
    }

    #[test]
    fn working_copy_is_nested_under_workspace() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.working_copy("shop"), PathBuf::from("repo/shop"));
    }
}
