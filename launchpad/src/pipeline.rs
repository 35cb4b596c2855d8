//! Orchestration for `launchpad build` and `launchpad deploy`.
//!
//! Steps run in strict sequence: reconcile the working copy, bootstrap the
//! workspace when it is a melos workspace, locate the app, build, and for
//! deploys upload. The first failing step aborts the run.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use crate::core::error::StepError;
use crate::core::remote::repo_name;
use crate::core::retry::Sleeper;
use crate::core::types::{CheckoutTarget, Lane, Platform, ReconcileOutcome, Strategy};
use crate::io::bootstrap::{has_melos_config, run_bootstrap};
use crate::io::config::PipelineConfig;
use crate::io::entry_point::{EntryPointLocator, best};
use crate::io::flutter::{self, BuildRequest};
use crate::io::fs::Filesystem;
use crate::io::process::ProcessRunner;
use crate::io::reconcile::{Reconciler, RepoHandle, RepoStatus};
use crate::io::store::{self, AppStoreOptions, PlayStoreOptions, ReleaseNotes, Store, UploadRequest};

/// Capabilities and configuration shared by every pipeline step.
pub struct Pipeline<'a, R: ProcessRunner, F: Filesystem, S: Sleeper> {
    pub runner: &'a R,
    pub fs: &'a F,
    pub sleeper: &'a S,
    pub config: &'a PipelineConfig,
}

/// Which source to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub remote: String,
    pub target: CheckoutTarget,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub source: SourceSpec,
    pub platform: Platform,
    pub flavor: Option<String>,
    pub provisioning_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub working_copy: PathBuf,
    pub app_root: PathBuf,
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    pub build: BuildSpec,
    /// Prebuilt artifact. When absent or missing on disk, the app is built first.
    pub artifact: Option<PathBuf>,
    pub lane: Lane,
    pub release_notes: ReleaseNotes,
    pub app_store: AppStoreOptions,
    pub play_store: PlayStoreOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub artifact: PathBuf,
    pub store: Store,
    /// False when a supplied artifact was uploaded as is.
    pub built: bool,
}

impl<R: ProcessRunner, F: Filesystem, S: Sleeper> Pipeline<'_, R, F, S> {
    fn reconciler(&self, remote: &str) -> Result<Reconciler<'_, R, F>> {
        let name = repo_name(remote).ok_or_else(|| {
            StepError::Config(format!("cannot derive repository name from {remote}"))
        })?;
        let handle = RepoHandle::new(remote, self.config.working_copy(&name));
        Ok(Reconciler::new(handle, self.runner, self.fs)
            .reclone_untrusted(self.config.reclone_untrusted))
    }

    /// Reconcile the working copy. A failed reconciliation is an error.
    pub fn checkout(&self, source: &SourceSpec) -> Result<ReconcileOutcome> {
        let outcome = self
            .reconciler(&source.remote)?
            .reconcile(&source.target, source.strategy);
        if !outcome.success {
            let reason = outcome.diagnostic.unwrap_or_default();
            return Err(anyhow!("checkout of {} failed: {reason}", source.target));
        }
        if let Some(note) = &outcome.diagnostic {
            warn!(%note, "checkout completed with warnings");
        }
        Ok(outcome)
    }

    pub fn status(&self, remote: &str) -> Result<(PathBuf, RepoStatus)> {
        let reconciler = self.reconciler(remote)?;
        Ok((reconciler.handle().local_path.clone(), reconciler.status()))
    }

    pub fn build(&self, spec: &BuildSpec) -> Result<BuildReport> {
        let outcome = self.checkout(&spec.source)?;
        let working_copy = outcome.path;
        info!(path = %working_copy.display(), "working copy reconciled");

        if has_melos_config(&working_copy) {
            let report = run_bootstrap(
                self.runner,
                self.sleeper,
                &working_copy,
                self.config.bootstrap.budget(),
                self.config.bootstrap.timeout(),
            );
            if !report.success {
                bail!("bootstrap failed: {}", report.message);
            }
            info!(attempts = report.attempts, "{}", report.message);
        }

        let candidates = EntryPointLocator.locate(&working_copy);
        let entry = best(&candidates).ok_or_else(|| {
            anyhow!(
                "no Flutter entry point with a runApp call under {}",
                working_copy.display()
            )
        })?;
        info!(file = %entry.file.display(), "entry point located");
        let app_root = entry.project_root.clone();

        let request = BuildRequest {
            platform: spec.platform,
            app_root: app_root.clone(),
            flavor: spec.flavor.clone(),
            provisioning_profile: spec.provisioning_profile.clone(),
            fastlane_dir: self.config.fastlane_dir.clone(),
        };
        let artifact = flutter::build(self.runner, &request)
            .with_context(|| format!("{} build failed", spec.platform))?;
        info!(artifact = %artifact.display(), "build finished");

        Ok(BuildReport {
            working_copy,
            app_root,
            artifact,
        })
    }

    pub fn deploy(&self, spec: &DeploySpec) -> Result<DeployReport> {
        let (artifact, app_root, built) = match &spec.artifact {
            Some(path) if self.fs.exists(path) => (path.clone(), None, false),
            supplied => {
                if let Some(path) = supplied {
                    warn!(path = %path.display(), "artifact not found, building from source");
                }
                let report = self.build(&spec.build)?;
                (report.artifact, Some(report.app_root), true)
            }
        };

        let workdir = self
            .config
            .fastlane_dir
            .clone()
            .or(app_root)
            .unwrap_or_else(|| PathBuf::from("."));
        let request = UploadRequest {
            lane: spec.lane,
            artifact: artifact.clone(),
            release_notes: spec.release_notes.clone(),
            workdir,
            app_store: spec.app_store.clone(),
            play_store: spec.play_store.clone(),
        };
        let store = store::upload(self.runner, &request)
            .with_context(|| format!("deploy of {} failed", artifact.display()))?;

        Ok(DeployReport {
            artifact,
            store,
            built,
        })
    }
}
