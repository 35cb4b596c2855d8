//! Working-copy reconciliation.
//!
//! [`Reconciler`] brings a local working copy to a [`CheckoutTarget`] using
//! one of two strategies:
//!
//! - **Fresh**: remove the path, clone, checkout. Every run starts from
//!   nothing, so repeated runs converge regardless of local damage.
//! - **Preserve**: reuse a working copy that carries a `.git` marker after
//!   discarding local modifications, and take the shortest path to the target.
//!
//! Every step short-circuits on failure except the final `pull` of a branch
//! that was already checked out, which is reported as a diagnostic on an
//! otherwise successful outcome.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::error::StepError;
use crate::core::types::{CheckoutTarget, ReconcileOutcome, Strategy};
use crate::io::fs::Filesystem;
use crate::io::git::Git;
use crate::io::process::ProcessRunner;

/// A remote bound to a local working-copy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub remote: String,
    pub local_path: PathBuf,
}

impl RepoHandle {
    pub fn new(remote: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote: remote.into(),
            local_path: local_path.into(),
        }
    }

    /// True when the path carries a `.git` marker. The remote is not checked.
    pub fn is_repository<F: Filesystem>(&self, fs: &F) -> bool {
        fs.exists(&self.local_path.join(".git"))
    }
}

/// Snapshot of a working copy, as reported by `launchpad status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub exists: bool,
    pub is_repo: bool,
    /// `None` when not a repository or when git could not report it.
    pub current_branch: Option<String>,
    pub remote_url: Option<String>,
}

pub struct Reconciler<'a, R: ProcessRunner, F: Filesystem> {
    handle: RepoHandle,
    runner: &'a R,
    fs: &'a F,
    reclone_untrusted: bool,
}

impl<'a, R: ProcessRunner, F: Filesystem> Reconciler<'a, R, F> {
    pub fn new(handle: RepoHandle, runner: &'a R, fs: &'a F) -> Self {
        Self {
            handle,
            runner,
            fs,
            reclone_untrusted: false,
        }
    }

    /// Remove and reclone a non-repository directory for commit and tag
    /// targets instead of failing.
    pub fn reclone_untrusted(mut self, enabled: bool) -> Self {
        self.reclone_untrusted = enabled;
        self
    }

    pub fn handle(&self) -> &RepoHandle {
        &self.handle
    }

    #[instrument(
        skip_all,
        fields(
            checkout = %target,
            strategy = ?strategy,
            path = %self.handle.local_path.display()
        )
    )]
    pub fn reconcile(&self, target: &CheckoutTarget, strategy: Strategy) -> ReconcileOutcome {
        let path = self.handle.local_path.clone();
        let result = match strategy {
            Strategy::Fresh => self.fresh(target).map(|()| None),
            Strategy::Preserve => self.preserve(target),
        };
        match result {
            Ok(note) => {
                info!("working copy ready");
                ReconcileOutcome::succeeded(path, note)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "reconciliation failed");
                ReconcileOutcome::failed(path, format!("{err:#}"))
            }
        }
    }

    pub fn status(&self) -> RepoStatus {
        let path = &self.handle.local_path;
        if !self.fs.exists(path) {
            return RepoStatus::default();
        }
        if !self.handle.is_repository(self.fs) {
            return RepoStatus {
                exists: true,
                ..RepoStatus::default()
            };
        }
        let git = Git::new(self.runner, path);
        RepoStatus {
            exists: true,
            is_repo: true,
            current_branch: git.current_branch().ok().filter(|b| !b.is_empty()),
            remote_url: git.remote_url().ok(),
        }
    }

    fn fresh(&self, target: &CheckoutTarget) -> Result<()> {
        let path = &self.handle.local_path;
        if self.fs.exists(path) {
            info!("removing existing working copy");
        }
        self.fs.remove_tree(path)?;
        let git = self.clone_repo()?;
        git.checkout(&target.git_ref())
    }

    /// Returns a note when the final pull failed but the checkout stands.
    fn preserve(&self, target: &CheckoutTarget) -> Result<Option<String>> {
        let path = &self.handle.local_path;
        let (git, reused) = if !self.fs.exists(path) {
            (self.clone_repo()?, false)
        } else if !self.handle.is_repository(self.fs) {
            if target.is_immutable() && !self.reclone_untrusted {
                return Err(StepError::State(format!(
                    "{} exists but is not a git repository; refusing to check out {target}",
                    path.display()
                ))
                .into());
            }
            info!("existing directory is not a repository, recloning");
            self.fs.remove_tree(path)?;
            (self.clone_repo()?, false)
        } else {
            let git = Git::new(self.runner, path);
            git.reset_hard("HEAD")?;
            git.clean_untracked()?;
            (git, true)
        };

        match target {
            CheckoutTarget::Branch(name) => {
                if reused {
                    git.fetch()?;
                }
                let on_target = git
                    .current_branch()
                    .map(|current| current == *name)
                    .unwrap_or(false);
                if !on_target {
                    git.checkout(name)?;
                    return Ok(None);
                }
                match git.pull() {
                    Ok(()) => Ok(None),
                    Err(err) => {
                        warn!(err = %format!("{err:#}"), "pull failed, keeping current checkout");
                        Ok(Some(format!("pull failed: {err:#}")))
                    }
                }
            }
            CheckoutTarget::Commit(_) | CheckoutTarget::Tag(_) => {
                git.checkout(&target.git_ref())?;
                Ok(None)
            }
        }
    }

    fn clone_repo(&self) -> Result<Git<'a, R>> {
        let path = &self.handle.local_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent)?;
        }
        info!(remote = %self.handle.remote, "cloning");
        Git::clone_into(self.runner, &self.handle.remote, path)
            .with_context(|| format!("clone into {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::io::fs::StdFilesystem;
    use crate::test_support::FakeGit;

    const REMOTE: &str = "https://example.com/acme/shop.git";

    fn branch(name: &str) -> CheckoutTarget {
        CheckoutTarget::Branch(name.to_string())
    }

    fn handle(temp: &tempfile::TempDir) -> RepoHandle {
        RepoHandle::new(REMOTE, temp.path().join("repo").join("shop"))
    }

    #[test]
    fn preserve_on_absent_path_clones_then_checks_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = FakeGit::new("main");
        let handle = handle(&temp);
        let reconciler = Reconciler::new(handle.clone(), &git, &StdFilesystem);

        let outcome = reconciler.reconcile(&branch("release/1.2"), Strategy::Preserve);

        assert!(outcome.success, "{:?}", outcome.diagnostic);
        assert_eq!(outcome.path, handle.local_path);
        assert_eq!(outcome.diagnostic, None);
        assert_eq!(git.subcommands(), vec!["clone", "branch", "checkout"]);
        assert!(git.invoked("checkout release/1.2"));
        assert!(!git.subcommands().contains(&"pull".to_string()));
    }

    #[test]
    fn preserve_on_current_branch_fetches_and_pulls_without_checkout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(outcome.success);
        assert_eq!(
            git.subcommands(),
            vec!["reset", "clean", "fetch", "branch", "pull"]
        );
    }

    #[test]
    fn preserve_switches_branch_on_reused_copy() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("develop"), Strategy::Preserve);

        assert!(outcome.success);
        assert_eq!(
            git.subcommands(),
            vec!["reset", "clean", "fetch", "branch", "checkout"]
        );
    }

    #[test]
    fn branch_comparison_is_exact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("Main");

        Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(git.invoked("checkout main"));
    }

    #[test]
    fn pull_failure_is_reported_but_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main").failing("pull");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(outcome.success);
        let note = outcome.diagnostic.expect("diagnostic");
        assert!(note.contains("pull failed"), "{note}");
    }

    #[test]
    fn reset_failure_aborts_without_fallback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main").failing("reset");

        let outcome = Reconciler::new(handle.clone(), &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(!outcome.success);
        assert_eq!(git.subcommands(), vec!["reset"]);
        assert!(handle.local_path.join(".git").exists());
    }

    #[test]
    fn clean_failure_aborts_before_fetch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main").failing("clean");

        let outcome = Reconciler::new(handle.clone(), &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(!outcome.success);
        assert_eq!(git.subcommands(), vec!["reset", "clean"]);
        let error = outcome.diagnostic.expect("diagnostic");
        assert!(error.contains("git clean -fd failed"), "{error}");
        assert!(handle.local_path.join(".git").exists());
    }

    #[test]
    fn fetch_failure_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main").failing("fetch");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(!outcome.success);
        assert!(!git.subcommands().contains(&"pull".to_string()));
    }

    #[test]
    fn commit_on_untrusted_directory_fails_fast_by_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(&handle.local_path).expect("mkdir");
        fs::write(handle.local_path.join("stale.txt"), "x").expect("write");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle.clone(), &git, &StdFilesystem)
            .reconcile(&CheckoutTarget::Commit("4f2a9c1".into()), Strategy::Preserve);

        assert!(!outcome.success);
        assert!(git.requests().is_empty());
        assert!(handle.local_path.join("stale.txt").exists());
        let reason = outcome.diagnostic.expect("reason");
        assert!(reason.contains("not a git repository"), "{reason}");
    }

    #[test]
    fn commit_on_untrusted_directory_reclones_when_enabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(&handle.local_path).expect("mkdir");
        fs::write(handle.local_path.join("stale.txt"), "x").expect("write");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle.clone(), &git, &StdFilesystem)
            .reclone_untrusted(true)
            .reconcile(&CheckoutTarget::Commit("4f2a9c1".into()), Strategy::Preserve);

        assert!(outcome.success, "{:?}", outcome.diagnostic);
        assert_eq!(git.subcommands(), vec!["clone", "checkout"]);
        assert!(git.invoked("checkout 4f2a9c1"));
        assert!(!handle.local_path.join("stale.txt").exists());
    }

    #[test]
    fn branch_on_untrusted_directory_reclones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(&handle.local_path).expect("mkdir");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Preserve);

        assert!(outcome.success);
        assert_eq!(git.subcommands(), vec!["clone", "branch", "pull"]);
    }

    #[test]
    fn tag_checkout_uses_tags_namespace_and_skips_pull() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let git = FakeGit::new("main");

        let outcome = Reconciler::new(handle, &git, &StdFilesystem)
            .reconcile(&CheckoutTarget::Tag("v1.0.0".into()), Strategy::Preserve);

        assert!(outcome.success);
        assert_eq!(git.subcommands(), vec!["reset", "clean", "checkout"]);
        assert!(git.invoked("checkout tags/v1.0.0"));
    }

    #[test]
    fn fresh_is_idempotent_after_corruption() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        let git = FakeGit::new("main");
        let reconciler = Reconciler::new(handle.clone(), &git, &StdFilesystem);
        let target = CheckoutTarget::Tag("v1.0.0".into());

        let first = reconciler.reconcile(&target, Strategy::Fresh);
        fs::remove_dir_all(handle.local_path.join(".git")).expect("corrupt");
        fs::write(handle.local_path.join("junk"), "x").expect("junk");
        git.clear();
        let second = reconciler.reconcile(&target, Strategy::Fresh);

        assert_eq!(first, second);
        assert_eq!(git.subcommands(), vec!["clone", "checkout"]);
        assert!(!handle.local_path.join("junk").exists());
    }

    #[test]
    fn fresh_aborts_on_clone_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = FakeGit::new("main").failing("clone");

        let outcome = Reconciler::new(handle(&temp), &git, &StdFilesystem)
            .reconcile(&branch("main"), Strategy::Fresh);

        assert!(!outcome.success);
        assert_eq!(git.subcommands(), vec!["clone"]);
    }

    #[test]
    fn status_reports_branch_and_remote() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = handle(&temp);
        let git = FakeGit::new("develop");
        let reconciler = Reconciler::new(handle.clone(), &git, &StdFilesystem);

        assert_eq!(reconciler.status(), RepoStatus::default());

        fs::create_dir_all(handle.local_path.join(".git")).expect("mkdir");
        let status = reconciler.status();
        assert!(status.exists && status.is_repo);
        assert_eq!(status.current_branch.as_deref(), Some("develop"));
        assert_eq!(status.remote_url.as_deref(), Some(REMOTE));
    }

    /// Reports a fixed set of paths as present without touching disk.
    struct ListedFs(Vec<PathBuf>);

    impl Filesystem for ListedFs {
        fn exists(&self, path: &std::path::Path) -> bool {
            self.0.iter().any(|listed| listed == path)
        }

        fn create_dir_all(&self, _path: &std::path::Path) -> Result<()> {
            Ok(())
        }

        fn remove_tree(&self, _path: &std::path::Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn repository_marker_is_checked_through_filesystem() {
        let handle = RepoHandle::new(REMOTE, "/work/repo/shop");
        let listed = ListedFs(vec![
            PathBuf::from("/work/repo/shop"),
            PathBuf::from("/work/repo/shop/.git"),
        ]);
        let git = FakeGit::new("main");

        assert!(handle.is_repository(&listed));
        assert!(!handle.is_repository(&StdFilesystem));

        let status = Reconciler::new(handle, &git, &listed).status();
        assert!(status.is_repo);
        assert_eq!(status.current_branch.as_deref(), Some("main"));
    }
}
