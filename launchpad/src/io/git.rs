//! Git adapter for working-copy reconciliation.
//!
//! Each operation runs one `git` subprocess in an explicit working directory
//! and either succeeds or returns an error carrying git's stderr as the
//! diagnostic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::{ProcessOutput, ProcessRequest, ProcessRunner};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug)]
pub struct Git<'a, R: ProcessRunner> {
    runner: &'a R,
    workdir: PathBuf,
}

impl<'a, R: ProcessRunner> Git<'a, R> {
    pub fn new(runner: &'a R, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone `remote` into `dest`, running git from `dest`'s parent directory.
    ///
    /// The clone target is passed relative to that parent so a relative
    /// `dest` is not resolved twice.
    #[instrument(skip_all, fields(remote = %remote, dest = %dest.display()))]
    pub fn clone_into(runner: &'a R, remote: &str, dest: &Path) -> Result<Self> {
        let (parent, name) = match (dest.parent(), dest.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                (parent.to_path_buf(), name.to_string_lossy())
            }
            _ => (PathBuf::from("."), dest.as_os_str().to_string_lossy()),
        };
        let clone = Self::new(runner, parent);
        clone.run_checked(&["clone", remote, &name])?;
        debug!("clone completed");
        Ok(Self::new(runner, dest))
    }

    pub fn fetch(&self) -> Result<()> {
        self.run_checked(&["fetch"])?;
        Ok(())
    }

    pub fn pull(&self) -> Result<()> {
        self.run_checked(&["pull"])?;
        Ok(())
    }

    /// Checkout a branch name, commit hash, or `tags/<name>` reference.
    #[instrument(skip_all, fields(git_ref = %git_ref))]
    pub fn checkout(&self, git_ref: &str) -> Result<()> {
        debug!("checking out");
        self.run_checked(&["checkout", git_ref])?;
        Ok(())
    }

    /// Discard tracked modifications.
    pub fn reset_hard(&self, target: &str) -> Result<()> {
        self.run_checked(&["reset", "--hard", target])?;
        Ok(())
    }

    /// Remove untracked files and directories.
    pub fn clean_untracked(&self) -> Result<()> {
        let output = self.run_checked(&["clean", "-fd"])?;
        let removed = output.stdout.lines().count();
        if removed > 0 {
            debug!(removed, "removed untracked entries");
        }
        Ok(())
    }

    /// Name of the checked-out branch; empty on detached HEAD.
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_checked(&["branch", "--show-current"])?;
        Ok(out.stdout.trim().to_string())
    }

    pub fn remote_url(&self) -> Result<String> {
        let out = self.run_checked(&["remote", "get-url", "origin"])?;
        Ok(out.stdout.trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput> {
        let request = ProcessRequest::new("git", &self.workdir).args(args.iter().copied());
        let output = self
            .runner
            .run(&request)
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGit, ScriptedRunner, ok_output};

    #[test]
    fn clone_runs_from_parent_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dest = temp.path().join("repo").join("shop");
        std::fs::create_dir_all(dest.parent().expect("parent")).expect("mkdir");
        let git = FakeGit::new("main");

        let cloned = Git::clone_into(&git, "https://example.com/shop.git", &dest).expect("clone");

        assert_eq!(cloned.workdir(), dest.as_path());
        let requests = git.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].workdir, temp.path().join("repo"));
        assert_eq!(requests[0].args[2], "shop");
        assert!(dest.join(".git").exists());
    }

    #[test]
    fn relative_clone_target_is_not_nested() {
        let runner = ScriptedRunner::new(vec![Ok(ok_output(""))]);

        let cloned =
            Git::clone_into(&runner, "https://example.com/shop.git", Path::new("repo/shop"))
                .expect("clone");

        assert_eq!(cloned.workdir(), Path::new("repo/shop"));
        let request = &runner.requests()[0];
        assert_eq!(request.workdir, PathBuf::from("repo"));
        assert_eq!(request.args, vec!["clone", "https://example.com/shop.git", "shop"]);
    }

    #[test]
    fn bare_clone_target_runs_from_current_directory() {
        let runner = ScriptedRunner::new(vec![Ok(ok_output(""))]);

        Git::clone_into(&runner, "https://example.com/shop.git", Path::new("shop"))
            .expect("clone");

        let request = &runner.requests()[0];
        assert_eq!(request.workdir, PathBuf::from("."));
        assert_eq!(request.args[2], "shop");
    }

    #[test]
    fn failing_command_reports_stderr() {
        let git = FakeGit::new("main").failing("checkout");
        let err = Git::new(&git, "/tmp").checkout("nope").unwrap_err();
        assert!(err.to_string().contains("git checkout nope failed"));
    }

    #[test]
    fn current_branch_is_trimmed() {
        let git = FakeGit::new("release/1.2");
        let branch = Git::new(&git, "/tmp").current_branch().expect("branch");
        assert_eq!(branch, "release/1.2");
    }
}
