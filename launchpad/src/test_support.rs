//! Test-only process fakes and fixtures.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::core::retry::Sleeper;
use crate::io::process::{ProcessOutput, ProcessRequest, ProcessRunner};

/// Successful output with the given stdout.
pub fn ok_output(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        timed_out: false,
    }
}

/// Failed output with the given exit code and stderr.
pub fn failed_output(code: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
        timed_out: false,
    }
}

pub fn timed_out_output() -> ProcessOutput {
    ProcessOutput {
        code: None,
        timed_out: true,
        ..ProcessOutput::default()
    }
}

/// Spawn error equivalent to a program missing from `PATH`.
pub fn not_found_error(program: &str) -> anyhow::Error {
    anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::NotFound))
        .context(format!("spawn {program}"))
}

/// In-memory git that simulates clone and checkout and records every call.
///
/// `clone` creates `<dest>/.git` on disk so filesystem markers behave like a
/// real clone.
pub struct FakeGit {
    default_branch: String,
    current: RefCell<String>,
    failing: BTreeSet<String>,
    seeded: Vec<(PathBuf, String)>,
    requests: RefCell<Vec<ProcessRequest>>,
}

impl FakeGit {
    /// `default_branch` is what a fresh clone starts on.
    pub fn new(default_branch: &str) -> Self {
        Self {
            default_branch: default_branch.to_string(),
            current: RefCell::new(default_branch.to_string()),
            failing: BTreeSet::new(),
            seeded: Vec::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Write `contents` at `relative` inside every clone.
    pub fn seed(mut self, relative: &str, contents: &str) -> Self {
        self.seeded.push((PathBuf::from(relative), contents.to_string()));
        self
    }

    /// Make every invocation of `subcommand` exit non-zero.
    pub fn failing(mut self, subcommand: &str) -> Self {
        self.failing.insert(subcommand.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.borrow().clone()
    }

    /// First argument of every call, in order (`clone`, `checkout`, ...).
    pub fn subcommands(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|req| req.args.first().cloned())
            .collect()
    }

    /// True if a call with exactly these space-joined args was made.
    pub fn invoked(&self, args: &str) -> bool {
        self.requests
            .borrow()
            .iter()
            .any(|req| req.args.join(" ") == args)
    }

    pub fn clear(&self) {
        self.requests.borrow_mut().clear();
    }

    fn simulate_clone(&self, request: &ProcessRequest) -> Result<()> {
        let dest = request
            .args
            .get(2)
            .ok_or_else(|| anyhow!("clone without destination"))?;
        let dest = request.workdir.join(dest);
        fs::create_dir_all(dest.join(".git"))
            .with_context(|| format!("create {}", dest.display()))?;
        for (relative, contents) in &self.seeded {
            let file = dest.join(relative);
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&file, contents).with_context(|| format!("write {}", file.display()))?;
        }
        *self.current.borrow_mut() = self.default_branch.clone();
        Ok(())
    }
}

impl ProcessRunner for FakeGit {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        if request.program != "git" {
            return Err(not_found_error(&request.program));
        }
        self.requests.borrow_mut().push(request.clone());
        let subcommand = request.args.first().map(String::as_str).unwrap_or("");
        if self.failing.contains(subcommand) {
            return Ok(failed_output(
                1,
                &format!("fatal: simulated {subcommand} failure"),
            ));
        }
        match subcommand {
            "clone" => {
                self.simulate_clone(request)?;
                Ok(ok_output(""))
            }
            "checkout" => {
                let git_ref = request.args.get(1).cloned().unwrap_or_default();
                *self.current.borrow_mut() = git_ref;
                Ok(ok_output(""))
            }
            "branch" => Ok(ok_output(&format!("{}\n", self.current.borrow()))),
            "remote" => Ok(ok_output("https://example.com/acme/shop.git\n")),
            _ => Ok(ok_output("")),
        }
    }
}

/// Runner that replays queued replies in order and records every request.
pub struct ScriptedRunner {
    replies: RefCell<VecDeque<Result<ProcessOutput>>>,
    requests: RefCell<Vec<ProcessRequest>>,
}

impl ScriptedRunner {
    pub fn new(replies: Vec<Result<ProcessOutput>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.borrow().clone()
    }

    /// Rendered command lines, in call order.
    pub fn command_lines(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply for {request}")))
    }
}

/// Sends `git` to a [`FakeGit`] and every other program to a
/// [`ScriptedRunner`].
pub struct RoutedRunner {
    pub git: FakeGit,
    pub tools: ScriptedRunner,
}

impl RoutedRunner {
    pub fn new(git: FakeGit, tools: ScriptedRunner) -> Self {
        Self { git, tools }
    }
}

impl ProcessRunner for RoutedRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        if request.program == "git" {
            self.git.run(request)
        } else {
            self.tools.run(request)
        }
    }
}

/// Sleeper that records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

/// A real git repository used as a clone source.
///
/// Layout: `main` with one commit, tag `v1.0.0` on it, and a `release/1.2`
/// branch with one extra commit.
pub struct TestOrigin {
    temp: tempfile::TempDir,
    path: PathBuf,
}

impl TestOrigin {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let path = temp.path().join("origin");
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;

        git(&path, &["init", "--quiet"])?;
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        fs::write(path.join("pubspec.yaml"), "name: shop\n").context("write pubspec")?;
        git(&path, &["add", "."])?;
        git(&path, &["commit", "--quiet", "-m", "initial"])?;
        git(&path, &["tag", "v1.0.0"])?;

        git(&path, &["checkout", "--quiet", "-b", "release/1.2"])?;
        fs::write(path.join("RELEASE.md"), "1.2\n").context("write release notes")?;
        git(&path, &["add", "."])?;
        git(&path, &["commit", "--quiet", "-m", "release 1.2"])?;
        git(&path, &["checkout", "--quiet", "main"])?;

        Ok(Self { temp, path })
    }

    /// Path usable as a clone URL.
    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch directory next to the origin for working copies.
    pub fn scratch(&self) -> &Path {
        self.temp.path()
    }

    /// Add a commit to `branch` in the origin and return its hash.
    pub fn commit_on(&self, branch: &str, file: &str, contents: &str) -> Result<String> {
        git(&self.path, &["checkout", "--quiet", branch])?;
        fs::write(self.path.join(file), contents).with_context(|| format!("write {file}"))?;
        git(&self.path, &["add", "."])?;
        git(&self.path, &["commit", "--quiet", "-m", &format!("update {file}")])?;
        let head = git(&self.path, &["rev-parse", "HEAD"])?;
        git(&self.path, &["checkout", "--quiet", "main"])?;
        Ok(head.trim().to_string())
    }
}

/// Run a real git command with a fixed identity and return stdout.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Launchpad Test",
            "-c",
            "user.email=launchpad-test@local.invalid",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {args:?}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {:?} failed: {}", args, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
