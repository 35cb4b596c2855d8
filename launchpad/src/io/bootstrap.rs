//! Multi-package bootstrap (`melos bootstrap`) under bounded retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::error::StepError;
use crate::core::retry::{RetryBudget, RetryExecutor, RetryReport, Retryable, Sleeper};
use crate::io::process::{ProcessRequest, ProcessRunner, is_not_found, run_tool};

const MELOS_CONFIGS: [&str; 2] = ["melos.yaml", "melos.yml"];
const INSTALL_HINT: &str = "install it with `dart pub global activate melos`";
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// True if `root` is a melos workspace.
pub fn has_melos_config(root: &Path) -> bool {
    MELOS_CONFIGS.iter().any(|name| root.join(name).is_file())
}

/// `melos bootstrap` in one workspace root.
pub struct MelosBootstrap<'a, R: ProcessRunner> {
    runner: &'a R,
    root: PathBuf,
    timeout: Duration,
}

impl<'a, R: ProcessRunner> MelosBootstrap<'a, R> {
    pub fn new(runner: &'a R, root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            root: root.into(),
            timeout,
        }
    }

    fn request(&self, arg: &str) -> ProcessRequest {
        ProcessRequest::new("melos", &self.root).arg(arg)
    }
}

impl<R: ProcessRunner> Retryable for MelosBootstrap<'_, R> {
    fn label(&self) -> String {
        "melos bootstrap".to_string()
    }

    /// Only a missing or hanging `melos` stops the run here. A failing
    /// `--version` is left for the bootstrap attempts to surface.
    fn preflight(&mut self) -> Result<(), StepError> {
        let request = self.request("--version").timeout(PREFLIGHT_TIMEOUT);
        match self.runner.run(&request) {
            Ok(output) if output.timed_out => Err(StepError::Timeout {
                command: request.to_string(),
                secs: PREFLIGHT_TIMEOUT.as_secs(),
            }),
            Ok(output) if output.success() => {
                debug!(version = %output.stdout.trim(), "melos available");
                Ok(())
            }
            Ok(output) => {
                warn!(code = ?output.code, "melos --version failed, attempting bootstrap anyway");
                Ok(())
            }
            Err(err) if is_not_found(&err) => Err(StepError::Environment {
                tool: "melos".to_string(),
                hint: INSTALL_HINT.to_string(),
            }),
            Err(err) => Err(StepError::Unexpected(format!("{err:#}"))),
        }
    }

    fn attempt(&mut self, attempt: u32) -> Result<String, StepError> {
        info!(attempt, "running melos bootstrap");
        let request = self.request("bootstrap").timeout(self.timeout);
        run_tool(self.runner, &request)?;
        Ok("melos bootstrap completed".to_string())
    }
}

/// Run `melos bootstrap` in `root` within `budget`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_bootstrap<R: ProcessRunner, S: Sleeper>(
    runner: &R,
    sleeper: &S,
    root: &Path,
    budget: RetryBudget,
    timeout: Duration,
) -> RetryReport {
    let mut operation = MelosBootstrap::new(runner, root, timeout);
    RetryExecutor::new(budget, sleeper).run_with_retry(&mut operation)
}
