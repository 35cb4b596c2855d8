//! Mobile-app build and release orchestrator.
//!
//! Given a git reference and a target platform, launchpad reconciles a local
//! working copy, bootstraps multi-package workspaces, locates the Flutter app,
//! runs the platform build, recovers the artifact path from the tool output,
//! and hands the artifact to a store-upload lane.
//!
//! - **[`core`]**: Pure, deterministic logic (artifact cascades, retry
//!   accounting, entry-point patterns, error classification). No I/O.
//! - **[`io`]**: Side-effecting operations (processes, filesystem, git, build
//!   tools). Every external tool runs behind [`io::process::ProcessRunner`] so
//!   tests can substitute fakes.
//!
//! [`pipeline`] sequences the steps for the `build` and `deploy` commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
