//! Stable exit codes for launchpad CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed: invalid config, a failed step, or any other error.
pub const FAILED: i32 = 1;
/// `launchpad resolve` or `launchpad locate` found nothing.
pub const NOT_FOUND: i32 = 2;
