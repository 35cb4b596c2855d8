//! Shared deterministic types for the reconciliation and build pipeline.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Desired checkout state for a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    Branch(String),
    Commit(String),
    Tag(String),
}

impl CheckoutTarget {
    /// Identifier as supplied by the user (branch name, hash, or tag name).
    pub fn name(&self) -> &str {
        match self {
            Self::Branch(name) | Self::Commit(name) | Self::Tag(name) => name,
        }
    }

    /// Reference passed to `git checkout`. Tags live under the `tags/` namespace.
    pub fn git_ref(&self) -> String {
        match self {
            Self::Tag(name) => format!("tags/{name}"),
            Self::Branch(name) | Self::Commit(name) => name.clone(),
        }
    }

    /// Commits and tags never move, so "already on target" never applies to them.
    pub fn is_immutable(&self) -> bool {
        !matches!(self, Self::Branch(_))
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Branch(_) => "branch",
            Self::Commit(_) => "commit",
            Self::Tag(_) => "tag",
        }
    }
}

impl fmt::Display for CheckoutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_label(), self.name())
    }
}

/// How the reconciler treats an existing working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Remove, reclone, checkout. Never reuses local state.
    Fresh,
    /// Reuse a trustworthy working copy, reclone only when it is not one.
    Preserve,
}

/// Result of one `reconcile` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub success: bool,
    /// Local path of the working copy.
    pub path: PathBuf,
    /// Failure reason, or a note about a tolerated partial failure.
    pub diagnostic: Option<String>,
}

impl ReconcileOutcome {
    pub fn succeeded(path: PathBuf, note: Option<String>) -> Self {
        Self {
            success: true,
            path,
            diagnostic: note,
        }
    }

    pub fn failed(path: PathBuf, reason: String) -> Self {
        Self {
            success: false,
            path,
            diagnostic: Some(reason),
        }
    }
}

/// Target mobile platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Android => f.write_str("android"),
            Self::Ios => f.write_str("ios"),
        }
    }
}

/// Fastlane lane used for store upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Lane {
    DevRelease,
    AutoRelease,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DevRelease => "dev_release",
            Self::AutoRelease => "auto_release",
        }
    }
}
