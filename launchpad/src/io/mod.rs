//! I/O adapters for the pipeline steps.

pub mod bootstrap;
pub mod config;
pub mod entry_point;
pub mod flutter;
pub mod fs;
pub mod git;
pub mod process;
pub mod reconcile;
pub mod store;
