//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of process and filesystem side effects. They
//! operate on in-memory values (tool output, file contents) and return
//! deterministic results suitable for tests.

pub mod artifact;
pub mod entry;
pub mod error;
pub mod remote;
pub mod retry;
pub mod types;
