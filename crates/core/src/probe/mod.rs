//! Local probe programs (shell scripts and binaries) used by script checks.
//!
//! The runners spawn a child process, pipe a JSON document to its stdin and
//! capture stdout/stderr under a hard timeout. No database access.

pub mod binary;
pub mod process;
pub mod runner;
pub mod shell;
