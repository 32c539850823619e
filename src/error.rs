//! Failure kinds for a compilation invocation.

use std::time::Duration;
use thiserror::Error;

/// Ways a single invocation can fail before or instead of producing compiler
/// diagnostics.
///
/// A nonzero Verilator exit is deliberately not represented here: the
/// compiler rejecting bad input is a routine outcome, carried in the report
/// together with the child's exit code. Cleanup failures are logged and never
/// reach the caller either.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("verilator not found. Please install it:\n  macOS:  brew install verilator\n  Ubuntu: sudo apt install verilator\n  Fedora: sudo dnf install verilator")]
    ToolchainMissing,

    #[error("failed to write source file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to start verilator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("verilator did not finish within {}s and was terminated", .0.as_secs())]
    Timeout(Duration),
}

impl CompileError {
    /// Exit code reported to the caller, for the kinds that imply one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            // POSIX "command not found"
            CompileError::ToolchainMissing => Some(127),
            _ => None,
        }
    }
}
