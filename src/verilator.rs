//! Verilator invocation.
//!
//! Locates the Verilator executable, runs it against a materialized source
//! file with a fixed server-side flag policy, and classifies the outcome into
//! a [`CompilationReport`]. Cleanup of the source and generated model
//! artifacts is owned by [`SourceFile`] and runs on every exit path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::CompileError;
use crate::source::{normalize_source, ScratchDir, SourceFile};

/// Conventional install locations probed before falling back to PATH.
const VERILATOR_CANDIDATES: &[&str] = &[
    "/usr/local/bin/verilator",
    "/usr/bin/verilator",
    "/opt/homebrew/bin/verilator",
    "/opt/local/bin/verilator",
];

/// Fixed invocation policy.
///
/// The flag set is server-side policy, not caller-tunable: `-Wall` with
/// `DECLFILENAME` suppressed (the per-invocation filename suffix means the
/// file name never matches the module name) and a bounded error list. Only
/// the maximum wait is operator-configurable.
#[derive(Debug, Clone)]
pub struct VerilatorOptions {
    /// Value passed to `--error-limit`.
    pub error_limit: u32,
    /// Maximum wall-clock wait for the child; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for VerilatorOptions {
    fn default() -> Self {
        Self {
            error_limit: 10,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileStatus {
    Success,
    Error,
}

/// Structured outcome of one compilation invocation.
///
/// `status` is `Success` iff Verilator actually ran and exited 0. The
/// reported `file_path` is informational: the file is already gone by the
/// time the caller sees it.
#[derive(Debug, Clone, Serialize)]
pub struct CompilationReport {
    pub status: CompileStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl CompilationReport {
    fn success(output: String, file_path: String, command: String) -> Self {
        Self {
            status: CompileStatus::Success,
            output,
            error_code: None,
            file_path: Some(file_path),
            command: Some(command),
        }
    }

    /// Report for a failure that happened before or instead of a compiler
    /// run; the transport layer never sees the underlying error value.
    pub fn from_error(err: &CompileError, command: Option<String>) -> Self {
        Self {
            status: CompileStatus::Error,
            output: err.to_string(),
            error_code: err.exit_code(),
            file_path: None,
            command,
        }
    }
}

/// Locate the Verilator executable.
///
/// Re-resolved on every invocation rather than cached: toolchain installation
/// state may change underneath a long-lived server.
pub fn find_verilator() -> Option<PathBuf> {
    for candidate in VERILATOR_CANDIDATES {
        let path = Path::new(candidate);
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
    }

    // Fall back to a PATH lookup.
    if let Ok(output) = std::process::Command::new("which")
        .arg("verilator")
        .output()
    {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout);
            let path = PathBuf::from(path_str.trim());
            if path.exists() {
                return Some(path);
            }
        }
    }

    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn verilator_args(source: &Path, scratch: &Path, options: &VerilatorOptions) -> Vec<String> {
    vec![
        "--cc".to_string(),
        source.to_string_lossy().to_string(),
        "--build".to_string(),
        "--Mdir".to_string(),
        scratch.to_string_lossy().to_string(),
        "-Wall".to_string(),
        "-Wno-DECLFILENAME".to_string(),
        "--error-limit".to_string(),
        options.error_limit.to_string(),
    ]
}

fn render_command(tool: &Path, args: &[String]) -> String {
    let mut line = tool.to_string_lossy().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run Verilator against a materialized source and classify the outcome.
///
/// stdout and stderr are captured separately with nothing attached to stdin.
/// Exit 0 yields a success report carrying stdout; a nonzero exit yields an
/// error report with stderr first (the diagnostics are the primary signal),
/// then stdout, plus the real exit code. A spawn failure or an expired
/// timeout yields an error report with no exit code.
pub async fn run_verilator(
    tool: &Path,
    source: &SourceFile,
    scratch: &ScratchDir,
    options: &VerilatorOptions,
) -> CompilationReport {
    let args = verilator_args(source.path(), scratch.path(), options);
    let command_line = render_command(tool, &args);
    debug!("Running: {}", command_line);

    let mut command = Command::new(tool);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the wait future (timeout expiry, cancelled request) kills
        // the child; the runtime reaps it in the background.
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!("Failed to start verilator: {}", err);
            return CompilationReport::from_error(&CompileError::Spawn(err), Some(command_line));
        }
    };

    let waited = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(done) => done,
            Err(_) => {
                warn!("Verilator timed out after {:?}, terminating", limit);
                return CompilationReport::from_error(
                    &CompileError::Timeout(limit),
                    Some(command_line),
                );
            }
        },
        None => child.wait_with_output().await,
    };
    let output = match waited {
        Ok(output) => output,
        Err(err) => {
            warn!("Failed to collect verilator output: {}", err);
            return CompilationReport::from_error(&CompileError::Spawn(err), Some(command_line));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        info!("Verilator compilation succeeded: {}", source.path().display());
        CompilationReport::success(
            stdout.into_owned(),
            source.path().display().to_string(),
            command_line,
        )
    } else {
        debug!(
            "Verilator exited with {:?}: {}",
            output.status.code(),
            source.path().display()
        );
        // stderr first: compiler diagnostics are the primary signal.
        let mut diagnostics = stderr.into_owned();
        if !stdout.is_empty() {
            if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&stdout);
        }
        CompilationReport {
            status: CompileStatus::Error,
            output: diagnostics,
            error_code: output.status.code(),
            file_path: None,
            command: Some(command_line),
        }
    }
}

/// Full compilation pipeline for one request payload.
///
/// Infallible by contract: every failure kind collapses into an error report,
/// so the transport layer never sees an unwind. The materialized source drops
/// at the end of every path, sweeping the scratch directory clean of this
/// invocation's files.
pub async fn compile_verilog(
    raw_source: &str,
    scratch: &ScratchDir,
    options: &VerilatorOptions,
) -> CompilationReport {
    let normalized = normalize_source(raw_source);

    let source = match SourceFile::materialize(scratch, &normalized) {
        Ok(source) => source,
        Err(err) => {
            warn!("Failed to materialize source: {}", err);
            return CompilationReport::from_error(&CompileError::Write(err), None);
        }
    };

    let tool = match find_verilator() {
        Some(tool) => tool,
        None => return CompilationReport::from_error(&CompileError::ToolchainMissing, None),
    };

    run_verilator(&tool, &source, scratch, options).await
}
