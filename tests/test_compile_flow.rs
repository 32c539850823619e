//! End-to-end compilation flow tests against stub toolchain executables.
//!
//! Real Verilator is not required: each test materializes a source file and
//! drives `run_verilator` with a small shell script standing in for the
//! compiler, then checks the report classification and the cleanup invariant
//! (no invocation files left behind in the scratch directory).

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use verilator_mcp::{
    compile_verilog, normalize_source, run_verilator, CompileStatus, ScratchDir, SourceFile,
    VerilatorOptions,
};

const AND_GATE: &str =
    "module and_gate(input a, input b, output y); assign y = a & b; endmodule";

/// Install an executable shell script standing in for verilator.
///
/// Invoked as `verilator --cc <file> --build --Mdir <dir> ...`, so `$2` is
/// the source path and `$5` the scratch directory.
fn write_stub(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("verilator");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn scratch_file_count(scratch: &ScratchDir) -> usize {
    fs::read_dir(scratch.path()).unwrap().count()
}

#[tokio::test]
async fn test_successful_compile_reports_stdout_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let tool = write_stub(tmp.path(), "echo model built");
    let scratch = ScratchDir::new(tmp.path().join("scratch"));
    let options = VerilatorOptions::default();

    // Two sequential invocations: independent results, clean scratch after each.
    for _ in 0..2 {
        let source = SourceFile::materialize(&scratch, &normalize_source(AND_GATE)).unwrap();
        let report = run_verilator(&tool, &source, &scratch, &options).await;

        assert_eq!(report.status, CompileStatus::Success);
        assert!(report.output.contains("model built"));
        assert_eq!(report.error_code, None);

        let file_path = report.file_path.unwrap();
        let name = Path::new(&file_path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.starts_with("and_gate_"));
        assert!(name.ends_with(".v"));

        let command = report.command.unwrap();
        assert!(command.contains("--cc"));
        assert!(command.contains("--Mdir"));
        assert!(command.contains("--error-limit 10"));

        drop(source);
        assert_eq!(scratch_file_count(&scratch), 0);
    }
}

#[tokio::test]
async fn test_failing_compile_captures_diagnostics_and_exit_code() {
    let tmp = TempDir::new().unwrap();
    let tool = write_stub(
        tmp.path(),
        "echo '%Error: syntax error, unexpected EOF' 1>&2\necho 'some stdout context'\nexit 3",
    );
    let scratch = ScratchDir::new(tmp.path().join("scratch"));

    let source = SourceFile::materialize(&scratch, &normalize_source("module broken(")).unwrap();
    let report = run_verilator(&tool, &source, &scratch, &VerilatorOptions::default()).await;

    assert_eq!(report.status, CompileStatus::Error);
    assert_eq!(report.error_code, Some(3));
    assert!(report.file_path.is_none());

    // stderr first, stdout appended after it.
    let stderr_at = report.output.find("%Error").unwrap();
    let stdout_at = report.output.find("some stdout context").unwrap();
    assert!(stderr_at < stdout_at);

    drop(source);
    assert_eq!(scratch_file_count(&scratch), 0);
}

#[tokio::test]
async fn test_generated_artifacts_are_swept() {
    let tmp = TempDir::new().unwrap();
    let tool = write_stub(
        tmp.path(),
        "touch \"$5/Vand_gate.h\" \"$5/Vand_gate.cpp\" \"$5/Vand_gate.mk\" \"$5/Vand_gate\"",
    );
    let scratch = ScratchDir::new(tmp.path().join("scratch"));

    let source = SourceFile::materialize(&scratch, &normalize_source(AND_GATE)).unwrap();
    let report = run_verilator(&tool, &source, &scratch, &VerilatorOptions::default()).await;
    assert_eq!(report.status, CompileStatus::Success);

    drop(source);
    assert_eq!(scratch_file_count(&scratch), 0);
}

#[tokio::test]
async fn test_timeout_terminates_and_reports_cancellation() {
    let tmp = TempDir::new().unwrap();
    let tool = write_stub(tmp.path(), "sleep 5");
    let scratch = ScratchDir::new(tmp.path().join("scratch"));
    let options = VerilatorOptions {
        timeout: Some(Duration::from_millis(200)),
        ..VerilatorOptions::default()
    };

    let source = SourceFile::materialize(&scratch, &normalize_source(AND_GATE)).unwrap();
    let started = Instant::now();
    let report = run_verilator(&tool, &source, &scratch, &options).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.status, CompileStatus::Error);
    assert_eq!(report.error_code, None);
    assert!(report.output.contains("terminated"));

    drop(source);
    assert_eq!(scratch_file_count(&scratch), 0);
}

#[tokio::test]
async fn test_missing_tool_binary_reports_spawn_failure() {
    let tmp = TempDir::new().unwrap();
    let scratch = ScratchDir::new(tmp.path().join("scratch"));
    let source = SourceFile::materialize(&scratch, &normalize_source(AND_GATE)).unwrap();

    let report = run_verilator(
        Path::new("/nonexistent/verilator"),
        &source,
        &scratch,
        &VerilatorOptions::default(),
    )
    .await;

    assert_eq!(report.status, CompileStatus::Error);
    assert_eq!(report.error_code, None);
    assert!(report.output.contains("failed to start verilator"));
    assert!(report.command.is_some());

    drop(source);
    assert_eq!(scratch_file_count(&scratch), 0);
}

#[tokio::test]
async fn test_unwritable_scratch_reports_write_failure() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    // A scratch path nested under a regular file cannot be created.
    let scratch = ScratchDir::new(blocker.join("scratch"));

    let report = compile_verilog(AND_GATE, &scratch, &VerilatorOptions::default()).await;

    assert_eq!(report.status, CompileStatus::Error);
    assert_eq!(report.error_code, None);
    assert!(report.output.contains("failed to write source file"));
}
