//! Verilog compilation service backed by Verilator.
//!
//! One remote-callable operation, "compile this Verilog source", exposed as
//! an MCP tool over stdio. A request payload is normalized and materialized
//! as a uniquely named file in a shared scratch directory, Verilator runs
//! against it as a subprocess, and the captured outcome comes back as a
//! structured report. Every transient file the invocation creates is removed
//! before the report reaches the caller, whichever way the invocation ends.

pub mod error;
pub mod server;
pub mod source;
pub mod verilator;

pub use error::CompileError;
pub use server::{serve_stdio, VerilatorServer};
pub use source::{normalize_source, ScratchDir, SourceFile, DEFAULT_SCRATCH_DIR};
pub use verilator::{
    compile_verilog, find_verilator, run_verilator, CompilationReport, CompileStatus,
    VerilatorOptions,
};
