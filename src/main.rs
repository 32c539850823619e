use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use verilator_mcp::{
    compile_verilog, serve_stdio, CompileStatus, ScratchDir, VerilatorOptions, VerilatorServer,
    DEFAULT_SCRATCH_DIR,
};

/// MCP server that compiles Verilog with Verilator
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Scratch directory for transient sources and build artifacts
    #[arg(long, default_value = DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// Maximum seconds to wait for verilator before terminating it
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio
    Serve,

    /// Compile a single Verilog file and print the report as JSON
    Compile {
        /// Verilog source file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // stdout carries the MCP protocol, so all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let scratch = ScratchDir::new(&cli.scratch_dir);
    let options = VerilatorOptions {
        timeout: cli.timeout.map(Duration::from_secs),
        ..VerilatorOptions::default()
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("Starting Verilog compilation MCP server");
            serve_stdio(VerilatorServer::new(scratch, options)).await?;
            info!("Verilog compilation MCP server shutting down");
        }

        Commands::Compile { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = compile_verilog(&raw, &scratch, &options).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == CompileStatus::Error {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
