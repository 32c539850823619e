//! Source materialization.
//!
//! Turns a raw Verilog payload into a uniquely named file inside the shared
//! scratch directory. Transport layers deliver source with re-quoting and
//! escaped-newline artifacts, so the text is normalized before it touches the
//! filesystem. The resulting [`SourceFile`] owns every on-disk artifact of
//! its invocation and removes them when dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed relative name of the shared scratch directory.
pub const DEFAULT_SCRATCH_DIR: &str = "temp_verilog";

/// Extension Verilator expects on Verilog sources.
const SOURCE_EXT: &str = "v";

/// Base filename used when the payload declares no module.
const FALLBACK_BASE: &str = "test";

static MODULE_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bmodule\s+([A-Za-z_][A-Za-z0-9_$]*)").unwrap());

/// Strip transport-layer artifacts from a raw source payload.
///
/// - one enclosing pair of double quotes, if present
/// - one trailing backslash (line-continuation residue), if present
/// - literal `\n` two-character sequences become real newlines
/// - trailing whitespace is trimmed and exactly one newline appended
///
/// Malformed Verilog passes through untouched; rejecting it is Verilator's
/// job.
pub fn normalize_source(raw: &str) -> String {
    let mut text = raw;
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }
    let text = text.strip_suffix('\\').unwrap_or(text);
    let text = text.replace("\\n", "\n");
    format!("{}\n", text.trim_end())
}

/// First declared module name in the source, if any.
fn detect_module_name(source: &str) -> Option<String> {
    MODULE_DECL
        .captures(source)
        .map(|captures| captures[1].to_string())
}

/// Shared scratch directory for transient per-invocation files.
///
/// The directory itself persists across invocations; only the files inside it
/// are per-invocation. Creation is idempotent, so concurrent invocations may
/// race to create it without failing.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new(DEFAULT_SCRATCH_DIR)
    }
}

/// One materialized Verilog source and the artifacts derived from it.
///
/// The filename combines the detected module name (or [`FALLBACK_BASE`]) with
/// a per-invocation token, so concurrent requests for identically named
/// modules never collide. Dropping the handle removes the source file and any
/// Verilator products, which also covers invocations cancelled mid-flight.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    scratch: PathBuf,
    base: String,
    module: Option<String>,
}

impl SourceFile {
    /// Write normalized source text into the scratch directory.
    pub fn materialize(scratch: &ScratchDir, normalized: &str) -> io::Result<Self> {
        scratch.ensure()?;

        let module = detect_module_name(normalized);
        let token = Uuid::new_v4().simple().to_string();
        let base = format!(
            "{}_{}",
            module.as_deref().unwrap_or(FALLBACK_BASE),
            &token[..8]
        );
        let path = scratch.path().join(format!("{}.{}", base, SOURCE_EXT));

        fs::write(&path, normalized)?;
        debug!("Materialized verilog source: {}", path.display());

        Ok(Self {
            path,
            scratch: scratch.path().to_path_buf(),
            base,
            module,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Module name detected in the source, if any.
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Remove the source file and every generated artifact named after it.
    ///
    /// Verilator prefixes its model outputs with `V` followed by the top
    /// module name (`Vand_gate.h`, `Vand_gate.mk`, the `Vand_gate` binary),
    /// so the sweep matches that prefix against both the detected module and
    /// the unique file base. Failures are logged and swallowed: a cleanup
    /// problem must never replace a compilation outcome.
    fn remove_artifacts(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove source file {}: {}", self.path.display(), err);
            }
        }

        let mut prefixes = vec![format!("V{}", self.base)];
        if let Some(module) = &self.module {
            prefixes.push(format!("V{}", module));
        }

        let entries = match fs::read_dir(&self.scratch) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Failed to scan scratch directory {}: {}", self.scratch.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
                if let Err(err) = fs::remove_file(entry.path()) {
                    warn!("Failed to remove generated artifact {}: {}", name, err);
                }
            }
        }
    }
}

impl Drop for SourceFile {
    fn drop(&mut self) {
        self.remove_artifacts();
    }
}
