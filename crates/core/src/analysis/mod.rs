//! Trace analysis: reading the import log, rebuilding the call hierarchy,
//! normalizing module files and reducing the result to an accept-list.
//!
//! The pipeline is `EventReader` -> `CallAnalyzer` (with a `Normalizer`) ->
//! `reduce`. `analyze_log` wires the three together for a log file on disk.

pub mod analyzer;
pub mod normalize;
pub mod reader;
pub mod reduce;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::model::AcceptList;
use crate::store::config::AnalysisConfig;

pub use analyzer::{reconcile_names, CallAnalyzer};
pub use normalize::{strip_platform_tags, Normalizer};
pub use reader::{parse_name_list, parse_record, EventReader};
pub use reduce::{reduce, Reduction};

/// Fatal problems with a trace. A trace that fails here must be redone.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    /// Bad field count, unknown kind or non-numeric depth.
    #[error("Invalid record at line {line} ({reason}): {content}")]
    MalformedRecord { line: usize, content: String, reason: String },

    /// The from-list of a CALL record could not be converted to a list of names.
    #[error("Cannot convert name list at line {line}: {text} ({source})")]
    NameList {
        line: usize,
        text: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected end of trace at line {line} inside open call: {call}")]
    UnexpectedEof { line: usize, call: String },

    #[error("Depth mismatch at line {line}: expected {expected}, found {found}: {content}")]
    DepthMismatch { line: usize, expected: u32, found: u32, content: String },

    #[error("Record at line {line} closes a call that was never opened: {content}")]
    UnmatchedClose { line: usize, content: String },

    #[error("Unknown module file type '{descriptor}' at line {line}")]
    UnknownModuleType { line: usize, descriptor: String },
}

/// Convenience result type for trace analysis.
pub type TraceResult<T> = Result<T, TraceError>;

/// Read, analyze and reduce the trace log at `path`.
///
/// `partial` tolerates a truncated tail (calls left open, unterminated last
/// line). `excluded_file` is the normalized file of the tracing shim, whose
/// entries never belong in the artifact.
pub fn analyze_log(
    path: &Path,
    config: &AnalysisConfig,
    partial: bool,
    excluded_file: Option<&str>,
) -> TraceResult<AcceptList> {
    let file = File::open(path)?;
    let mut reader = EventReader::new(BufReader::new(file)).partial(partial);
    let mut analyzer = CallAnalyzer::from_config(config).partial(partial);
    analyzer.analyze(&mut reader)?;
    info!(
        lines = reader.line_number(),
        calls = analyzer.calls().len(),
        files = analyzer.files().len(),
        "analyzed trace {}",
        path.display()
    );
    Ok(analyzer.into_accept_list(excluded_file))
}
