//! Core data model for import traces, call lists and the persisted accept-list.
//!
//! - `TraceRecord`: one parsed line of a trace log.
//! - `CallEntry`: a `(full_name, source_file)` pair produced by the analyzer.
//! - `AcceptList`: the reduced artifact (`calls` + `files`) handed to the policy.
//! - `ModuleDescriptor` / `Decision`: the policy's query and answer types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Source descriptor recorded for modules that have no originating file.
pub const BUILT_IN: &str = "built-in";

/// Placeholder that replaces the interpreter search-path prefix of a file.
pub const SEARCH_PATH_TOKEN: &str = "$PYTHONPATH";

/// Suffix marking "this name and everything nested under it".
pub const WILDCARD_SUFFIX: &str = ".*";

/// Module name of the traced script itself.
pub const MAIN_MODULE: &str = "__main__";

/// Field delimiter of the trace log format.
pub const FIELD_DELIMITER: char = ';';

/// Kind tag of a trace record (second field of a log line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Call,
    Result,
    Exception,
}

impl RecordKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "CALL" => Some(Self::Call),
            "RESULT" => Some(Self::Result),
            "EXCEPTION" => Some(Self::Exception),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Result => "RESULT",
            Self::Exception => "EXCEPTION",
        }
    }

    /// Number of `;`-separated fields a line of this kind must carry.
    pub fn field_count(&self) -> usize {
        match self {
            Self::Call | Self::Result => 4,
            Self::Exception => 3,
        }
    }
}

/// One event of the import trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    /// An import attempt: requested name plus the requested sub-names
    /// (`None` when the import carried no from-list, `["*"]` for a star import).
    Call { depth: u32, name: String, from_list: Option<Vec<String>> },
    /// A successful import: the module's true dotted name and its source descriptor.
    Result { depth: u32, module: String, source: String },
    /// A failed import.
    Exception { depth: u32, message: String },
}

impl TraceRecord {
    pub fn depth(&self) -> u32 {
        match self {
            Self::Call { depth, .. } | Self::Result { depth, .. } | Self::Exception { depth, .. } => {
                *depth
            }
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Call { .. } => RecordKind::Call,
            Self::Result { .. } => RecordKind::Result,
            Self::Exception { .. } => RecordKind::Exception,
        }
    }
}

/// Log-line form (without the line break): the from-list renders as a
/// tuple literal, `None` when absent.
impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { depth, name, from_list } => {
                write!(f, "{depth};CALL;{name};")?;
                match from_list.as_deref() {
                    None => f.write_str("None"),
                    Some([only]) => write!(f, "('{only}',)"),
                    Some(items) => {
                        let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
                        write!(f, "({})", quoted.join(", "))
                    }
                }
            }
            Self::Result { depth, module, source } => write!(f, "{depth};RESULT;{module};{source}"),
            Self::Exception { depth, message } => write!(f, "{depth};EXCEPTION;{message}"),
        }
    }
}

/// A `(full_name, source_file)` pair accumulated during analysis.
///
/// Not unique while accumulating; the reduction stage deduplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallEntry {
    pub name: String,
    pub file: String,
}

impl CallEntry {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self { name: name.into(), file: file.into() }
    }
}

/// The persisted hints artifact: minimal call-name list and normalized file list.
///
/// Both keys are required when reading; there is no safe default accept-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptList {
    pub calls: Vec<String>,
    pub files: Vec<String>,
}

impl AcceptList {
    pub fn new(calls: Vec<String>, files: Vec<String>) -> Self {
        Self { calls, files }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.files.is_empty()
    }
}

/// How a candidate module is implemented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    #[default]
    #[serde(rename = "py")]
    Source,
    #[serde(rename = "shlib")]
    SharedLibrary,
}

impl ModuleKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "py" | "source" => Some(Self::Source),
            "shlib" | "extension" => Some(Self::SharedLibrary),
            _ => None,
        }
    }
}

/// A module the external builder is about to keep or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub filename: PathBuf,
    pub name: String,
    pub package: Option<String>,
    pub kind: ModuleKind,
}

impl ModuleDescriptor {
    /// Describe a module by dotted name only; the package is the parent name.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let package = name.rsplit_once('.').map(|(parent, _)| parent.to_string());
        Self { filename: PathBuf::new(), name, package, kind: ModuleKind::Source }
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_kind(mut self, kind: ModuleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn top_level_package(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }
}

/// Keep/drop answer of the inclusion policy. Abstaining is `None` at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Keep,
    Drop,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Drop => "drop",
        }
    }
}

/// A verdict together with the human-readable reason reported to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
}

impl Decision {
    pub fn keep(reason: impl Into<String>) -> Self {
        Self { verdict: Verdict::Keep, reason: reason.into() }
    }

    pub fn drop(reason: impl Into<String>) -> Self {
        Self { verdict: Verdict::Drop, reason: reason.into() }
    }

    pub fn is_keep(&self) -> bool {
        self.verdict == Verdict::Keep
    }
}
