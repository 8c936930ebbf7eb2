use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config files looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["hinter.yaml", ".hinter.yaml"];

/// Environment variable overriding the configured interpreter.
pub const INTERPRETER_ENV: &str = "HINTER_PYTHON";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Tool configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HinterConfig {
    pub trace: TraceConfig,
    pub analysis: AnalysisConfig,
    pub policy: PolicyConfig,
}

/// How the traced program is launched and awaited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Name of the launcher that runs the traced program.
    pub launcher: String,
    /// Interpreter executable; `HINTER_PYTHON` takes precedence.
    pub interpreter: String,
    /// Minutes to wait for the traced program; 0 waits forever.
    pub timeout_minutes: u64,
    /// Interval between liveness checks of the traced program.
    pub poll_interval_ms: u64,
    /// Keep the consolidated log and the shim after the session.
    pub keep_logs: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            launcher: "python".to_string(),
            interpreter: "python3".to_string(),
            timeout_minutes: 5,
            poll_interval_ms: 100,
            keep_logs: false,
        }
    }
}

impl TraceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Knobs of the call-hierarchy analyzer and normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Packages whose members are accepted wholesale (normalized file names).
    pub accept_always: Vec<String>,
    /// File suffixes of compiled extension modules (lower case, with dot).
    pub shared_library_suffixes: Vec<String>,
    /// Extra search-path prefixes replaced by the placeholder token.
    pub search_paths: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            accept_always: vec![
                "importlib_metadata".to_string(),
                "pytest".to_string(),
                "_pytest".to_string(),
            ],
            shared_library_suffixes: vec![".so".to_string(), ".pyd".to_string()],
            search_paths: Vec::new(),
        }
    }
}

/// A package that is kept regardless of the hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlwaysKeepRule {
    /// Module name, or top-level package prefix when `prefix` is set.
    pub module: String,
    #[serde(default)]
    pub prefix: bool,
    pub reason: String,
}

impl AlwaysKeepRule {
    pub fn matches(&self, full_name: &str, top_level: &str) -> bool {
        if self.prefix {
            top_level.starts_with(&self.module)
        } else {
            full_name == self.module
        }
    }
}

/// An ordered, rule-based advisor consulted before the hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    pub name: String,
    #[serde(default)]
    pub keep: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
}

/// Module-inclusion policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Keep testing frameworks (pytest, _pytest, unittest).
    pub accept_test: bool,
    pub always_keep: Vec<AlwaysKeepRule>,
    /// Per-advisor cap on "keep" messages.
    pub message_limit: usize,
    pub advisors: Vec<AdvisorConfig>,
    /// Package name -> names it imports implicitly.
    pub implicit_imports: BTreeMap<String, Vec<String>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            accept_test: false,
            always_keep: vec![
                AlwaysKeepRule {
                    module: "cv2".to_string(),
                    prefix: false,
                    reason: "needed by OpenCV".to_string(),
                },
                AlwaysKeepRule {
                    module: "pywin".to_string(),
                    prefix: true,
                    reason: "needed by pywin32".to_string(),
                },
            ],
            message_limit: 21,
            advisors: Vec::new(),
            implicit_imports: BTreeMap::new(),
        }
    }
}

impl HinterConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let parse_error =
            |message: String| ConfigError::Parse { path: path.to_path_buf(), message };
        if is_json(path) {
            serde_json::from_str(&body).map_err(|e| parse_error(e.to_string()))
        } else if body.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(&body).map_err(|e| parse_error(e.to_string()))
        }
    }

    /// Load `path` when given; otherwise the first default config file found
    /// in `dir`; otherwise defaults. An explicit path must exist.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map(Self::load)
            .unwrap_or_else(|| Ok(Self::default()))
    }

    /// The interpreter to launch: `HINTER_PYTHON` when set, else the config value.
    pub fn interpreter(&self) -> String {
        std::env::var(INTERPRETER_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.trace.interpreter.clone())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
