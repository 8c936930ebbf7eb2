use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Interpreter identity carried in artifact file names so hints are never
/// reused across interpreter versions, platforms or pointer widths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTag {
    pub major: u32,
    pub minor: u32,
    pub platform: String,
    pub bits: u32,
}

impl ArtifactTag {
    pub fn new(major: u32, minor: u32, platform: impl Into<String>, bits: u32) -> Self {
        Self { major, minor, platform: platform.into(), bits }
    }

    /// Parse the interpreter tag output: `"<major> <minor> <platform> <bits>"`.
    pub fn parse(output: &str) -> Option<Self> {
        let mut parts = output.split_whitespace();
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let platform = parts.next()?.to_string();
        let bits = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, platform, bits })
    }

    /// `<stem>-<major><minor>-<platform>-<bits>.json`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}-{self}.json")
    }
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{}-{}", self.major, self.minor, self.platform, self.bits)
    }
}

/// Paths used while tracing one script.
///
/// Derived from the script path and a session id; it does *not* touch the
/// filesystem. Everything lives next to the traced script.
#[derive(Debug, Clone)]
pub struct TraceLayout {
    /// The traced script.
    pub script: PathBuf,
    /// Directory containing the script (shim, logs and artifact go here).
    pub script_dir: PathBuf,
    /// Script file name without extension.
    pub stem: String,
    /// Script extension including the dot (`.py`, `.pyw`), or empty.
    pub extension: String,
    /// Identifier of the tracing session (the tracer's process id).
    pub session_id: String,
    /// Generated shim that installs the import hook and runs the script.
    pub shim_path: PathBuf,
    /// Consolidated log assembled from all per-process fragments.
    pub log_path: PathBuf,
}

impl TraceLayout {
    pub fn new(script: impl AsRef<Path>, session_id: impl Into<String>) -> Self {
        let script = script.as_ref().to_path_buf();
        let script_dir = script.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = script.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let extension = script
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let shim_path = script_dir.join(format!("hinted-{stem}{extension}"));
        let log_path = script_dir.join(format!("{stem}.log"));

        Self {
            script,
            script_dir,
            stem,
            extension,
            session_id: session_id.into(),
            shim_path,
            log_path,
        }
    }

    /// Path prefix of the per-process logs; each process appends `-<pid>.log`.
    pub fn fragment_prefix(&self) -> PathBuf {
        self.script_dir.join(self.fragment_stem())
    }

    fn fragment_stem(&self) -> String {
        format!("{}-{}", self.stem, self.session_id)
    }

    /// Whether `file_name` is a per-process log written during this session.
    pub fn is_fragment(&self, file_name: &str) -> bool {
        file_name.ends_with(".log") && file_name.starts_with(&format!("{}-", self.fragment_stem()))
    }

    /// Normalized module name of the shim, excluded from every artifact.
    pub fn shim_module(&self) -> String {
        format!("hinted-{}", self.stem)
    }

    /// Location of the hints artifact for the given interpreter.
    pub fn artifact_path(&self, tag: &ArtifactTag) -> PathBuf {
        self.script_dir.join(tag.file_name(&self.stem))
    }

    /// Whether the script is a windowed (console-less) script.
    pub fn is_windowed(&self) -> bool {
        self.extension.eq_ignore_ascii_case(".pyw")
    }

    /// Command-line options for a standalone build guided by `artifact`.
    ///
    /// The builder follows no imports by itself and asks the inclusion policy
    /// (registered as `plugin`, when given) about every candidate module.
    pub fn builder_arguments(&self, artifact: &Path, plugin: Option<&Path>) -> Vec<String> {
        let mut args = vec!["--standalone".to_string(), "--nofollow-imports".to_string()];
        if self.is_windowed() {
            args.push("--windows-disable-console".to_string());
        }
        if let Some(plugin) = plugin {
            args.push(format!("--user-plugin={}", plugin.display()));
        }
        args.push(format!("--hinted-json-file={}", artifact.display()));
        args.push(self.script.display().to_string());
        args
    }
}
