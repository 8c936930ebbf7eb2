use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::{analyze_log, TraceError};
use crate::model::RecordKind;
use crate::store::{
    remove_if_exists, sha256_file, write_accept_list, AnalysisConfig, ArtifactError, ArtifactTag,
    TraceLayout,
};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Script not found at {0}")]
    MissingScript(PathBuf),
    #[error("Launcher not found: {0}")]
    MissingLauncher(String),
    #[error("Interpreter error: {0}")]
    Interpreter(String),
    #[error("Launch failed: {0}")]
    Launch(String),
    #[error("Trace session IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Exit information of a traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

/// A running traced program, as seen by the session.
pub trait TracedProcess: Send {
    /// Non-blocking check; `Ok(None)` while still running.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;
    fn kill(&mut self) -> io::Result<()>;
}

/// What the launcher needs to start the traced program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub shim_path: PathBuf,
    pub script_path: PathBuf,
    pub working_dir: PathBuf,
    /// Arguments passed through to the traced script.
    pub args: Vec<String>,
    /// Whether the script is console-less (`.pyw`).
    pub windowed: bool,
}

/// Capability object that makes import activity observable.
///
/// The session receives one launcher and uses it for every interpreter
/// interaction of its lifetime: probing the artifact tag, installing the
/// import-tracing shim and starting the program under that shim.
pub trait Launcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn artifact_tag(&self) -> Result<ArtifactTag, RunnerError>;
    fn install_shim(&self, layout: &TraceLayout) -> Result<(), RunnerError>;
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn TracedProcess>, RunnerError>;
}

/// Registry for launchers; callers select by name.
#[derive(Default)]
pub struct LauncherRegistry {
    launchers: HashMap<String, Box<dyn Launcher>>,
}

impl LauncherRegistry {
    pub fn new() -> Self {
        Self { launchers: HashMap::new() }
    }

    pub fn register<L: Launcher + 'static>(&mut self, launcher: L) -> &mut Self {
        self.launchers.insert(launcher.name().to_string(), Box::new(launcher));
        self
    }

    pub fn get(&self, name: &str) -> Result<&dyn Launcher, RunnerError> {
        self.launchers.get(name).map(|l| &**l).ok_or_else(|| {
            RunnerError::MissingLauncher(format!("{name} (available: {})", self.names().join(", ")))
        })
    }

    /// Sorted launcher names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.launchers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// How the traced program ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TraceOutcome {
    Exited { code: Option<i32> },
    TimedOut { after_secs: u64 },
    Failed { message: String },
}

impl TraceOutcome {
    /// Only a clean exit guarantees a well-bracketed log.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

/// Session options that are not part of the analysis config.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub keep_logs: bool,
    pub args: Vec<String>,
    /// Session id used to tag log fragments; defaults to the tracer's pid.
    pub session_id: Option<String>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5 * 60)),
            poll_interval: Duration::from_millis(100),
            keep_logs: false,
            args: Vec::new(),
            session_id: None,
        }
    }
}

/// Summary of a finished trace session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    pub script: PathBuf,
    pub script_sha256: Option<String>,
    pub artifact: PathBuf,
    pub outcome: TraceOutcome,
    pub fragments: usize,
    pub calls: usize,
    pub files: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// Runs one traced program and turns its import log into a hints artifact.
pub struct TraceSession<'a> {
    pub launcher: &'a dyn Launcher,
    pub analysis: &'a AnalysisConfig,
    pub options: TraceOptions,
}

impl<'a> TraceSession<'a> {
    pub fn run(&self, script: &Path) -> Result<TraceReport, RunnerError> {
        if !script.is_file() {
            return Err(RunnerError::MissingScript(script.to_path_buf()));
        }
        let script = script
            .canonicalize()
            .map_err(|source| RunnerError::Io { path: script.to_path_buf(), source })?;
        let session_id =
            self.options.session_id.clone().unwrap_or_else(|| std::process::id().to_string());
        let layout = TraceLayout::new(&script, session_id);
        let started_at = Utc::now().to_rfc3339();

        let tag = self.launcher.artifact_tag()?;
        let artifact = layout.artifact_path(&tag);
        info!(script = %script.display(), artifact = %artifact.display(), "tracing imports");

        remove_if_exists(&layout.log_path).map_err(|source| io_error(&layout.log_path, source))?;
        self.launcher.install_shim(&layout)?;

        let outcome = self.execute(&layout);
        match &outcome {
            TraceOutcome::Exited { code: Some(0) } => debug!("traced program exited cleanly"),
            TraceOutcome::Exited { code } => {
                warn!(?code, "traced program exited with an error; processing output nonetheless")
            }
            TraceOutcome::TimedOut { after_secs } => {
                warn!(after_secs, "traced program timed out; processing output nonetheless")
            }
            TraceOutcome::Failed { message } => {
                warn!(%message, "traced program failed; processing output nonetheless")
            }
        }

        let fragments = consolidate_logs(&layout)?;
        let accept_list = analyze_log(
            &layout.log_path,
            self.analysis,
            !outcome.is_complete(),
            Some(&layout.shim_module()),
        )?;
        write_accept_list(&artifact, &accept_list)?;

        if !self.options.keep_logs {
            remove_if_exists(&layout.log_path)
                .map_err(|source| io_error(&layout.log_path, source))?;
            remove_if_exists(&layout.shim_path)
                .map_err(|source| io_error(&layout.shim_path, source))?;
        }

        info!(
            calls = accept_list.calls.len(),
            files = accept_list.files.len(),
            "wrote hints to {}",
            artifact.display()
        );

        Ok(TraceReport {
            script_sha256: sha256_file(&script).ok(),
            script,
            artifact,
            outcome,
            fragments,
            calls: accept_list.calls.len(),
            files: accept_list.files.len(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        })
    }

    /// Launch and await the traced program. Never fails: problems downgrade
    /// to an outcome that lets the session process partial output.
    fn execute(&self, layout: &TraceLayout) -> TraceOutcome {
        let request = LaunchRequest {
            shim_path: layout.shim_path.clone(),
            script_path: layout.script.clone(),
            working_dir: layout.script_dir.clone(),
            args: self.options.args.clone(),
            windowed: layout.is_windowed(),
        };
        match self.launcher.launch(&request) {
            Ok(mut process) => wait_with_timeout(
                process.as_mut(),
                self.options.timeout,
                self.options.poll_interval,
            ),
            Err(err) => TraceOutcome::Failed { message: err.to_string() },
        }
    }
}

/// Poll `process` until it exits or `timeout` elapses; kill it on timeout.
pub fn wait_with_timeout(
    process: &mut dyn TracedProcess,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> TraceOutcome {
    let start = Instant::now();
    loop {
        match process.try_wait() {
            Ok(Some(exit)) => return TraceOutcome::Exited { code: exit.code },
            Ok(None) => {
                if let Some(limit) = timeout {
                    if start.elapsed() >= limit {
                        if let Err(err) = process.kill() {
                            warn!(error = %err, "failed to kill traced program");
                        }
                        return TraceOutcome::TimedOut { after_secs: limit.as_secs() };
                    }
                }
                thread::sleep(poll_interval);
            }
            Err(err) => return TraceOutcome::Failed { message: err.to_string() },
        }
    }
}

/// Concatenate this session's per-process logs into the consolidated log and
/// delete them. Returns the number of fragments found.
///
/// Only trace lines survive; a fragment's unterminated last line (process
/// killed mid-write) is dropped.
pub fn consolidate_logs(layout: &TraceLayout) -> Result<usize, RunnerError> {
    let mut fragments: Vec<PathBuf> = Vec::new();
    let entries =
        fs::read_dir(&layout.script_dir).map_err(|source| io_error(&layout.script_dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_error(&layout.script_dir, source))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if layout.is_fragment(&name) && entry.path().is_file() {
            fragments.push(entry.path());
        }
    }
    fragments.sort();

    let mut out = fs::File::create(&layout.log_path)
        .map_err(|source| io_error(&layout.log_path, source))?;
    for fragment in &fragments {
        let body = fs::read_to_string(fragment).map_err(|source| io_error(fragment, source))?;
        for line in body.split_inclusive('\n') {
            if !line.ends_with('\n') {
                warn!(fragment = %fragment.display(), "dropping unterminated last line");
                continue;
            }
            if is_trace_line(line) {
                out.write_all(line.as_bytes())
                    .map_err(|source| io_error(&layout.log_path, source))?;
            }
        }
        fs::remove_file(fragment).map_err(|source| io_error(fragment, source))?;
    }
    out.flush().map_err(|source| io_error(&layout.log_path, source))?;

    debug!(fragments = fragments.len(), "consolidated trace fragments");
    Ok(fragments.len())
}

fn is_trace_line(line: &str) -> bool {
    [RecordKind::Call, RecordKind::Result, RecordKind::Exception]
        .iter()
        .any(|kind| line.contains(kind.as_str()))
}

fn io_error(path: &Path, source: io::Error) -> RunnerError {
    RunnerError::Io { path: path.to_path_buf(), source }
}
