use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::services::tracer::{
    LaunchRequest, Launcher, ProcessExit, RunnerError, TracedProcess,
};
use crate::store::{ArtifactTag, TraceLayout};

const SHIM_TEMPLATE: &str = include_str!("shim.py");

const TAG_SCRIPT: &str = "import sys; print(sys.version_info[0], sys.version_info[1], \
                         sys.platform, 64 if sys.maxsize > 2 ** 32 else 32)";

/// Overrides the interpreter output with a literal `"<major> <minor> <platform> <bits>"`.
pub const FAKE_TAG_ENV: &str = "HINTER_FAKE_INTERPRETER_TAG";

/// Launches scripts under a CPython interpreter with the import shim installed.
pub struct PythonLauncher {
    interpreter: PathBuf,
    quiet: bool,
}

impl PythonLauncher {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self { interpreter: interpreter.into(), quiet: false }
    }

    /// Discard the traced program's stdout.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn interpreter_for(&self, windowed: bool) -> PathBuf {
        if windowed && cfg!(windows) {
            windowed_interpreter(&self.interpreter)
        } else {
            self.interpreter.clone()
        }
    }
}

impl Launcher for PythonLauncher {
    fn name(&self) -> &'static str {
        "python"
    }

    fn artifact_tag(&self) -> Result<ArtifactTag, RunnerError> {
        let output = match std::env::var(FAKE_TAG_ENV) {
            Ok(fake) => fake,
            Err(_) => query_tag(&self.interpreter)?,
        };
        ArtifactTag::parse(&output).ok_or_else(|| {
            RunnerError::Interpreter(format!(
                "unexpected tag output from {}: {:?}",
                self.interpreter.display(),
                output.trim()
            ))
        })
    }

    fn install_shim(&self, layout: &TraceLayout) -> Result<(), RunnerError> {
        let body = render_shim(layout)?;
        fs::write(&layout.shim_path, body).map_err(|source| RunnerError::Io {
            path: layout.shim_path.clone(),
            source,
        })?;
        debug!(shim = %layout.shim_path.display(), "installed import shim");
        Ok(())
    }

    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn TracedProcess>, RunnerError> {
        let interpreter = self.interpreter_for(request.windowed);
        let mut command = Command::new(&interpreter);
        command
            .arg(&request.shim_path)
            .args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null());
        if self.quiet {
            command.stdout(Stdio::null());
        }
        let child = command.spawn().map_err(|e| {
            RunnerError::Launch(format!("failed to spawn {}: {e}", interpreter.display()))
        })?;
        debug!(pid = child.id(), interpreter = %interpreter.display(), "launched traced program");
        Ok(Box::new(ChildProcess(child)))
    }
}

/// A traced program running as an OS child process.
pub struct ChildProcess(pub Child);

impl TracedProcess for ChildProcess {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.0.try_wait()?.map(|status| ProcessExit { code: status.code() }))
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.kill()?;
        self.0.wait().map(|_| ())
    }
}

/// Shim source for `layout`: installs the import hook, then runs the script.
pub fn render_shim(layout: &TraceLayout) -> Result<String, RunnerError> {
    let literal = |path: &Path| {
        serde_json::to_string(&path.display().to_string())
            .map_err(|e| RunnerError::Launch(format!("failed to quote {}: {e}", path.display())))
    };
    Ok(SHIM_TEMPLATE
        .replace("&script_path", &literal(&layout.script)?)
        .replace("&log_prefix", &literal(&layout.fragment_prefix())?))
}

/// The console-less sibling of a CPython executable (`python.exe` -> `pythonw.exe`).
pub fn windowed_interpreter(interpreter: &Path) -> PathBuf {
    let stem = interpreter.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if !stem.to_ascii_lowercase().starts_with("python") || stem.ends_with('w') {
        return interpreter.to_path_buf();
    }
    let file_name = match interpreter.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}w.{ext}"),
        None => format!("{stem}w"),
    };
    interpreter.with_file_name(file_name)
}

fn query_tag(interpreter: &Path) -> Result<String, RunnerError> {
    let output = Command::new(interpreter).args(["-c", TAG_SCRIPT]).output().map_err(|e| {
        RunnerError::Interpreter(format!("failed to run {}: {e}", interpreter.display()))
    })?;
    if !output.status.success() {
        return Err(RunnerError::Interpreter(format!(
            "{} exited with {}",
            interpreter.display(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
