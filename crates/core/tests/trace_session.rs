use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hinter_core::analysis::TraceError;
use hinter_core::model::AcceptList;
use hinter_core::services::{
    consolidate_logs, wait_with_timeout, LaunchRequest, Launcher, LauncherRegistry, ProcessExit,
    RunnerError, TraceOptions, TraceOutcome, TraceSession, TracedProcess,
};
use hinter_core::store::{read_accept_list, AnalysisConfig, ArtifactTag, TraceLayout};
use tempfile::{tempdir, TempDir};

#[derive(Clone, Copy)]
enum Behavior {
    Exit(Option<i32>),
    Hang,
    FailToLaunch,
}

/// Writes canned per-process logs instead of running an interpreter.
struct FakeLauncher {
    fragments: Vec<(u32, &'static str)>,
    behavior: Behavior,
    prefix: Mutex<Option<PathBuf>>,
    killed: Arc<AtomicBool>,
    requests: Mutex<Vec<LaunchRequest>>,
}

impl FakeLauncher {
    fn new(behavior: Behavior, fragments: Vec<(u32, &'static str)>) -> Self {
        Self {
            fragments,
            behavior,
            prefix: Mutex::new(None),
            killed: Arc::new(AtomicBool::new(false)),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Launcher for FakeLauncher {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn artifact_tag(&self) -> Result<ArtifactTag, RunnerError> {
        Ok(ArtifactTag::new(3, 11, "linux", 64))
    }

    fn install_shim(&self, layout: &TraceLayout) -> Result<(), RunnerError> {
        fs::write(&layout.shim_path, "# shim\n").unwrap();
        *self.prefix.lock().unwrap() = Some(layout.fragment_prefix());
        Ok(())
    }

    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn TracedProcess>, RunnerError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Behavior::FailToLaunch = self.behavior {
            return Err(RunnerError::Launch("interpreter vanished".into()));
        }
        let prefix = self.prefix.lock().unwrap().clone().expect("shim installed first");
        for (pid, body) in &self.fragments {
            fs::write(format!("{}-{pid}.log", prefix.display()), body).unwrap();
        }
        let exit = match self.behavior {
            Behavior::Exit(code) => Some(ProcessExit { code }),
            _ => None,
        };
        Ok(Box::new(FakeProcess { exit, killed: self.killed.clone() }))
    }
}

struct FakeProcess {
    exit: Option<ProcessExit>,
    killed: Arc<AtomicBool>,
}

impl TracedProcess for FakeProcess {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(Some(ProcessExit { code: None }));
        }
        Ok(self.exit)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn script_in(dir: &TempDir, name: &str) -> PathBuf {
    let script = dir.path().join(name);
    fs::write(&script, "import os\nimport json\n").unwrap();
    script
}

fn options(timeout: Option<Duration>) -> TraceOptions {
    TraceOptions {
        timeout,
        poll_interval: Duration::from_millis(1),
        keep_logs: false,
        args: vec!["--flag".into()],
        session_id: Some("42".into()),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const OS_FRAGMENT: &str = "1;CALL;os;None\n1;RESULT;os;$PYTHONPATH/os.py\nhello from app\n";
const JSON_FRAGMENT: &str = "1;CALL;json;None\n\
                             2;CALL;json.decoder;('JSONDecodeError',)\n\
                             2;RESULT;json.decoder;$PYTHONPATH/json/decoder.py\n\
                             1;RESULT;json;$PYTHONPATH/json/__init__.py\n";

#[test]
fn clean_run_merges_fragments_into_artifact() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "app.py");
    fs::write(dir.path().join("app-99-5.log"), "1;CALL;other;None\n").unwrap();
    let launcher =
        FakeLauncher::new(Behavior::Exit(Some(0)), vec![(1002, JSON_FRAGMENT), (1001, OS_FRAGMENT)]);
    let analysis = AnalysisConfig::default();
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: options(None) };

    let report = session.run(&script).unwrap();

    let root = dir.path().canonicalize().unwrap();
    assert_eq!(report.artifact, root.join("app-311-linux-64.json"));
    assert_eq!(report.outcome, TraceOutcome::Exited { code: Some(0) });
    assert_eq!(report.fragments, 2);
    assert_eq!(report.calls, 4);
    assert_eq!(report.files, 3);
    assert_eq!(report.script_sha256.as_deref().map(str::len), Some(64));

    let list = read_accept_list(&report.artifact).unwrap();
    assert_eq!(list.calls, strings(&["json", "json.decoder", "json.decoder.JSONDecodeError", "os"]));
    assert_eq!(list.files, strings(&["json", "json.decoder", "os"]));

    assert!(!root.join("app.log").exists());
    assert!(!root.join("hinted-app.py").exists());
    assert!(!root.join("app-42-1001.log").exists());
    assert!(!root.join("app-42-1002.log").exists());
    assert!(root.join("app-99-5.log").exists(), "other sessions' fragments stay");

    let requests = launcher.requests.lock().unwrap();
    assert_eq!(requests[0].shim_path, root.join("hinted-app.py"));
    assert_eq!(requests[0].working_dir, root);
    assert_eq!(requests[0].args, vec!["--flag".to_string()]);
    assert!(!requests[0].windowed);
}

#[test]
fn timed_out_program_is_killed_and_partial_trace_kept() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "hang.py");
    let launcher = FakeLauncher::new(
        Behavior::Hang,
        vec![(7, "1;CALL;os;None\n1;RESULT;os;$PYTHONPATH/os.py\n1;CALL;json;None\n2;CALL;re;No")],
    );
    let analysis = AnalysisConfig::default();
    let session = TraceSession {
        launcher: &launcher,
        analysis: &analysis,
        options: options(Some(Duration::from_millis(20))),
    };

    let report = session.run(&script).unwrap();

    assert!(launcher.killed.load(Ordering::SeqCst));
    assert_eq!(report.outcome, TraceOutcome::TimedOut { after_secs: 0 });
    let list = read_accept_list(&report.artifact).unwrap();
    assert_eq!(list.calls, strings(&["os"]));
}

#[test]
fn timed_out_child_fragment_does_not_poison_later_fragments() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "forked.py");
    let launcher = FakeLauncher::new(
        Behavior::Hang,
        vec![(100, "1;CALL;slow;None\n2;CALL;slower;None\n"), (200, OS_FRAGMENT), (300, JSON_FRAGMENT)],
    );
    let analysis = AnalysisConfig::default();
    let session = TraceSession {
        launcher: &launcher,
        analysis: &analysis,
        options: options(Some(Duration::from_millis(5))),
    };

    let report = session.run(&script).unwrap();

    assert_eq!(report.outcome, TraceOutcome::TimedOut { after_secs: 0 });
    assert_eq!(report.fragments, 3);
    let list = read_accept_list(&report.artifact).unwrap();
    assert_eq!(list.calls, strings(&["json", "json.decoder", "json.decoder.JSONDecodeError", "os"]));
    assert_eq!(list.files, strings(&["json", "json.decoder", "os"]));
}

#[test]
fn externally_killed_program_still_yields_valid_artifact() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "killed.py");
    let launcher = FakeLauncher::new(Behavior::Exit(None), vec![(9, "1;CALL;os;None\n")]);
    let analysis = AnalysisConfig::default();
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: options(None) };

    let report = session.run(&script).unwrap();

    assert_eq!(report.outcome, TraceOutcome::Exited { code: None });
    let body = fs::read_to_string(&report.artifact).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(value["calls"].is_array());
    assert!(value["files"].is_array());
    assert_eq!(read_accept_list(&report.artifact).unwrap(), AcceptList::default());
}

#[test]
fn launch_failure_is_downgraded_to_an_empty_artifact() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "app.py");
    let launcher = FakeLauncher::new(Behavior::FailToLaunch, Vec::new());
    let analysis = AnalysisConfig::default();
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: options(None) };

    let report = session.run(&script).unwrap();

    match &report.outcome {
        TraceOutcome::Failed { message } => assert!(message.contains("interpreter vanished")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.fragments, 0);
    assert!(read_accept_list(&report.artifact).unwrap().is_empty());
}

#[test]
fn missing_script_is_rejected_before_launch() {
    let dir = tempdir().unwrap();
    let launcher = FakeLauncher::new(Behavior::Exit(Some(0)), Vec::new());
    let analysis = AnalysisConfig::default();
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: options(None) };

    let err = session.run(&dir.path().join("absent.py")).unwrap_err();
    assert!(matches!(err, RunnerError::MissingScript(_)), "{err}");
    assert!(launcher.requests.lock().unwrap().is_empty());
}

#[test]
fn corrupt_trace_from_clean_exit_is_fatal() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "app.py");
    let launcher =
        FakeLauncher::new(Behavior::Exit(Some(0)), vec![(3, "1;CALL;os;None\n1;RESULT;os\n")]);
    let analysis = AnalysisConfig::default();
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: options(None) };

    let err = session.run(&script).unwrap_err();
    assert!(
        matches!(err, RunnerError::Trace(TraceError::MalformedRecord { line: 2, .. })),
        "{err}"
    );
}

#[test]
fn keep_logs_preserves_consolidated_log_and_shim() {
    let dir = tempdir().unwrap();
    let script = script_in(&dir, "gui.pyw");
    let launcher = FakeLauncher::new(Behavior::Exit(Some(1)), vec![(1, OS_FRAGMENT)]);
    let analysis = AnalysisConfig::default();
    let mut opts = options(None);
    opts.keep_logs = true;
    let session = TraceSession { launcher: &launcher, analysis: &analysis, options: opts };

    let report = session.run(&script).unwrap();

    let root = dir.path().canonicalize().unwrap();
    assert_eq!(report.outcome, TraceOutcome::Exited { code: Some(1) });
    assert_eq!(
        fs::read_to_string(root.join("gui.log")).unwrap(),
        "1;CALL;os;None\n1;RESULT;os;$PYTHONPATH/os.py\n"
    );
    assert!(root.join("hinted-gui.pyw").exists());
    assert!(launcher.requests.lock().unwrap()[0].windowed);
}

#[test]
fn consolidation_drops_unterminated_tails_and_noise() {
    let dir = tempdir().unwrap();
    let layout = TraceLayout::new(dir.path().join("app.py"), "5");
    fs::write(dir.path().join("app-5-2.log"), "2;RESULT;b;$PYTHONPATH/b.py\nnoise\n2;CALL;c;No")
        .unwrap();
    fs::write(dir.path().join("app-5-1.log"), "1;CALL;a;None\n").unwrap();

    assert_eq!(consolidate_logs(&layout).unwrap(), 2);

    assert_eq!(
        fs::read_to_string(&layout.log_path).unwrap(),
        "1;CALL;a;None\n2;RESULT;b;$PYTHONPATH/b.py\n"
    );
    assert!(!dir.path().join("app-5-1.log").exists());
}

struct Countdown(u32);

impl TracedProcess for Countdown {
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if self.0 == 0 {
            return Ok(Some(ProcessExit { code: Some(3) }));
        }
        self.0 -= 1;
        Ok(None)
    }

    fn kill(&mut self) -> io::Result<()> {
        panic!("must not be killed without a timeout");
    }
}

#[test]
fn waiting_without_timeout_polls_until_exit() {
    let mut process = Countdown(3);
    let outcome = wait_with_timeout(&mut process, None, Duration::from_millis(1));
    assert_eq!(outcome, TraceOutcome::Exited { code: Some(3) });
    assert!(!outcome.is_complete());
    assert!(TraceOutcome::Exited { code: Some(0) }.is_complete());
}

#[test]
fn launcher_registry_resolves_by_name() {
    let mut registry = LauncherRegistry::new();
    registry.register(FakeLauncher::new(Behavior::Exit(Some(0)), Vec::new()));
    assert_eq!(registry.get("fake").unwrap().name(), "fake");
    match registry.get("jython") {
        Err(RunnerError::MissingLauncher(message)) => assert!(message.contains("fake")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unexpected launcher"),
    }
    assert_eq!(registry.names(), vec!["fake".to_string()]);
}
