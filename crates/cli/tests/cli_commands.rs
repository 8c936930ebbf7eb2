use std::fs;
use std::path::Path;
use std::process::Command;

use predicates::prelude::*;
use tempfile::tempdir;

const HINTS: &str = r#"{"calls":["os","json","json.decoder.*","numpy"],"files":["os","json","json.decoder","numpy"]}"#;

fn hinter() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hinter");
    cmd.env_remove("HINTER_PYTHON")
        .env_remove("HINTER_FAKE_INTERPRETER_TAG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_hints(dir: &Path) -> String {
    let path = dir.join("hints.json");
    fs::write(&path, HINTS).expect("write hints");
    path.display().to_string()
}

#[test]
fn trace_fails_for_missing_script() {
    let dir = tempdir().expect("tempdir");
    hinter()
        .current_dir(dir.path())
        .args(["trace", "absent.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid Python script provided"));
}

#[test]
fn trace_fails_when_interpreter_cannot_be_queried() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("app.py"), "import os\n").expect("write script");
    hinter()
        .current_dir(dir.path())
        .args(["trace", "app.py", "--interpreter", "/nonexistent/python-for-tests"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to trace"));
    assert!(!dir.path().join("hinted-app.py").exists());
}

#[test]
fn trace_and_plan_select_the_configured_launcher() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("app.py"), "import os\n").expect("write script");
    fs::write(dir.path().join("hinter.yaml"), "trace:\n  launcher: jython\n").expect("config");

    for args in [["trace", "app.py"], ["plan", "app.py"]] {
        hinter()
            .current_dir(dir.path())
            .env("HINTER_FAKE_INTERPRETER_TAG", "3 11 linux 64")
            .args(args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to select launcher"))
            .stderr(predicate::str::contains("jython (available: python)"));
    }
    assert!(!dir.path().join("hinted-app.py").exists());
}

#[test]
fn trace_writes_hints_with_a_real_interpreter() {
    let available = Command::new("python3").arg("--version").output().map(|o| o.status.success());
    if !matches!(available, Ok(true)) {
        eprintln!("python3 not available; skipping");
        return;
    }
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("app.py"), "import json\nprint(json.dumps([1]))\n")
        .expect("write script");

    let output = hinter()
        .current_dir(dir.path())
        .args(["trace", "app.py", "--interpreter", "python3", "--json"])
        .output()
        .expect("run hinter");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["outcome"]["status"], "exited");
    let artifact = report["artifact"].as_str().expect("artifact path");
    let hints: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(artifact).expect("read hints")).expect("hints");
    let calls: Vec<&str> =
        hints["calls"].as_array().expect("calls").iter().filter_map(|v| v.as_str()).collect();
    assert!(calls.contains(&"json"), "{calls:?}");
    assert!(!calls.iter().any(|c| c.starts_with("hinted-")), "{calls:?}");
    assert!(!dir.path().join("app.log").exists());
    assert!(!dir.path().join("hinted-app.py").exists());
}

#[test]
fn analyze_writes_hints_next_to_log() {
    let dir = tempdir().expect("tempdir");
    let log = dir.path().join("app.log");
    fs::write(
        &log,
        "1;CALL;json;None\n\
         2;CALL;json.decoder;('JSONDecodeError',)\n\
         2;RESULT;json.decoder;$PYTHONPATH/json/decoder.py\n\
         1;RESULT;json;$PYTHONPATH/json/__init__.py\n",
    )
    .expect("write log");

    hinter()
        .current_dir(dir.path())
        .args(["analyze", "app.log"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calls: 3"))
        .stdout(predicate::str::contains("Files: 2"));

    let hints = fs::read_to_string(dir.path().join("app.json")).expect("read hints");
    assert_eq!(
        hints,
        r#"{"calls":["json","json.decoder","json.decoder.JSONDecodeError"],"files":["json","json.decoder"]}"#
    );
}

#[test]
fn analyze_partial_tolerates_truncated_log() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("cut.log"), "1;CALL;os;None\n1;RESULT;os;$PYTHONPATH/os.py\n1;CALL;json;None\n")
        .expect("write log");

    hinter()
        .current_dir(dir.path())
        .args(["analyze", "cut.log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to analyze trace log"));

    hinter()
        .current_dir(dir.path())
        .args(["analyze", "cut.log", "--partial", "--json", "--output", "out.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"os\""));
    assert!(dir.path().join("out.json").is_file());
}

#[test]
fn analyze_fails_for_missing_log() {
    let dir = tempdir().expect("tempdir");
    hinter()
        .current_dir(dir.path())
        .args(["analyze", "nope.log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Trace log does not exist"));
}

#[test]
fn decide_answers_modules_from_arguments() {
    let dir = tempdir().expect("tempdir");
    let hints = write_hints(dir.path());

    let output = hinter()
        .current_dir(dir.path())
        .args(["decide", "--hints", &hints, "--json", "os", "requests", "pkg_resources"])
        .output()
        .expect("run hinter");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("rows json");
    assert_eq!(rows[0]["module"], "os");
    assert_eq!(rows[0]["verdict"], "keep");
    assert_eq!(rows[0]["reason"], "module is hinted to");
    assert_eq!(rows[1]["verdict"], "drop");
    assert_eq!(rows[1]["reason"], "module is not used");
    assert_eq!(rows[2]["verdict"], "abstain");
    assert!(rows[2].get("reason").is_none());
}

#[test]
fn decide_reads_queries_from_stdin() {
    let dir = tempdir().expect("tempdir");
    let hints = write_hints(dir.path());

    hinter()
        .current_dir(dir.path())
        .args(["decide", "--hints", &hints])
        .write_stdin("json.decoder.scanner\n\nunittest\t/lib/unittest/__init__.py\tpy\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("keep    json.decoder.scanner (module is hinted to)"))
        .stdout(predicate::str::contains("drop    unittest (suppress testing components)"));
}

#[test]
fn decide_rejects_unknown_module_kind() {
    let dir = tempdir().expect("tempdir");
    let hints = write_hints(dir.path());

    hinter()
        .current_dir(dir.path())
        .args(["decide", "--hints", &hints])
        .write_stdin("os\t/lib/os.py\tjar\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown module kind"));
}

#[test]
fn decide_fails_without_hints_file() {
    let dir = tempdir().expect("tempdir");
    hinter()
        .current_dir(dir.path())
        .args(["decide", "--hints", "missing.json", "os"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hinter trace"));
}

#[test]
fn inspect_reports_plugins_and_counts() {
    let dir = tempdir().expect("tempdir");
    let hints = write_hints(dir.path());

    let output = hinter()
        .current_dir(dir.path())
        .args(["inspect", "--hints", &hints, "--json"])
        .output()
        .expect("run hinter");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary");
    assert_eq!(summary["calls"], 4);
    assert_eq!(summary["files"], 4);
    assert_eq!(summary["plugins"][0]["name"], "numpy");
    assert_eq!(summary["plugins"][0]["options"]["include_matplotlib"], false);

    hinter()
        .current_dir(dir.path())
        .args(["inspect", "--hints", &hints])
        .assert()
        .success()
        .stdout(predicate::str::contains("- numpy (include_matplotlib=false, include_scipy=false)"));
}

#[test]
fn plan_requires_existing_hints() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("app.py"), "import os\n").expect("write script");

    hinter()
        .current_dir(dir.path())
        .env("HINTER_FAKE_INTERPRETER_TAG", "3 11 linux 64")
        .args(["plan", "app.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("app-311-linux-64.json"))
        .stderr(predicate::str::contains("hinter trace app.py"));
}

#[test]
fn plan_prints_builder_options() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("gui.pyw"), "import os\n").expect("write script");
    fs::write(dir.path().join("gui-311-linux-64.json"), HINTS).expect("write hints");

    let output = hinter()
        .current_dir(dir.path())
        .env("HINTER_FAKE_INTERPRETER_TAG", "3 11 linux 64")
        .args(["plan", "gui.pyw", "--json"])
        .output()
        .expect("run hinter");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let args: Vec<String> = serde_json::from_slice(&output.stdout).expect("args json");
    assert_eq!(args[0], "--standalone");
    assert_eq!(args[1], "--nofollow-imports");
    assert_eq!(args[2], "--windows-disable-console");
    assert!(args[3].starts_with("--hinted-json-file="));
    assert!(args[3].ends_with("gui-311-linux-64.json"));
    assert!(args[4].ends_with("gui.pyw"));
}

#[test]
fn bad_config_file_is_reported() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("hinter.yaml"), "trace: [unclosed\n").expect("write config");
    let hints = write_hints(dir.path());

    hinter()
        .current_dir(dir.path())
        .args(["inspect", "--hints", &hints])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn configured_advisor_decides_first() {
    let dir = tempdir().expect("tempdir");
    let hints = write_hints(dir.path());
    fs::write(
        dir.path().join("custom.yaml"),
        "policy:\n  advisors:\n    - name: slim\n      drop: [numpy]\n      keep: [requests]\n",
    )
    .expect("write config");

    hinter()
        .current_dir(dir.path())
        .args(["--config", "custom.yaml", "decide", "--hints", &hints, "numpy.linalg", "requests"])
        .assert()
        .success()
        .stdout(predicate::str::contains("drop    numpy.linalg (dropped by plugin slim)"))
        .stdout(predicate::str::contains("keep    requests (module is imported)"));
}
