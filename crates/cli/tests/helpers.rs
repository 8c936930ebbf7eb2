use std::fs;

use hinter::logging::{default_level, env_filter};
use hinter::{canonicalize_or_current, load_config};
use tempfile::tempdir;
use tracing::Level;

// Changes the process working directory; keep these checks in one test.
#[test]
fn working_directory_helpers() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    assert_eq!(result, tmp.path().canonicalize().expect("canon tmp"));

    let result = canonicalize_or_current("nested").expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));

    let missing = canonicalize_or_current("later.json").expect("missing path");
    assert!(missing.ends_with("later.json"));

    let config = load_config(None).expect("defaults");
    assert_eq!(config.trace.timeout_minutes, 5);

    fs::write(tmp.path().join("hinter.yaml"), "trace:\n  timeout_minutes: 9\n").expect("config");
    let config = load_config(None).expect("discovered config");
    assert_eq!(config.trace.timeout_minutes, 9);

    let absent = tmp.path().join("absent.yaml");
    let err = load_config(Some(absent.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"));

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn verbosity_selects_default_level() {
    assert_eq!(default_level(false), Level::INFO);
    assert_eq!(default_level(true), Level::DEBUG);
    if std::env::var("RUST_LOG").is_err() {
        assert_eq!(env_filter(true).to_string(), "debug");
    }
}
