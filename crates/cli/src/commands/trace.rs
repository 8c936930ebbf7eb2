use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use hinter_core::services::{
    default_launcher_registry, TraceOptions, TraceOutcome, TraceReport, TraceSession,
};
use hinter_core::store::HinterConfig;

use crate::canonicalize_or_current;

/// Trace the imports of `script` and write its hints artifact next to it.
///
/// `timeout_minutes` and `interpreter` override the configuration; a timeout
/// of 0 waits forever.
pub fn trace_command(
    config: &HinterConfig,
    script: &str,
    timeout_minutes: Option<u64>,
    interpreter: Option<String>,
    keep_logs: bool,
    json: bool,
    args: Vec<String>,
) -> Result<TraceReport> {
    let script_path = canonicalize_or_current(script)?;
    if !script_path.is_file() {
        return Err(anyhow!("No valid Python script provided: {}", script_path.display()));
    }

    let interpreter = interpreter.map(PathBuf::from).unwrap_or_else(|| config.interpreter().into());
    let registry = default_launcher_registry(interpreter, json);
    let launcher = registry.get(&config.trace.launcher).context("Failed to select launcher")?;
    let options = trace_options(config, timeout_minutes, keep_logs, args);
    if let Some(timeout) = options.timeout {
        tracing::info!("process run will time out in {} minutes", timeout.as_secs() / 60);
    }

    let session = TraceSession { launcher, analysis: &config.analysis, options };
    let report = session.run(&script_path).with_context(|| {
        format!("Failed to trace {} with launcher '{}'", script_path.display(), launcher.name())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

/// Merge CLI overrides into the configured trace options.
pub fn trace_options(
    config: &HinterConfig,
    timeout_minutes: Option<u64>,
    keep_logs: bool,
    args: Vec<String>,
) -> TraceOptions {
    let timeout = match timeout_minutes {
        Some(0) => None,
        Some(minutes) => Some(Duration::from_secs(minutes.saturating_mul(60))),
        None => config.trace.timeout(),
    };
    TraceOptions {
        timeout,
        poll_interval: config.trace.poll_interval(),
        keep_logs: keep_logs || config.trace.keep_logs,
        args,
        session_id: None,
    }
}

fn print_report(report: &TraceReport) {
    println!("Traced script: {}", report.script.display());
    if let Some(hash) = &report.script_sha256 {
        println!("  SHA-256: {hash}");
    }
    let outcome = match &report.outcome {
        TraceOutcome::Exited { code: Some(code) } => format!("exited with code {code}"),
        TraceOutcome::Exited { code: None } => "terminated by signal".to_string(),
        TraceOutcome::TimedOut { after_secs } => format!("timed out after {after_secs}s"),
        TraceOutcome::Failed { message } => format!("failed: {message}"),
    };
    println!("  Outcome: {outcome}");
    println!("  Log fragments: {}", report.fragments);
    println!("  Calls: {}", report.calls);
    println!("  Files: {}", report.files);
    println!("  Hints: {}", report.artifact.display());
}
