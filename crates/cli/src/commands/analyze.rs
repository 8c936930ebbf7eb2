use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hinter_core::analysis::analyze_log;
use hinter_core::model::AcceptList;
use hinter_core::store::{write_accept_list, HinterConfig};

use crate::canonicalize_or_current;

/// Reduce an existing trace log to a hints artifact.
///
/// Without `output` the artifact is written next to the log with a `.json`
/// extension. Returns the artifact path.
pub fn analyze_command(
    config: &HinterConfig,
    log: &str,
    output: Option<&str>,
    partial: bool,
    json: bool,
) -> Result<PathBuf> {
    let log_path = canonicalize_or_current(log)?;
    if !log_path.is_file() {
        return Err(anyhow!("Trace log does not exist: {}", log_path.display()));
    }
    let output_path = match output {
        Some(path) => canonicalize_or_current(path)?,
        None => log_path.with_extension("json"),
    };

    let accept_list = analyze_log(&log_path, &config.analysis, partial, None)
        .with_context(|| format!("Failed to analyze trace log {}", log_path.display()))?;
    write_accept_list(&output_path, &accept_list)
        .with_context(|| format!("Failed to write hints to {}", output_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accept_list)?);
    } else {
        print_summary(&log_path, &output_path, &accept_list);
    }
    Ok(output_path)
}

fn print_summary(log: &Path, output: &Path, accept_list: &AcceptList) {
    println!("Analyzed trace: {}", log.display());
    println!("  Calls: {}", accept_list.calls.len());
    println!("  Files: {}", accept_list.files.len());
    println!("  Hints: {}", output.display());
}
