use std::path::Path;

use anyhow::{Context, Result};
use hinter_core::model::MAIN_MODULE;
use hinter_core::services::{InclusionPolicy, PluginActivation};
use hinter_core::store::HinterConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HintsSummary {
    pub calls: usize,
    pub files: usize,
    pub plugins: Vec<PluginActivation>,
    pub recursion_targets: Vec<String>,
    pub main_implicit_imports: Vec<String>,
}

/// Summarize what a hints artifact asks of the builder.
pub fn inspect_command(config: &HinterConfig, hints: &str, json: bool) -> Result<HintsSummary> {
    let policy = InclusionPolicy::from_artifact(Path::new(hints), &config.policy)
        .with_context(|| format!("Failed to initialize inclusion policy from {hints}"))?;

    let summary = HintsSummary {
        calls: policy.accept_list().calls.len(),
        files: policy.accept_list().files.len(),
        plugins: policy.recommended_plugins(cfg!(windows)),
        recursion_targets: policy.recursion_targets(),
        main_implicit_imports: policy.implicit_imports_of(MAIN_MODULE),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary);
    }

    println!("Hints: {hints}");
    println!("  Calls: {}", summary.calls);
    println!("  Files: {}", summary.files);
    if summary.plugins.is_empty() {
        println!("Plugins: (none)");
    } else {
        println!("Plugins:");
        for plugin in &summary.plugins {
            let options: Vec<String> =
                plugin.options.iter().map(|(key, value)| format!("{key}={value}")).collect();
            if options.is_empty() {
                println!("- {}", plugin.name);
            } else {
                println!("- {} ({})", plugin.name, options.join(", "));
            }
        }
    }
    match summary.recursion_targets.last() {
        Some(last) => println!(
            "Recursion: --recurse-to={last} and {} more modules",
            summary.recursion_targets.len() - 1
        ),
        None => println!("Recursion: (none)"),
    }
    Ok(summary)
}
