use anyhow::{anyhow, Context, Result};
use hinter_core::services::default_launcher_registry;
use hinter_core::store::{HinterConfig, TraceLayout};

use crate::canonicalize_or_current;

/// Print the builder options for a hinted standalone build of `script`.
///
/// The hints artifact for the current interpreter must already exist.
pub fn plan_command(
    config: &HinterConfig,
    script: &str,
    plugin: Option<&str>,
    json: bool,
) -> Result<Vec<String>> {
    let script_path = canonicalize_or_current(script)?;
    if !script_path.is_file() {
        return Err(anyhow!("No such file: {}", script_path.display()));
    }
    let registry = default_launcher_registry(config.interpreter(), true);
    let launcher = registry.get(&config.trace.launcher).context("Failed to select launcher")?;
    let tag = launcher.artifact_tag().context("Failed to determine interpreter tag")?;
    let layout = TraceLayout::new(&script_path, "");
    let artifact = layout.artifact_path(&tag);
    if !artifact.is_file() {
        return Err(anyhow!(
            "File '{}' is needed for this compilation. Create it by running 'hinter trace {}'",
            artifact.display(),
            script
        ));
    }
    let plugin = plugin.map(canonicalize_or_current).transpose()?;
    let args = layout.builder_arguments(&artifact, plugin.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&args)?);
    } else {
        println!("Builder options for {}:", script_path.display());
        for arg in &args {
            println!("  {arg}");
        }
    }
    Ok(args)
}
