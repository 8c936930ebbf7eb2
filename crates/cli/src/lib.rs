pub mod commands;
pub mod logging;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hinter_core::store::HinterConfig;

/// Canonicalize `path` if possible, falling back to it joined onto the
/// current working directory.
pub fn canonicalize_or_current(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    if candidate == Path::new(".") {
        return env::current_dir().context("Failed to get current directory");
    }
    match candidate.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => {
            let cwd = env::current_dir().context("Failed to get current directory")?;
            Ok(cwd.join(candidate))
        }
    }
}

/// Load the tool configuration: `--config` when given, else a config file in
/// the working directory, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<HinterConfig> {
    let cwd = env::current_dir().context("Failed to get current directory")?;
    HinterConfig::load_or_default(path, &cwd).context("Failed to load configuration")
}
