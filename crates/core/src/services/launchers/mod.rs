use std::path::PathBuf;

use crate::services::tracer::LauncherRegistry;

#[cfg(feature = "python-launcher")]
pub mod python;

#[cfg(feature = "python-launcher")]
pub use python::{ChildProcess, PythonLauncher};

/// Registry populated with every launcher compiled into this build.
///
/// Launchers run `interpreter`; `quiet` discards the traced program's stdout.
pub fn default_launcher_registry(interpreter: impl Into<PathBuf>, quiet: bool) -> LauncherRegistry {
    let mut registry = LauncherRegistry::new();
    #[cfg(feature = "python-launcher")]
    {
        registry.register(PythonLauncher::new(interpreter).quiet(quiet));
    }
    #[cfg(not(feature = "python-launcher"))]
    {
        let _ = (interpreter.into(), quiet);
    }
    registry
}
