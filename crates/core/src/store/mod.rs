//! Persistence for everything a trace session touches on disk.
//!
//! - `TraceLayout`: computed paths of the shim, per-process logs, the
//!   consolidated log and the hints artifact for one traced script.
//! - `ArtifactTag`: interpreter version/platform tag carried in artifact names.
//! - `HinterConfig`: serializable tool configuration (YAML or JSON).
//! - Read/write helpers for the accept-list artifact.

pub mod config;
pub mod layout;
pub mod util;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::AcceptList;

pub use config::{
    AdvisorConfig, AlwaysKeepRule, AnalysisConfig, ConfigError, HinterConfig, PolicyConfig,
    TraceConfig,
};
pub use layout::{ArtifactTag, TraceLayout};
pub use util::{remove_if_exists, sha256_file};

/// Error type for reading and writing the hints artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Cannot load hints file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not the expected `{"calls": [...], "files": [...]}` object.
    #[error("Cannot parse hints file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot write hints file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize hints: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load the accept-list artifact written by a trace session.
pub fn read_accept_list(path: &Path) -> Result<AcceptList, ArtifactError> {
    let body = fs::read_to_string(path)
        .map_err(|source| ArtifactError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&body)
        .map_err(|source| ArtifactError::Parse { path: path.to_path_buf(), source })
}

/// Write the accept-list artifact (compact JSON, both keys always present).
pub fn write_accept_list(path: &Path, accept_list: &AcceptList) -> Result<(), ArtifactError> {
    let body = serde_json::to_string(accept_list)?;
    fs::write(path, body).map_err(|source| ArtifactError::Write { path: path.to_path_buf(), source })
}
