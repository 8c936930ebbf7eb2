use crate::analysis::{TraceError, TraceResult};
use crate::model::SEARCH_PATH_TOKEN;

/// Native library suffix reported by binary-wrapped pure-Python shims
/// (pythoncom, pywintypes and friends).
const NATIVE_SHIM_SUFFIX: &str = ".dll";

/// Package family whose modules report an unusable file and are pinned to
/// the package initializer instead.
const WIN32COM_PREFIX: &str = "win32com";

/// Canonicalizes source descriptors so accept-lists are portable across
/// machines, platforms and interpreter versions.
#[derive(Debug, Clone)]
pub struct Normalizer {
    shared_suffixes: Vec<String>,
    search_paths: Vec<String>,
}

impl Normalizer {
    pub fn new(shared_suffixes: Vec<String>) -> Self {
        Self { shared_suffixes, search_paths: Vec::new() }
    }

    /// Search-path entries to replace by the placeholder when a descriptor
    /// still carries an absolute root.
    pub fn with_search_paths(mut self, search_paths: Vec<String>) -> Self {
        self.search_paths = search_paths;
        self
    }

    /// Whether `source` names a compiled extension module.
    pub fn is_shared_library(&self, source: &str) -> bool {
        let lower = source.to_ascii_lowercase();
        self.shared_suffixes.iter().any(|suffix| lower.ends_with(suffix.as_str()))
    }

    /// Replace the longest search-path entry prefixing `path` with the placeholder.
    pub fn replace_search_path(&self, path: &str) -> String {
        if path.starts_with(SEARCH_PATH_TOKEN) {
            return path.to_string();
        }
        let best = self
            .search_paths
            .iter()
            .filter(|entry| !entry.is_empty() && path.starts_with(entry.as_str()))
            .max_by_key(|entry| entry.len());
        match best {
            Some(entry) => format!("{SEARCH_PATH_TOKEN}{}", &path[entry.len()..]),
            None => path.to_string(),
        }
    }

    /// Substitute a synthetic source descriptor for the binary-wrapped shim
    /// families, which report a native library as their file.
    pub fn substitute_source(&self, module: &str, source: &str) -> String {
        if module.starts_with(WIN32COM_PREFIX) {
            return format!("{SEARCH_PATH_TOKEN}\\win32com\\__init__.py");
        }
        if source.to_ascii_lowercase().ends_with(NATIVE_SHIM_SUFFIX) {
            return format!("{module}.py");
        }
        source.to_string()
    }

    /// Turn a source descriptor into a dotted package/module path.
    ///
    /// `line` is only used for diagnostics.
    pub fn normalize(&self, line: usize, source: &str) -> TraceResult<String> {
        let source = self.replace_search_path(source);
        let split_at = source.rfind(['/', '\\']).map(|idx| idx + 1).unwrap_or(0);
        let (folder, basename) = source.split_at(split_at);

        let shared_suffix = self
            .shared_suffixes
            .iter()
            .find(|suffix| basename.to_ascii_lowercase().ends_with(suffix.as_str()));
        let basename = match shared_suffix {
            Some(suffix) => strip_platform_tags(&basename[..basename.len() - suffix.len()]),
            None => basename.to_string(),
        };

        let dotted = format!("{folder}{basename}").replace(['\\', '/'], ".");
        let dotted = dotted.replace(&format!("{SEARCH_PATH_TOKEN}."), "");

        if let Some(package) = dotted.strip_suffix(".__init__.py") {
            return Ok(package.to_string());
        }
        if let Some(module) = dotted.strip_suffix(".py") {
            return Ok(module.to_string());
        }
        if shared_suffix.is_some() {
            return Ok(dotted);
        }
        Err(TraceError::UnknownModuleType { line, descriptor: source })
    }
}

/// Remove the platform/ABI tag segment from a compiled extension's stem.
///
/// A stem with more than one dot-separated segment carries a trailing tag
/// (`_ssl.cpython-311-x86_64-linux-gnu`, `foo.cp38-win_amd64`), which is
/// dropped; a single-segment stem is already the module name.
pub fn strip_platform_tags(stem: &str) -> String {
    match stem.rsplit_once('.') {
        Some((name, _tag)) => name.to_string(),
        None => stem.to_string(),
    }
}
