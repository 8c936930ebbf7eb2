use std::collections::BTreeSet;
use std::io::BufRead;

use tracing::{debug, warn};

use crate::analysis::reduce::reduce;
use crate::analysis::{EventReader, Normalizer, TraceError, TraceResult};
use crate::model::{AcceptList, CallEntry, TraceRecord, BUILT_IN, MAIN_MODULE, WILDCARD_SUFFIX};
use crate::store::config::AnalysisConfig;

/// A CALL record whose RESULT/EXCEPTION has not been read yet.
#[derive(Debug, Clone)]
struct OpenCall {
    depth: u32,
    name: String,
    from_list: Option<Vec<String>>,
    line: usize,
}

impl OpenCall {
    fn describe(&self) -> String {
        TraceRecord::Call {
            depth: self.depth,
            name: self.name.clone(),
            from_list: self.from_list.clone(),
        }
        .to_string()
    }
}

/// Rebuilds the CALL/RESULT bracket structure of a trace and collects every
/// genuinely imported name together with its normalized file.
///
/// Open calls live on an explicit stack indexed by depth, so nesting depth is
/// bounded by the heap rather than the native call stack. Nested calls are
/// fully resolved before the enclosing call's outcome is processed.
pub struct CallAnalyzer {
    normalizer: Normalizer,
    accept_always: Vec<String>,
    partial: bool,
    calls: Vec<CallEntry>,
    files: Vec<String>,
}

impl CallAnalyzer {
    pub fn new(normalizer: Normalizer, accept_always: Vec<String>) -> Self {
        Self { normalizer, accept_always, partial: false, calls: Vec::new(), files: Vec::new() }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        let normalizer = Normalizer::new(config.shared_library_suffixes.clone())
            .with_search_paths(config.search_paths.clone());
        Self::new(normalizer, config.accept_always.clone())
    }

    /// Tolerate calls left open at end-of-stream (killed or timed-out trace).
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Raw call list accumulated so far (not deduplicated).
    pub fn calls(&self) -> &[CallEntry] {
        &self.calls
    }

    /// Raw file list accumulated so far (not deduplicated).
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Consume every record of `reader`.
    pub fn analyze<R: BufRead>(&mut self, reader: &mut EventReader<R>) -> TraceResult<()> {
        let mut stack: Vec<OpenCall> = Vec::new();

        while let Some(record) = reader.read()? {
            let line = reader.line_number();
            match record {
                TraceRecord::Call { depth, name, from_list } => {
                    if let Some(parent_depth) = stack.last().map(|open| open.depth) {
                        // Partial traces are concatenated per process; a call that
                        // is not nested under the open one starts the next fragment.
                        if self.partial && depth <= parent_depth {
                            warn!(
                                line,
                                open_calls = stack.len(),
                                first_line = stack[0].line,
                                "discarding calls left open by a truncated fragment"
                            );
                            stack.clear();
                        } else if depth != parent_depth + 1 {
                            let call = TraceRecord::Call { depth, name, from_list };
                            return Err(TraceError::DepthMismatch {
                                line,
                                expected: parent_depth + 1,
                                found: depth,
                                content: call.to_string(),
                            });
                        }
                    }
                    stack.push(OpenCall { depth, name, from_list, line });
                }
                closing => {
                    let open = stack.pop().ok_or_else(|| TraceError::UnmatchedClose {
                        line,
                        content: closing.to_string(),
                    })?;
                    if closing.depth() != open.depth {
                        return Err(TraceError::DepthMismatch {
                            line,
                            expected: open.depth,
                            found: closing.depth(),
                            content: closing.to_string(),
                        });
                    }
                    self.close(line, &open, closing)?;
                }
            }
        }

        if let Some(open) = stack.last() {
            if !self.partial {
                return Err(TraceError::UnexpectedEof {
                    line: reader.line_number(),
                    call: open.describe(),
                });
            }
            warn!(
                open_calls = stack.len(),
                first_line = stack[0].line,
                "discarding calls left open by a partial trace"
            );
        }
        Ok(())
    }

    fn close(&mut self, line: usize, open: &OpenCall, closing: TraceRecord) -> TraceResult<()> {
        let (module, source) = match closing {
            TraceRecord::Result { module, source, .. } => (module, source),
            // A failed import contributes nothing; its children are already recorded.
            _ => return Ok(()),
        };
        if module == MAIN_MODULE || source == BUILT_IN {
            return Ok(());
        }

        let source = self.normalizer.substitute_source(&module, &source);
        let file = self.normalizer.normalize(line, &source)?;
        self.push_file(line, &file);
        self.push_call(line, module.clone(), &file);

        // Members of compiled extensions and opaque packages cannot be traced.
        if self.normalizer.is_shared_library(&source) || self.accept_always.contains(&file) {
            self.push_call(line, format!("{module}{WILDCARD_SUFFIX}"), &file);
            return Ok(());
        }

        for name in reconcile_names(&open.name, &module, open.from_list.as_deref()) {
            self.push_call(line, name, &file);
        }
        Ok(())
    }

    fn push_call(&mut self, line: usize, name: String, file: &str) {
        debug!(line, call = %name, "call");
        self.calls.push(CallEntry::new(name, file));
    }

    fn push_file(&mut self, line: usize, file: &str) {
        debug!(line, file, "file");
        self.files.push(file.to_string());
    }

    /// Deduplicate and reduce into the persisted artifact shape.
    ///
    /// Entries produced by `excluded_file` (the tracing shim) are dropped.
    pub fn into_accept_list(self, excluded_file: Option<&str>) -> AcceptList {
        let keep = |file: &str| excluded_file.map_or(true, |excluded| file != excluded);

        let files: BTreeSet<String> = self.files.into_iter().filter(|f| keep(f)).collect();
        let calls = self.calls.into_iter().filter(|c| keep(&c.file)).map(|c| c.name);
        let reduction = reduce(calls);

        AcceptList::new(reduction.calls, files.into_iter().collect())
    }
}

/// Names implied by a CALL (`called`, `from_list`) that resolved to `resolved`.
///
/// The resolved name itself is not part of the output; callers record it
/// separately. Rules, first match wins:
/// - empty `called`: every from-list item qualified under `resolved`;
/// - one name contains the other as prefix or suffix: without a from-list the
///   requested name (when it differs), otherwise every item qualified under
///   the true module name;
/// - unrelated names: `resolved.called`, plus every item qualified under it.
pub fn reconcile_names(called: &str, resolved: &str, from_list: Option<&[String]>) -> Vec<String> {
    let items = from_list.filter(|items| !items.is_empty());

    if called.is_empty() {
        return items.map(|items| qualify(resolved, items)).unwrap_or_default();
    }

    let related = called.starts_with(resolved)
        || resolved.starts_with(called)
        || resolved.ends_with(called)
        || called.ends_with(resolved);

    if related {
        return match items {
            None if called != resolved => vec![called.to_string()],
            None => Vec::new(),
            Some(items) => qualify(true_module_name(called, resolved), items),
        };
    }

    let attribute = format!("{resolved}.{called}");
    let mut out = items.map(|items| qualify(&attribute, items)).unwrap_or_default();
    out.insert(0, attribute);
    out
}

/// The resolved name wins unless the requested name is the more specific one,
/// i.e. it merely ends with the resolved name.
fn true_module_name<'a>(called: &'a str, resolved: &'a str) -> &'a str {
    if resolved.starts_with(called) || resolved.ends_with(called) || called.starts_with(resolved) {
        resolved
    } else {
        called
    }
}

fn qualify(base: &str, items: &[String]) -> Vec<String> {
    items.iter().map(|item| format!("{base}.{item}")).collect()
}
