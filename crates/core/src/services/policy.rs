use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{AcceptList, Decision, ModuleDescriptor, Verdict, MAIN_MODULE, WILDCARD_SUFFIX};
use crate::store::config::{AdvisorConfig, AlwaysKeepRule, PolicyConfig};
use crate::store::{read_accept_list, ArtifactError};

/// Top-level packages of testing frameworks, dropped unless tests are accepted.
pub const TEST_PACKAGES: [&str; 3] = ["pytest", "_pytest", "unittest"];

/// Top-level package the policy never has an opinion on.
const ABSTAIN_PACKAGE: &str = "pkg_resources";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Hints file {0} is needed; create it with `hinter trace` on the script first")]
    MissingHints(PathBuf),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// A delegate consulted before the hints. `None` means no opinion.
pub trait Advisor {
    fn name(&self) -> &str;
    fn try_decide(&self, module: &ModuleDescriptor) -> Option<Verdict>;
}

/// Advisor driven by keep/drop name prefixes (`a.b` matches `a.b` and `a.b.c`).
#[derive(Debug, Clone)]
pub struct RuleAdvisor {
    name: String,
    keep: Vec<String>,
    drop: Vec<String>,
}

impl RuleAdvisor {
    pub fn new(name: impl Into<String>, keep: Vec<String>, drop: Vec<String>) -> Self {
        Self { name: name.into(), keep, drop }
    }

    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self::new(config.name.clone(), config.keep.clone(), config.drop.clone())
    }
}

impl Advisor for RuleAdvisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_decide(&self, module: &ModuleDescriptor) -> Option<Verdict> {
        let covers = |prefix: &String| is_within(&module.name, prefix);
        if self.drop.iter().any(covers) {
            Some(Verdict::Drop)
        } else if self.keep.iter().any(covers) {
            Some(Verdict::Keep)
        } else {
            None
        }
    }
}

/// Knowledge about modules a package imports without a visible import statement.
pub trait ImplicitImports {
    /// Full names implicitly imported by `package`, whose files live under `package_dir`.
    fn imports_by_fullname(&self, package: &str, package_dir: &Path) -> Vec<String>;
}

/// Implicit imports from a fixed table (package name -> imported full names).
#[derive(Debug, Clone, Default)]
pub struct StaticImplicitImports {
    table: BTreeMap<String, Vec<String>>,
}

impl StaticImplicitImports {
    pub fn new(table: BTreeMap<String, Vec<String>>) -> Self {
        Self { table }
    }
}

impl ImplicitImports for StaticImplicitImports {
    fn imports_by_fullname(&self, package: &str, _package_dir: &Path) -> Vec<String> {
        self.table.get(package).cloned().unwrap_or_default()
    }
}

/// Answers keep/drop for every module the builder encounters.
///
/// Decisions consult, in order: the ignored cache, the testing-framework
/// filter, the implicit-imports cache, advisors, always-keep rules, the
/// hinted calls, the hinted files and finally the implicit-import resolver.
/// Both caches live as long as the policy.
pub struct InclusionPolicy {
    calls: HashSet<String>,
    accept_list: AcceptList,
    accept_test: bool,
    always_keep: Vec<AlwaysKeepRule>,
    message_limit: usize,
    advisors: Vec<Box<dyn Advisor>>,
    implicit_resolver: Box<dyn ImplicitImports>,
    ignored: HashSet<String>,
    implicit: HashSet<String>,
    message_counts: HashMap<String, usize>,
}

impl InclusionPolicy {
    pub fn new(mut accept_list: AcceptList, config: &PolicyConfig) -> Self {
        prune_unused_matplotlib(&mut accept_list);
        let advisors = config
            .advisors
            .iter()
            .map(|advisor| Box::new(RuleAdvisor::from_config(advisor)) as Box<dyn Advisor>)
            .collect();
        Self {
            calls: accept_list.calls.iter().cloned().collect(),
            accept_list,
            accept_test: config.accept_test,
            always_keep: config.always_keep.clone(),
            message_limit: config.message_limit,
            advisors,
            implicit_resolver: Box::new(StaticImplicitImports::new(
                config.implicit_imports.clone(),
            )),
            ignored: HashSet::new(),
            implicit: HashSet::new(),
            message_counts: HashMap::new(),
        }
    }

    /// Load the hints artifact at `path`. Fails fast: there is no safe default.
    pub fn from_artifact(path: &Path, config: &PolicyConfig) -> Result<Self, PolicyError> {
        if !path.is_file() {
            return Err(PolicyError::MissingHints(path.to_path_buf()));
        }
        let accept_list = read_accept_list(path)?;
        info!(
            calls = accept_list.calls.len(),
            files = accept_list.files.len(),
            "loaded hints from {}",
            path.display()
        );
        Ok(Self::new(accept_list, config))
    }

    /// Register another advisor after the configured ones.
    pub fn with_advisor(mut self, advisor: Box<dyn Advisor>) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn with_implicit_imports(mut self, resolver: Box<dyn ImplicitImports>) -> Self {
        self.implicit_resolver = resolver;
        self
    }

    /// The accept-list after load-time cleanup.
    pub fn accept_list(&self) -> &AcceptList {
        &self.accept_list
    }

    /// Files the builder should follow into.
    pub fn recursion_targets(&self) -> Vec<String> {
        recursion_targets(&self.accept_list.files, self.accept_test)
    }

    /// Builder plugins the hinted calls call for.
    pub fn recommended_plugins(&self, windows: bool) -> Vec<PluginActivation> {
        recommended_plugins(&self.accept_list.calls, windows)
    }

    /// Extra imports of `module_name`: the main module needs every recursed-to
    /// matplotlib backend.
    pub fn implicit_imports_of(&self, module_name: &str) -> Vec<String> {
        if module_name != MAIN_MODULE {
            return Vec::new();
        }
        self.recursion_targets()
            .into_iter()
            .filter(|file| file.starts_with("matplotlib.backends"))
            .collect()
    }

    /// Keep, drop, or abstain (`None`) for one candidate module.
    pub fn decide(&mut self, module: &ModuleDescriptor) -> Option<Decision> {
        let full_name = module.name.as_str();
        let top_level = module.top_level_package();

        if top_level == ABSTAIN_PACKAGE {
            return None;
        }

        if self.ignored.contains(full_name) || self.ignored.contains(top_level) {
            let reason = "module is not used";
            debug!(module = full_name, reason, "drop (cached)");
            return Some(Decision::drop(reason));
        }

        if !self.accept_test && TEST_PACKAGES.contains(&top_level) {
            return Some(self.drop(module, "suppress testing components"));
        }

        if self.implicit.contains(full_name) {
            return Some(Decision::keep("module is an implicit import"));
        }

        if let Some(decision) = self.ask_advisors(module) {
            return Some(decision);
        }

        if let Some(rule) = self.always_keep.iter().find(|rule| rule.matches(full_name, top_level)) {
            return Some(Decision::keep(rule.reason.clone()));
        }

        if get_checklist(full_name).iter().any(|name| self.calls.contains(name)) {
            return Some(Decision::keep("module is hinted to"));
        }

        if is_parent_of_any(full_name, &self.accept_list.files) {
            return Some(Decision::keep("parent of recursed-to module"));
        }

        if let Some(package) = module.package.as_deref() {
            let dir = package_dir(&module.filename, top_level);
            let known = self.implicit_resolver.imports_by_fullname(package, &dir);
            if known.iter().any(|name| name == full_name) {
                debug!(module = full_name, package, absorbed = known.len(), "implicit import");
                self.implicit.extend(known);
                return Some(Decision::keep("module is an implicit import"));
            }
        }

        Some(self.drop(module, "module is not used"))
    }

    fn ask_advisors(&mut self, module: &ModuleDescriptor) -> Option<Decision> {
        let (plugin, verdict) = self
            .advisors
            .iter()
            .find_map(|advisor| advisor.try_decide(module).map(|v| (advisor.name().to_string(), v)))?;

        match verdict {
            Verdict::Keep => {
                self.implicit.insert(module.name.clone());
                let count = self.message_counts.entry(plugin.clone()).or_insert(0);
                if *count < self.message_limit {
                    info!(module = %module.name, plugin = %plugin, "keep {} (plugin '{}')", module.name, plugin);
                } else if *count == self.message_limit {
                    info!(plugin = %plugin, "... 'keep' msg limit exceeded for '{}'", plugin);
                }
                *count += 1;
                Some(Decision::keep("module is imported"))
            }
            Verdict::Drop => {
                self.ignored.insert(module.name.clone());
                info!(module = %module.name, plugin = %plugin, "drop {} (plugin '{}')", module.name, plugin);
                Some(Decision::drop(format!("dropped by plugin {plugin}")))
            }
        }
    }

    fn drop(&mut self, module: &ModuleDescriptor, reason: &str) -> Decision {
        info!(module = %module.name, reason, "{}", drop_message(module));
        self.ignored.insert(module.name.clone());
        Decision::drop(reason)
    }
}

/// `"drop a.b (in a)"`, or `"drop a"` for top-level modules.
pub fn drop_message(module: &ModuleDescriptor) -> String {
    match &module.package {
        Some(package) => format!("drop {} (in {})", module.name, package),
        None => format!("drop {}", module.name),
    }
}

/// Names whose presence in the calls accepts `full_name`: the name itself,
/// then every ancestor wildcard from least to most specific.
///
/// `a.b.c` yields `["a.b.c", "a.*", "a.b.*", "a.b.c.*"]`.
pub fn get_checklist(full_name: &str) -> Vec<String> {
    if full_name.is_empty() {
        return Vec::new();
    }
    let mut checklist = vec![full_name.to_string()];
    let mut prefix = String::new();
    for part in full_name.split('.') {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(part);
        checklist.push(format!("{prefix}{WILDCARD_SUFFIX}"));
    }
    checklist
}

/// Whether `full_name` is a strict parent package of any entry in `files`.
pub fn is_parent_of_any(full_name: &str, files: &[String]) -> bool {
    let search = format!("{full_name}.");
    files.iter().any(|file| file.starts_with(&search))
}

/// `filename` truncated right after the first occurrence of `top_level`.
pub fn package_dir(filename: &Path, top_level: &str) -> PathBuf {
    let text = filename.to_string_lossy();
    match text.find(top_level) {
        Some(start) if !top_level.is_empty() => PathBuf::from(&text[..start + top_level.len()]),
        _ => filename.to_path_buf(),
    }
}

/// Drop every matplotlib reference when no matplotlib backend was traced.
pub fn prune_unused_matplotlib(accept_list: &mut AcceptList) {
    if accept_list.files.iter().any(|f| f == "matplotlib.backends") {
        return;
    }
    let unused = |name: &String| name.starts_with("matplotlib") || name.starts_with("mpl_toolkits");
    let before = accept_list.calls.len() + accept_list.files.len();
    accept_list.calls.retain(|c| !unused(c));
    accept_list.files.retain(|f| !unused(f));
    let removed = before - accept_list.calls.len() - accept_list.files.len();
    if removed > 0 {
        debug!(removed, "no matplotlib backend traced; removed matplotlib entries");
    }
}

/// `files` minus testing frameworks unless `accept_test`.
pub fn recursion_targets(files: &[String], accept_test: bool) -> Vec<String> {
    files
        .iter()
        .filter(|file| accept_test || !TEST_PACKAGES.iter().any(|p| file.starts_with(p)))
        .cloned()
        .collect()
}

/// A standard builder plugin to enable, with its boolean options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginActivation {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, bool>,
}

impl PluginActivation {
    fn plain(name: &str) -> Self {
        Self { name: name.to_string(), options: BTreeMap::new() }
    }
}

/// Standard builder plugins implied by the hinted calls, in activation order.
pub fn recommended_plugins(calls: &[String], windows: bool) -> Vec<PluginActivation> {
    let hit = |names: &[&str]| {
        calls.iter().any(|call| {
            names
                .iter()
                .any(|name| call == name || *call == format!("{name}{WILDCARD_SUFFIX}"))
        })
    };

    let mut plugins = Vec::new();
    if hit(&["numpy"]) {
        let mut options = BTreeMap::new();
        options.insert("include_matplotlib".to_string(), hit(&["matplotlib"]));
        options.insert("include_scipy".to_string(), hit(&["scipy"]));
        plugins.push(PluginActivation { name: "numpy".to_string(), options });
    }
    if hit(&["tkinter", "Tkinter"]) {
        plugins.push(PluginActivation::plain("tk-inter"));
    }
    if calls.iter().any(|call| call.starts_with("PyQt") || call.starts_with("PySide")) {
        plugins.push(PluginActivation::plain("qt-plugins"));
    }
    if windows && hit(&["multiprocessing"]) {
        plugins.push(PluginActivation::plain("multiprocessing"));
    }
    if hit(&["Pmw"]) {
        plugins.push(PluginActivation::plain("pmw-freezer"));
    }
    if calls.iter().any(|call| call == "torch") {
        plugins.push(PluginActivation::plain("torch"));
    }
    if hit(&["tensorflow"]) {
        plugins.push(PluginActivation::plain("tensorflow"));
    }
    if hit(&["gevent"]) {
        plugins.push(PluginActivation::plain("gevent"));
    }
    if hit(&["eventlet"]) {
        plugins.push(PluginActivation::plain("eventlet"));
    }
    if hit(&["dill"]) {
        plugins.push(PluginActivation::plain("dill-compat"));
    }
    plugins
}

fn is_within(name: &str, prefix: &str) -> bool {
    name == prefix || name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
}
