use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hinter_core::model::{ModuleDescriptor, ModuleKind};
use hinter_core::services::InclusionPolicy;
use hinter_core::store::HinterConfig;
use serde::Serialize;

/// One answered query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRow {
    pub module: String,
    /// `keep`, `drop` or `abstain`.
    pub verdict: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Answer keep/drop/abstain for each module against the hints at `hints`.
///
/// When `modules` is empty, queries are read from stdin, one per line. The
/// policy's caches persist across the whole batch.
pub fn decide_command(
    config: &HinterConfig,
    hints: &str,
    modules: Vec<String>,
    json: bool,
) -> Result<Vec<DecisionRow>> {
    let mut policy = InclusionPolicy::from_artifact(Path::new(hints), &config.policy)
        .with_context(|| format!("Failed to initialize inclusion policy from {hints}"))?;

    let lines = if modules.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Failed to read module queries from stdin")?
    } else {
        modules
    };
    let queries = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_module_line(line))
        .collect::<Result<Vec<_>>>()?;

    let rows = decide_modules(&mut policy, &queries);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            match &row.reason {
                Some(reason) => println!("{:<7} {} ({reason})", row.verdict, row.module),
                None => println!("{:<7} {}", row.verdict, row.module),
            }
        }
    }
    Ok(rows)
}

/// Run every query through `policy` in order.
pub fn decide_modules(policy: &mut InclusionPolicy, modules: &[ModuleDescriptor]) -> Vec<DecisionRow> {
    modules
        .iter()
        .map(|module| match policy.decide(module) {
            Some(decision) => DecisionRow {
                module: module.name.clone(),
                verdict: decision.verdict.as_str().to_string(),
                reason: Some(decision.reason),
            },
            None => DecisionRow {
                module: module.name.clone(),
                verdict: "abstain".to_string(),
                reason: None,
            },
        })
        .collect()
}

/// Parse `name[<TAB>filename[<TAB>kind]]`; kind is `py` or `shlib`.
pub fn parse_module_line(line: &str) -> Result<ModuleDescriptor> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
    let name = fields.next().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(anyhow!("Empty module name in query: {line:?}"));
    }
    let mut module = ModuleDescriptor::from_name(name);
    if let Some(filename) = fields.next().filter(|f| !f.is_empty()) {
        module = module.with_filename(filename);
    }
    if let Some(kind) = fields.next().filter(|k| !k.is_empty()) {
        let kind = ModuleKind::parse(kind)
            .ok_or_else(|| anyhow!("Unknown module kind '{kind}'. Allowed: py, shlib"))?;
        module = module.with_kind(kind);
    }
    Ok(module)
}
