use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::model::WILDCARD_SUFFIX;

/// Outcome of shrinking a call list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    /// Sorted, deduplicated, wildcard-collapsed call names.
    pub calls: Vec<String>,
    /// How many distinct input names were redundant.
    pub removed: usize,
}

/// Shrink `calls` to the smallest list with the same accept/reject verdicts.
///
/// The input is sorted and deduplicated first, so the result depends on the
/// input set only. Pass one drops every name covered by an earlier `x.*`
/// entry; pass two drops `x` when `x.*` survived.
pub fn reduce<I>(calls: I) -> Reduction
where
    I: IntoIterator<Item = String>,
{
    let sorted: BTreeSet<String> = calls.into_iter().collect();
    let total = sorted.len();

    let mut kept: Vec<String> = Vec::with_capacity(total);
    let mut covered: Option<String> = None;
    for name in sorted {
        if covered.as_deref().is_some_and(|prefix| name.starts_with(prefix)) {
            continue;
        }
        if let Some(prefix) = name.strip_suffix('*') {
            if name.ends_with(WILDCARD_SUFFIX) {
                covered = Some(prefix.to_string());
            }
        }
        kept.push(name);
    }

    let wildcards: HashSet<String> =
        kept.iter().filter(|name| name.ends_with(WILDCARD_SUFFIX)).cloned().collect();
    kept.retain(|name| !wildcards.contains(&format!("{name}{WILDCARD_SUFFIX}")));

    let removed = total - kept.len();
    info!(removed, remaining = kept.len(), "call cleaning removed {removed} items");
    Reduction { calls: kept, removed }
}
