//! Dataset lineage resolution.

use crate::error::{ForgeError, Result};
use crate::models::DatasetRecord;
use std::collections::HashSet;
use tracing::warn;

/// Walks `parent_dataset_id` links upward from `start`.
///
/// Returns the visited datasets in order, starting with `start` itself. The
/// walk ends at a dataset without a parent, at an ancestor that no longer
/// exists, or when an id repeats, so corrupt cyclic data still terminates.
pub fn resolve_lineage<F>(start: &str, mut lookup: F) -> Result<Vec<DatasetRecord>>
where
    F: FnMut(&str) -> Result<Option<DatasetRecord>>,
{
    let first = lookup(start)?.ok_or_else(|| ForgeError::not_found("Dataset", start))?;

    let mut visited = HashSet::from([first.id.clone()]);
    let mut next = first.parent_dataset_id.clone();
    let mut chain = vec![first];

    while let Some(parent_id) = next.take() {
        if !visited.insert(parent_id.clone()) {
            warn!(dataset_id = %start, repeated = %parent_id, "Lineage cycle detected");
            break;
        }
        let Some(parent) = lookup(&parent_id)? else {
            warn!(dataset_id = %start, missing = %parent_id, "Lineage ancestor missing");
            break;
        };
        next = parent.parent_dataset_id.clone();
        chain.push(parent);
    }

    Ok(chain)
}
