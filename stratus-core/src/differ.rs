//! Differ - Compare desired state with current state
//!
//! Handlers use the result to decide whether a resource must be created,
//! which attributes an update has to send, or whether nothing needs doing.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Keys of `desired` whose value differs from `current`, sorted.
///
/// Attributes only present in `current` (computed by the cloud) are ignored,
/// as are internal attributes starting with `_`.
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    changed.sort();
    changed
}
