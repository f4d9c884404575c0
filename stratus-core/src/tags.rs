//! Tags - Diff-and-patch helpers for resource tag maps
//!
//! Cloud tag APIs take batches of `{key, value}` pairs to delete and to
//! create. Changing a tag's value means deleting the old pair and creating
//! the new one.

use std::collections::BTreeMap;

use serde_json::json;

use crate::resource::Value;

pub type Tags = BTreeMap<String, String>;

/// Tag changes needed to go from one tag map to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPatch {
    /// Pairs to delete (removed keys and old values of changed keys)
    pub remove: Tags,
    /// Pairs to create (new keys and new values of changed keys)
    pub create: Tags,
}

impl TagPatch {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.create.is_empty()
    }
}

/// Compute the patch turning `old` into `new`
pub fn diff_tags(old: &Tags, new: &Tags) -> TagPatch {
    let remove = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let create = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    TagPatch { remove, create }
}

/// Read a tag map from an attribute value. Non-string values are skipped.
pub fn tags_from_value(value: Option<&Value>) -> Tags {
    value
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Encode tags as the `[{"key": .., "value": ..}]` list used by the APIs
pub fn tags_to_list(tags: &Tags) -> serde_json::Value {
    serde_json::Value::Array(
        tags.iter()
            .map(|(k, v)| json!({"key": k, "value": v}))
            .collect(),
    )
}

/// Decode a `[{"key": .., "value": ..}]` list
pub fn tags_from_list(list: &serde_json::Value) -> Tags {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let key = item.get("key")?.as_str()?;
                    let value = item.get("value").and_then(|v| v.as_str()).unwrap_or("");
                    Some((key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Convert tags into an attribute value
pub fn tags_to_value(tags: &Tags) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
