//! Resource types of the Huawei Cloud provider
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Attribute mappings between resource attributes and API fields
//! - Helpers shared by the handlers (request bodies, tag calls)

pub mod dcs_instance;
pub mod ims_image;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value as JsonValue, json};
use stratus_core::differ::changed_attributes;
use stratus_core::jsonpath::path_search;
use stratus_core::provider::{ProviderError, ProviderResult, ResourceType};
use stratus_core::resource::{Resource, ResourceId, State, Timeouts, Value};
use stratus_core::tags::{TagPatch, Tags, tags_from_list, tags_to_list};
use stratus_core::transport::{Method, RequestOptions, Transport, TransportResult};

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $description:expr, $create:expr, $update:expr, $delete:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn description(&self) -> &'static str {
                $description
            }
            fn timeouts(&self) -> Timeouts {
                Timeouts {
                    create: Duration::from_secs($create * 60),
                    update: Duration::from_secs($update * 60),
                    delete: Duration::from_secs($delete * 60),
                }
            }
        }
    };
}

define_resource_type!(
    DcsInstanceType,
    "dcs_instance",
    "Distributed cache (Redis/Memcached) instance",
    120,
    120,
    15
);
define_resource_type!(
    ImsImageType,
    "ims_image",
    "Private image imported from an OBS image file",
    20,
    10,
    10
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(DcsInstanceType), Box::new(ImsImageType)]
}

/// Look up a resource type by name
pub fn resource_type(name: &str) -> Option<Box<dyn ResourceType>> {
    resource_types().into_iter().find(|t| t.name() == name)
}

// =============================================================================
// Resource Configuration
// =============================================================================

/// Attribute mapping: (attribute, request_field, response_path, required_for_create)
///
/// An empty `response_path` marks a write-only attribute.
pub type AttrMapping = (&'static str, &'static str, &'static str, bool);

/// Resource type configuration
pub struct ResourceConfig {
    /// Service the resource lives in (e.g., "dcs")
    pub service: &'static str,
    /// Attributes sent on create
    pub attributes: &'static [AttrMapping],
    /// Read-only attributes: (attribute, response_path)
    pub computed: &'static [(&'static str, &'static str)],
    /// Attributes that can change without replacing the resource
    pub updatable: &'static [&'static str],
    /// Whether this resource type uses tags
    pub has_tags: bool,
}

/// Build a create request body from the resource's attributes
pub fn build_body(
    config: &ResourceConfig,
    resource: &Resource,
) -> ProviderResult<Map<String, JsonValue>> {
    let mut body = Map::new();
    let mut missing = Vec::new();

    for (attr, field, _, required) in config.attributes {
        match resource.attributes.get(*attr) {
            Some(value) => {
                body.insert(field.to_string(), value.to_json());
            }
            None if *required => missing.push(*attr),
            None => {}
        }
    }

    if !missing.is_empty() {
        return Err(ProviderError::new(format!(
            "Missing required attributes: {}",
            missing.join(", ")
        ))
        .for_resource(resource.id.clone()));
    }

    Ok(body)
}

/// Extract attributes from an API object
pub fn read_attributes(config: &ResourceConfig, object: &JsonValue) -> HashMap<String, Value> {
    let mapped = config
        .attributes
        .iter()
        .filter(|(_, _, path, _)| !path.is_empty())
        .map(|(attr, _, path, _)| (*attr, *path));

    mapped
        .chain(config.computed.iter().copied())
        .filter_map(|(attr, path)| {
            let value = path_search(path, object).and_then(Value::from_json)?;
            Some((attr.to_string(), value))
        })
        .collect()
}

/// Request field of an attribute
pub fn request_field(config: &ResourceConfig, attr: &str) -> Option<&'static str> {
    config
        .attributes
        .iter()
        .find(|(name, ..)| *name == attr)
        .map(|(_, field, ..)| *field)
}

/// Response path of an attribute, `None` for write-only attributes
pub fn response_path(config: &ResourceConfig, attr: &str) -> Option<&'static str> {
    config
        .attributes
        .iter()
        .find(|(name, ..)| *name == attr)
        .map(|(_, _, path, _)| *path)
        .filter(|path| !path.is_empty())
}

/// Attributes changed between `from` and `to`, split into updatable and not
pub fn plan_update(
    config: &ResourceConfig,
    from: &State,
    to: &Resource,
) -> ProviderResult<Vec<String>> {
    let mut changed = changed_attributes(&to.attributes, &from.attributes);
    // Dropping every tag leaves no "tags" key in the desired attributes
    if config.has_tags
        && from.attributes.contains_key("tags")
        && !to.attributes.contains_key("tags")
    {
        changed.push("tags".to_string());
    }
    let fixed: Vec<&str> = changed
        .iter()
        .map(String::as_str)
        .filter(|attr| *attr != "tags" && !config.updatable.iter().any(|u| u == attr))
        .collect();

    if !fixed.is_empty() {
        return Err(ProviderError::new(format!(
            "Attributes cannot be updated in place: {}",
            fixed.join(", ")
        ))
        .for_resource(to.id.clone()));
    }

    Ok(changed)
}

/// Error mapper attaching `id` to a transport or wait error
pub fn resource_err<E: Into<ProviderError>>(
    id: &ResourceId,
) -> impl FnOnce(E) -> ProviderError + '_ {
    move |e| e.into().for_resource(id.clone())
}

pub fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

// =============================================================================
// Tag Helpers
// =============================================================================

/// Read the tags of a resource from a `{"tags": [{"key", "value"}]}` endpoint
pub async fn read_tags(
    transport: &dyn Transport,
    service: &str,
    path: &str,
) -> TransportResult<Tags> {
    let body = transport
        .request(service, Method::Get, path, RequestOptions::new())
        .await?;
    Ok(body.get("tags").map(tags_from_list).unwrap_or_default())
}

/// Apply a tag patch through a batch `tags/action` endpoint: delete, then create
pub async fn apply_tag_patch(
    transport: &dyn Transport,
    service: &str,
    path: &str,
    patch: &TagPatch,
) -> TransportResult<()> {
    for (action, tags) in [("delete", &patch.remove), ("create", &patch.create)] {
        if tags.is_empty() {
            continue;
        }
        let body = json!({"action": action, "tags": tags_to_list(tags)});
        transport
            .request(
                service,
                Method::Post,
                path,
                RequestOptions::new().with_body(body),
            )
            .await?;
    }
    Ok(())
}
