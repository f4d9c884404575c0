//! IMS image handler
//!
//! Image creation runs as an IMS job. The job's final object already holds
//! the new image ID under `entities.image_id`.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde_json::{Value as JsonValue, json};
use stratus_core::jsonpath::{path_search, path_search_str};
use stratus_core::provider::{OperationContext, ProviderError, ProviderResult, ResourceType};
use stratus_core::refresh::{COMPLETED, Observation, PENDING};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::tags::{diff_tags, tags_from_value, tags_to_list, tags_to_value};
use stratus_core::transport::{Method, RequestOptions, Transport, TransportError, TransportResult};
use stratus_core::waiter::{WaitConfig, wait};

use super::{
    ImsImageType, ResourceConfig, apply_tag_patch, build_body, plan_update, read_attributes,
    read_tags, resource_err, response_path,
};
use crate::jobs::{job_wait_config, wait_for_job};

const SERVICE: &str = "ims";
const DELETE_DELAY: Duration = Duration::from_secs(5);
const DELETE_INTERVAL: Duration = Duration::from_secs(3);

pub const IMS_IMAGE_CONFIG: ResourceConfig = ResourceConfig {
    service: SERVICE,
    attributes: &[
        ("name", "name", "name", true),
        ("image_url", "image_url", "", true),
        ("min_disk", "min_disk", "min_disk", true),
        ("description", "description", "__description", false),
        ("os_type", "os_type", "__os_type", false),
        ("os_version", "os_version", "__os_version", false),
        ("type", "type", "", false),
        ("min_ram", "min_ram", "min_ram", false),
        ("max_ram", "max_ram", "max_ram", false),
        ("cmk_id", "cmk_id", "__system__cmkid", false),
        (
            "enterprise_project_id",
            "enterprise_project_id",
            "enterprise_project_id",
            false,
        ),
    ],
    computed: &[
        ("status", "status"),
        ("visibility", "visibility"),
        ("disk_format", "disk_format"),
        ("image_size", "__image_size"),
        ("data_origin", "__data_origin"),
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
    ],
    updatable: &["name", "description", "min_ram", "max_ram"],
    has_tags: true,
};

fn image_path(image_id: &str) -> String {
    format!("v2/cloudimages/{}", image_id)
}

fn tags_path(image_id: &str) -> String {
    format!("v2/{{project_id}}/images/{}/tags", image_id)
}

/// Look up one image in the image list, `None` if it does not exist
async fn find_image(
    transport: &dyn Transport,
    image_id: &str,
) -> TransportResult<Option<JsonValue>> {
    let body = transport
        .request(
            SERVICE,
            Method::Get,
            "v2/cloudimages",
            RequestOptions::new().with_query("id", image_id),
        )
        .await?;
    Ok(path_search("images[0]", &body).cloned())
}

pub async fn read(
    transport: &Arc<dyn Transport>,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let image = match find_image(transport.as_ref(), identifier)
        .await
        .map_err(resource_err(id))?
    {
        Some(image) => image,
        None => return Ok(State::not_found(id.clone())),
    };

    let mut attributes = read_attributes(&IMS_IMAGE_CONFIG, &image);
    if let Some(Value::String(raw)) = attributes.get("max_ram")
        && let Ok(max_ram) = raw.parse::<i64>()
    {
        attributes.insert("max_ram".to_string(), Value::Int(max_ram));
    }

    if IMS_IMAGE_CONFIG.has_tags {
        let tags = read_tags(transport.as_ref(), SERVICE, &tags_path(identifier))
            .await
            .map_err(resource_err(id))?;
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), tags_to_value(&tags));
        }
    }

    Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
}

pub async fn create(
    transport: &Arc<dyn Transport>,
    ctx: &OperationContext,
    resource: &Resource,
) -> ProviderResult<State> {
    let id = &resource.id;
    let timeouts = ctx.timeouts_for(Some(resource), ImsImageType.timeouts());

    let mut body = build_body(&IMS_IMAGE_CONFIG, resource)?;
    let tags = tags_from_value(resource.attributes.get("tags"));
    if !tags.is_empty() {
        body.insert("image_tags".to_string(), tags_to_list(&tags));
    }

    info!("Creating IMS image {}", id);
    let response = transport
        .request(
            SERVICE,
            Method::Post,
            "v2/cloudimages/action",
            RequestOptions::new().with_body(JsonValue::Object(body)),
        )
        .await
        .map_err(resource_err(id))?;

    let job_id = path_search_str("job_id", &response, "");
    if job_id.is_empty() {
        return Err(ProviderError::new("Job ID is not found in API response")
            .for_resource(id.clone()));
    }

    let config = job_wait_config(&job_id, timeouts.create);
    let job = wait_for_job(transport.clone(), SERVICE, &job_id, &config, &ctx.cancel)
        .await
        .map_err(resource_err(id))?;

    let image_id = path_search_str("entities.image_id", &job, "");
    if image_id.is_empty() {
        return Err(
            ProviderError::new(format!("Job {} finished without an image ID", job_id))
                .for_resource(id.clone()),
        );
    }
    debug!("IMS image {} has ID {}", id, image_id);

    read(transport, id, &image_id).await
}

pub async fn update(
    transport: &Arc<dyn Transport>,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let changed = plan_update(&IMS_IMAGE_CONFIG, from, to)?;

    // One replace operation per call
    for attr in changed.iter().filter(|a| *a != "tags") {
        let (Some(value), Some(path)) = (
            to.attributes.get(attr),
            response_path(&IMS_IMAGE_CONFIG, attr),
        ) else {
            continue;
        };
        info!("Updating {} of IMS image {} ({})", attr, id, identifier);
        let value = match (attr.as_str(), value) {
            // IMS stores max_ram as a string
            ("max_ram", Value::Int(n)) => JsonValue::String(n.to_string()),
            _ => value.to_json(),
        };
        let patch = json!([{
            "op": "replace",
            "path": format!("/{}", path),
            "value": value
        }]);
        transport
            .request(
                SERVICE,
                Method::Patch,
                &image_path(identifier),
                RequestOptions::new().with_body(patch),
            )
            .await
            .map_err(resource_err(id))?;
    }

    if changed.iter().any(|a| a == "tags") {
        let patch = diff_tags(
            &tags_from_value(from.attributes.get("tags")),
            &tags_from_value(to.attributes.get("tags")),
        );
        apply_tag_patch(
            transport.as_ref(),
            SERVICE,
            &format!("{}/action", tags_path(identifier)),
            &patch,
        )
        .await
        .map_err(resource_err(id))?;
    }

    read(transport, id, identifier).await
}

pub async fn delete(
    transport: &Arc<dyn Transport>,
    ctx: &OperationContext,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let timeouts = ctx.timeouts_for(None, ImsImageType.timeouts());
    let transport = transport.as_ref();

    if find_image(transport, identifier)
        .await
        .map_err(resource_err(id))?
        .is_none()
    {
        debug!("IMS image {} is already gone", identifier);
        return Ok(());
    }

    info!("Deleting IMS image {} ({})", id, identifier);
    transport
        .request(
            SERVICE,
            Method::Delete,
            &format!("v2/images/{}", identifier),
            RequestOptions::new(),
        )
        .await
        .map_err(resource_err(id))?;

    // The delete call answers 204 right away; the image disappears later
    let config = WaitConfig::new(
        format!("IMS image ({}) deletion", identifier),
        &[PENDING],
        &[COMPLETED],
    )
    .with_timeout(timeouts.delete)
    .with_delay(DELETE_DELAY)
    .with_poll_interval(DELETE_INTERVAL);

    let refresh = move || async move {
        let observation = match find_image(transport, identifier).await? {
            Some(image) => Observation::new(image, PENDING),
            None => Observation::new(JsonValue::Null, COMPLETED),
        };
        Ok::<_, TransportError>(observation)
    };

    wait(&config, &ctx.cancel, refresh)
        .await
        .map_err(resource_err(id))?;
    Ok(())
}
