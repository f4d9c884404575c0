//! DCS instance handler
//!
//! Instances are created and deleted asynchronously. Progress is followed on
//! the instance itself: `RUNNING` means usable, a 404 means deleted.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde_json::{Map, Value as JsonValue};
use stratus_core::jsonpath::path_search_str;
use stratus_core::provider::{OperationContext, ProviderError, ProviderResult, ResourceType};
use stratus_core::refresh::{COMPLETED, DELETED, PENDING, StatusProbe, StatusTable};
use stratus_core::resource::{Resource, ResourceId, State};
use stratus_core::tags::{diff_tags, tags_from_value, tags_to_list, tags_to_value};
use stratus_core::transport::{Method, RequestOptions, Transport};
use stratus_core::waiter::{WaitConfig, wait_for_status};

use super::{
    DcsInstanceType, ResourceConfig, apply_tag_patch, build_body, plan_update, read_attributes,
    read_tags, request_field, resource_err,
};

const SERVICE: &str = "dcs";
const WAIT_DELAY: Duration = Duration::from_secs(10);
const WAIT_INTERVAL: Duration = Duration::from_secs(10);

pub const DCS_INSTANCE_CONFIG: ResourceConfig = ResourceConfig {
    service: SERVICE,
    attributes: &[
        ("name", "name", "name", true),
        ("engine", "engine", "engine", true),
        ("engine_version", "engine_version", "engine_version", false),
        ("capacity", "capacity", "capacity", true),
        ("flavor", "spec_code", "spec_code", true),
        ("vpc_id", "vpc_id", "vpc_id", true),
        ("subnet_id", "subnet_id", "subnet_id", true),
        ("availability_zones", "available_zones", "available_zones", true),
        ("port", "port", "port", false),
        ("password", "password", "", false),
        ("description", "description", "description", false),
    ],
    computed: &[
        ("status", "status"),
        ("private_ip", "ip"),
        ("domain_name", "domain_name"),
        ("max_memory", "max_memory"),
        ("created_at", "created_at"),
    ],
    updatable: &["name", "description", "password"],
    has_tags: true,
};

fn instance_path(instance_id: &str) -> String {
    format!("v2/{{project_id}}/instances/{}", instance_id)
}

fn tags_path(instance_id: &str) -> String {
    format!("v2/{{project_id}}/instances/{}/tags", instance_id)
}

fn tags_action_path(instance_id: &str) -> String {
    format!("v3/{{project_id}}/instances/{}/tags/action", instance_id)
}

/// Instance status table. Statuses such as CREATING, RESTARTING, EXTENDING
/// or FROZEN are not listed and count as pending.
pub fn instance_status() -> StatusTable {
    StatusTable::new("status")
        .success(&["RUNNING"])
        .failure(&["CREATEFAILED", "ERROR"])
        .deleted_when_not_found()
}

fn wait_config(
    operation: String,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> WaitConfig {
    WaitConfig::new(operation, pending, target)
        .with_timeout(timeout)
        .with_delay(WAIT_DELAY)
        .with_poll_interval(WAIT_INTERVAL)
        .with_continuous_target_occurrence(2)
}

async fn wait_running(
    transport: &Arc<dyn Transport>,
    ctx: &OperationContext,
    id: &ResourceId,
    instance_id: &str,
    action: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let probe = StatusProbe::new(
        transport.clone(),
        SERVICE,
        instance_path(instance_id),
        instance_status(),
    );
    let config = wait_config(
        format!("DCS instance ({}) {}", instance_id, action),
        &[PENDING],
        &[COMPLETED],
        timeout,
    );
    wait_for_status(&probe, &config, &ctx.cancel)
        .await
        .map_err(resource_err(id))?;
    Ok(())
}

pub async fn read(
    transport: &Arc<dyn Transport>,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let result = transport
        .request(
            SERVICE,
            Method::Get,
            &instance_path(identifier),
            RequestOptions::new(),
        )
        .await;

    let instance = match result {
        Ok(instance) => instance,
        Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
        Err(e) => return Err(resource_err(id)(e)),
    };

    let mut attributes = read_attributes(&DCS_INSTANCE_CONFIG, &instance);

    if DCS_INSTANCE_CONFIG.has_tags {
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
    let timeouts = ctx.timeouts_for(Some(resource), DcsInstanceType.timeouts());

    let mut body = build_body(&DCS_INSTANCE_CONFIG, resource)?;
    let tags = tags_from_value(resource.attributes.get("tags"));
    if !tags.is_empty() {
        body.insert("tags".to_string(), tags_to_list(&tags));
    }

    info!("Creating DCS instance {}", id);
    let response = transport
        .request(
            SERVICE,
            Method::Post,
            "v2/{project_id}/instances",
            RequestOptions::new().with_body(JsonValue::Object(body)),
        )
        .await
        .map_err(resource_err(id))?;

    let instance_id = path_search_str("instances[0].instance_id", &response, "");
    if instance_id.is_empty() {
        return Err(ProviderError::new("Instance ID is not found in API response")
            .for_resource(id.clone()));
    }
    debug!("DCS instance {} has ID {}", id, instance_id);

    wait_running(transport, ctx, id, &instance_id, "creation", timeouts.create).await?;

    read(transport, id, &instance_id).await
}

pub async fn update(
    transport: &Arc<dyn Transport>,
    ctx: &OperationContext,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let changed = plan_update(&DCS_INSTANCE_CONFIG, from, to)?;
    let timeouts = ctx.timeouts_for(Some(to), DcsInstanceType.timeouts());

    let mut body = Map::new();
    for attr in changed.iter().filter(|a| *a != "tags") {
        if let (Some(value), Some(field)) = (
            to.attributes.get(attr),
            request_field(&DCS_INSTANCE_CONFIG, attr),
        ) {
            body.insert(field.to_string(), value.to_json());
        }
    }

    if !body.is_empty() {
        info!("Updating DCS instance {} ({})", id, identifier);
        transport
            .request(
                SERVICE,
                Method::Put,
                &instance_path(identifier),
                RequestOptions::new().with_body(JsonValue::Object(body)),
            )
            .await
            .map_err(resource_err(id))?;
        wait_running(transport, ctx, id, identifier, "update", timeouts.update).await?;
    }

    if changed.iter().any(|a| a == "tags") {
        let patch = diff_tags(
            &tags_from_value(from.attributes.get("tags")),
            &tags_from_value(to.attributes.get("tags")),
        );
        debug!("Updating tags of DCS instance {}: {:?}", id, patch);
        apply_tag_patch(
            transport.as_ref(),
            SERVICE,
            &tags_action_path(identifier),
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
    let timeouts = ctx.timeouts_for(None, DcsInstanceType.timeouts());

    info!("Deleting DCS instance {} ({})", id, identifier);
    let result = transport
        .request(
            SERVICE,
            Method::Delete,
            &instance_path(identifier),
            RequestOptions::new(),
        )
        .await;
    match result {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            debug!("DCS instance {} is already gone", identifier);
            return Ok(());
        }
        Err(e) => return Err(resource_err(id)(e)),
    }

    let probe = StatusProbe::new(
        transport.clone(),
        SERVICE,
        instance_path(identifier),
        instance_status(),
    );
    // RUNNING (labelled COMPLETED) is seen until the deletion starts
    let config = wait_config(
        format!("DCS instance ({}) deletion", identifier),
        &[PENDING, COMPLETED],
        &[DELETED],
        timeouts.delete,
    );
    wait_for_status(&probe, &config, &ctx.cancel)
        .await
        .map_err(resource_err(id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, not_found};
    use serde_json::json;
    use stratus_core::resource::{Timeouts, Value};
    use tokio::time::Instant;

    const INSTANCE: &str = "v2/{project_id}/instances/i-1";
    const TAGS: &str = "v2/{project_id}/instances/i-1/tags";
    const TAGS_ACTION: &str = "v3/{project_id}/instances/i-1/tags/action";

    fn instance(status: &str) -> JsonValue {
        json!({
            "instance_id": "i-1",
            "name": "cache-1",
            "engine": "Redis",
            "engine_version": "5.0",
            "capacity": 4,
            "spec_code": "redis.ha.xu1.large.r2.4",
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "available_zones": ["az-1"],
            "description": null,
            "status": status,
            "ip": "192.168.0.10"
        })
    }

    fn desired() -> Resource {
        Resource::new("dcs_instance", "cache")
            .with_attribute("name", Value::String("cache-1".to_string()))
            .with_attribute("engine", Value::String("Redis".to_string()))
            .with_attribute("capacity", Value::Int(4))
            .with_attribute("flavor", Value::String("redis.ha.xu1.large.r2.4".to_string()))
            .with_attribute("vpc_id", Value::String("vpc-1".to_string()))
            .with_attribute("subnet_id", Value::String("subnet-1".to_string()))
            .with_attribute(
                "availability_zones",
                Value::List(vec![Value::String("az-1".to_string())]),
            )
    }

    fn shared(mock: MockTransport) -> (Arc<MockTransport>, Arc<dyn Transport>) {
        let mock = Arc::new(mock);
        let transport: Arc<dyn Transport> = mock.clone();
        (mock, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_two_running_observations() {
        let (mock, transport) = shared(
            MockTransport::new()
                .on(
                    Method::Post,
                    "v2/{project_id}/instances",
                    vec![Ok(json!({
                        "instances": [{"instance_id": "i-1", "instance_name": "cache-1"}]
                    }))],
                )
                .on(
                    Method::Get,
                    INSTANCE,
                    vec![
                        Ok(instance("CREATING")),
                        Ok(instance("RUNNING")),
                        Ok(instance("RUNNING")),
                    ],
                )
                .on(Method::Get, TAGS, vec![Ok(json!({"tags": []}))]),
        );
        let start = Instant::now();

        let state = create(&transport, &OperationContext::default(), &desired())
            .await
            .unwrap();

        assert_eq!(state.identifier.as_deref(), Some("i-1"));
        assert_eq!(
            state.attributes.get("status"),
            Some(&Value::String("RUNNING".to_string()))
        );
        assert_eq!(
            state.attributes.get("flavor"),
            Some(&Value::String("redis.ha.xu1.large.r2.4".to_string()))
        );
        // three probes plus the final read
        assert_eq!(mock.count(Method::Get, INSTANCE), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        let post = &mock.requests()[0];
        assert_eq!(post.service, "dcs");
        let body = post.body.as_ref().unwrap();
        assert_eq!(body["spec_code"], json!("redis.ha.xu1.large.r2.4"));
        assert_eq!(body["available_zones"], json!(["az-1"]));
        assert!(body.get("tags").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failed_instance() {
        let (_, transport) = shared(
            MockTransport::new()
                .on(
                    Method::Post,
                    "v2/{project_id}/instances",
                    vec![Ok(json!({"instances": [{"instance_id": "i-1"}]}))],
                )
                .on(
                    Method::Get,
                    INSTANCE,
                    vec![Ok(instance("CREATING")), Ok(instance("CREATEFAILED"))],
                ),
        );

        let err = create(&transport, &OperationContext::default(), &desired())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "[dcs_instance.cache] DCS instance (i-1) creation: unexpected state 'FAILED' \
             (status: CREATEFAILED), wanted target 'COMPLETED'"
        );
        assert!(!err.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_times_out() {
        let (_, transport) = shared(
            MockTransport::new()
                .on(
                    Method::Post,
                    "v2/{project_id}/instances",
                    vec![Ok(json!({"instances": [{"instance_id": "i-1"}]}))],
                )
                .on(Method::Get, INSTANCE, vec![Ok(instance("CREATING"))]),
        );
        let ctx = OperationContext::default()
            .with_timeouts(Timeouts::uniform(Duration::from_secs(60)));

        let err = create(&transport, &ctx, &desired()).await.unwrap_err();
        assert!(err.timed_out);
    }

    #[tokio::test]
    async fn test_create_without_instance_id() {
        let (_, transport) = shared(MockTransport::new().on(
            Method::Post,
            "v2/{project_id}/instances",
            vec![Ok(json!({"instances": []}))],
        ));

        let err = create(&transport, &OperationContext::default(), &desired())
            .await
            .unwrap_err();
        assert!(err.message.contains("Instance ID is not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_cancelled() {
        let (_, transport) = shared(
            MockTransport::new()
                .on(
                    Method::Post,
                    "v2/{project_id}/instances",
                    vec![Ok(json!({"instances": [{"instance_id": "i-1"}]}))],
                )
                .on(Method::Get, INSTANCE, vec![Ok(instance("CREATING"))]),
        );
        let ctx = OperationContext::default();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            cancel.cancel();
        });

        let err = create(&transport, &ctx, &desired()).await.unwrap_err();
        assert_eq!(
            err.message,
            "wait for DCS instance (i-1) creation was cancelled"
        );
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let (_, transport) = shared(MockTransport::new().on(
            Method::Get,
            INSTANCE,
            vec![not_found(INSTANCE)],
        ));

        let state = read(&transport, &ResourceId::new("dcs_instance", "cache"), "i-1")
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn test_read_includes_tags() {
        let (_, transport) = shared(
            MockTransport::new()
                .on(Method::Get, INSTANCE, vec![Ok(instance("RUNNING"))])
                .on(
                    Method::Get,
                    TAGS,
                    vec![Ok(json!({"tags": [{"key": "env", "value": "dev"}]}))],
                ),
        );

        let state = read(&transport, &ResourceId::new("dcs_instance", "cache"), "i-1")
            .await
            .unwrap();
        let tags = tags_from_value(state.attributes.get("tags"));
        assert_eq!(tags.get("env").map(String::as_str), Some("dev"));
        assert!(!state.attributes.contains_key("description"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_name_and_tags() {
        let (mock, transport) = shared(
            MockTransport::new()
                .on(Method::Put, INSTANCE, vec![Ok(JsonValue::Null)])
                .on(Method::Get, INSTANCE, vec![Ok(instance("RUNNING"))])
                .on(Method::Get, TAGS, vec![Ok(json!({"tags": []}))])
                .on(Method::Post, TAGS_ACTION, vec![Ok(JsonValue::Null)]),
        );
        let id = ResourceId::new("dcs_instance", "cache");
        let from = State::existing(id.clone(), desired().attributes).with_identifier("i-1");

        let mut tags = std::collections::HashMap::new();
        tags.insert("env".to_string(), Value::String("prod".to_string()));
        let to = desired()
            .with_attribute("name", Value::String("cache-2".to_string()))
            .with_attribute("tags", Value::Map(tags));

        update(&transport, &OperationContext::default(), &id, "i-1", &from, &to)
            .await
            .unwrap();

        let puts: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Put)
            .collect();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].body, Some(json!({"name": "cache-2"})));
        assert_eq!(mock.count(Method::Post, TAGS_ACTION), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_capacity_change() {
        let (mock, transport) = shared(MockTransport::new());
        let id = ResourceId::new("dcs_instance", "cache");
        let from = State::existing(id.clone(), desired().attributes).with_identifier("i-1");
        let to = desired().with_attribute("capacity", Value::Int(8));

        let err = update(&transport, &OperationContext::default(), &id, "i-1", &from, &to)
            .await
            .unwrap_err();
        assert!(err.message.contains("capacity"));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_gone() {
        let (mock, transport) = shared(
            MockTransport::new()
                .on(Method::Delete, INSTANCE, vec![Ok(JsonValue::Null)])
                .on(
                    Method::Get,
                    INSTANCE,
                    vec![
                        Ok(instance("RUNNING")),
                        Ok(instance("DELETING")),
                        not_found(INSTANCE),
                    ],
                ),
        );

        delete(
            &transport,
            &OperationContext::default(),
            &ResourceId::new("dcs_instance", "cache"),
            "i-1",
        )
        .await
        .unwrap();

        // two consecutive 404s are required
        assert_eq!(mock.count(Method::Get, INSTANCE), 4);
    }

    #[tokio::test]
    async fn test_delete_already_gone() {
        let (mock, transport) = shared(MockTransport::new().on(
            Method::Delete,
            INSTANCE,
            vec![not_found(INSTANCE)],
        ));

        delete(
            &transport,
            &OperationContext::default(),
            &ResourceId::new("dcs_instance", "cache"),
            "i-1",
        )
        .await
        .unwrap();
        assert_eq!(mock.count(Method::Get, INSTANCE), 0);
    }
}
