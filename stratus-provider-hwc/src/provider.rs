//! Huawei Cloud Provider implementation
//!
//! This module contains the main provider implementation that dispatches
//! resource operations to the per-type handlers.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use stratus_core::provider::{OperationContext, ProviderError, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State};
use stratus_core::transport::Transport;
use stratus_core::waiter::WaitConfig;
use tokio_util::sync::CancellationToken;

use crate::client::HttpTransport;
use crate::config::{ConfigError, ProviderConfig};
use crate::jobs::wait_for_job;
use crate::resources::{dcs_instance, ims_image, unknown_type};
use crate::validation::validate_resource;

/// Huawei Cloud Provider
pub struct HwcProvider {
    transport: Arc<dyn Transport>,
}

impl HwcProvider {
    /// Create a provider talking HTTP to the endpoints of `config`
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            "dcs_instance" => dcs_instance::read(&self.transport, id, identifier).await,
            "ims_image" => ims_image::read(&self.transport, id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn create_resource(
        &self,
        ctx: &OperationContext,
        resource: &Resource,
    ) -> ProviderResult<State> {
        validate(resource)?;
        match resource.id.resource_type.as_str() {
            "dcs_instance" => dcs_instance::create(&self.transport, ctx, resource).await,
            "ims_image" => ims_image::create(&self.transport, ctx, resource).await,
            _ => Err(unknown_type(&resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        validate(to)?;
        match id.resource_type.as_str() {
            "dcs_instance" => {
                dcs_instance::update(&self.transport, ctx, id, identifier, from, to).await
            }
            "ims_image" => ims_image::update(&self.transport, id, identifier, from, to).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn delete_resource(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            "dcs_instance" => dcs_instance::delete(&self.transport, ctx, id, identifier).await,
            "ims_image" => ims_image::delete(&self.transport, ctx, id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }

    /// Wait for an asynchronous job of `service` and return the job object
    pub async fn wait_job(
        &self,
        service: &str,
        job_id: &str,
        config: &WaitConfig,
        cancel: &CancellationToken,
    ) -> ProviderResult<JsonValue> {
        let job = wait_for_job(self.transport.clone(), service, job_id, config, cancel).await?;
        Ok(job)
    }
}

fn validate(resource: &Resource) -> ProviderResult<()> {
    validate_resource(&resource.id.resource_type, &resource.attributes).map_err(|errors| {
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ProviderError::new(format!("Invalid attributes: {}", details.join("; ")))
            .for_resource(resource.id.clone())
    })
}
