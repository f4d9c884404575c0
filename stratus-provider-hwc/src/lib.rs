//! Stratus Huawei Cloud Provider
//!
//! Huawei Cloud REST API provider implementation.
//!
//! ## Module Structure
//!
//! - `config` - Region, project and credential settings
//! - `client` - HTTP transport with token auth and retries
//! - `jobs` - Waiting on asynchronous service jobs
//! - `resources` - Resource type definitions and per-type handlers
//! - `validation` - Attribute checks run before any request
//! - `provider` - HwcProvider implementation

pub mod client;
pub mod config;
pub mod jobs;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-export main types
pub use client::HttpTransport;
pub use config::{ConfigError, ProviderConfig};
pub use provider::HwcProvider;

use stratus_core::provider::{
    BoxFuture, OperationContext, Provider, ProviderError, ProviderResult, ResourceType,
};
use stratus_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for HwcProvider {
    fn name(&self) -> &'static str {
        "hwc"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    Err(ProviderError::new("Read was cancelled").for_resource(id.clone()))
                }
                result = self.read_resource(id, identifier) => result,
            }
        })
    }

    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move { self.create_resource(ctx, resource).await })
    }

    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move { self.update_resource(ctx, id, identifier, from, to).await })
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move { self.delete_resource(ctx, id, identifier).await })
    }
}
