//! Provider - Trait abstracting resource operations
//!
//! A Provider knows how to read, create, update and delete the resource types
//! of one cloud. Implementations translate these calls into REST requests and
//! wait for the resulting asynchronous operations to settle.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::resource::{Resource, ResourceId, State, Timeouts};
use crate::transport::TransportError;
use crate::waiter::WaitError;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Set when the error came from a wait that ran out of time
    pub timed_out: bool,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
            timed_out: false,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

impl From<WaitError<TransportError>> for ProviderError {
    fn from(err: WaitError<TransportError>) -> Self {
        let timed_out = err.is_timeout();
        let mut error = ProviderError::new(err.to_string()).with_cause(err);
        error.timed_out = timed_out;
        error
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ambient context of one provider call
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Cancelling this token stops every wait started by the call
    pub cancel: CancellationToken,
    /// Caller-wide timeouts, overriding the resource type's defaults
    pub timeouts: Option<Timeouts>,
}

impl OperationContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeouts: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Effective timeouts: the resource's own, then the caller's, then `defaults`
    pub fn timeouts_for(&self, resource: Option<&Resource>, defaults: Timeouts) -> Timeouts {
        resource
            .and_then(|r| r.timeouts)
            .or(self.timeouts)
            .unwrap_or(defaults)
    }
}

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "dcs_instance")
    fn name(&self) -> &'static str;

    /// One-line description for listings
    fn description(&self) -> &'static str {
        ""
    }

    /// Default timeouts for this resource type
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }
}

/// Main Provider trait
///
/// Each cloud provider implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "hwc")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource by its cloud identifier.
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Create a resource and wait until it is usable.
    ///
    /// Returns State with identifier set to the cloud-side ID.
    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Update a resource in place
    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Delete a resource and wait until it is gone
    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).read(ctx, id, identifier)
    }

    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).create(ctx, resource)
    }

    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).update(ctx, id, identifier, from, to)
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(ctx, id, identifier)
    }
}
