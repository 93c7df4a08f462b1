//! The registry boundary consumed by the autoscaler.

use crate::error::RegistryResult;
use crate::types::{InstanceDescriptor, InstanceId, InstanceRecord};

/// A registry of running service instances.
///
/// Calls are synchronous from the caller's point of view. Implementations
/// must be safe to share across tasks; timeouts belong to the
/// implementation, not to the caller.
pub trait ServiceRegistry: Send + Sync {
    /// Live instances of `service_type`.
    fn discover(&self, service_type: &str) -> RegistryResult<Vec<InstanceRecord>>;

    /// Look up a single instance by ID, live or not.
    fn lookup(&self, instance_id: &str) -> RegistryResult<Option<InstanceRecord>>;

    /// Register a new instance and return its ID.
    fn register(&self, descriptor: &InstanceDescriptor) -> RegistryResult<InstanceId>;

    /// Remove an instance. Returns true if it existed.
    fn deregister(&self, instance_id: &str) -> RegistryResult<bool>;
}
