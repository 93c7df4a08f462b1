//! Instance records held by the registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a registered instance.
pub type InstanceId = String;

/// Tag set on every instance the autoscaler registers.
pub const AUTO_SCALED_TAG: &str = "autoScaled";

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Starting,
    Running,
    Unhealthy,
    Stopping,
    Stopped,
}

impl InstanceStatus {
    /// Whether the instance counts towards a service type's live capacity.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            InstanceStatus::Starting | InstanceStatus::Running | InstanceStatus::Unhealthy
        )
    }
}

/// Everything needed to register a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: InstanceId,
    pub service_type: String,
    pub url: String,
    pub tags: BTreeMap<String, String>,
    /// Memory hint in bytes.
    pub memory_bytes: u64,
    /// CPU weight hint (relative).
    pub cpu_weight: u32,
}

/// A registered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub service_type: String,
    pub url: String,
    pub status: InstanceStatus,
    pub tags: BTreeMap<String, String>,
    pub memory_bytes: u64,
    pub cpu_weight: u32,
    /// Unix timestamp (milliseconds) when the instance was registered.
    pub created_at_ms: u64,
    /// Unix timestamp (milliseconds) of the last status change.
    pub updated_at_ms: u64,
}

impl InstanceRecord {
    /// Build a running record from a descriptor.
    pub fn from_descriptor(descriptor: &InstanceDescriptor, now_ms: u64) -> Self {
        Self {
            id: descriptor.id.clone(),
            service_type: descriptor.service_type.clone(),
            url: descriptor.url.clone(),
            status: InstanceStatus::Running,
            tags: descriptor.tags.clone(),
            memory_bytes: descriptor.memory_bytes,
            cpu_weight: descriptor.cpu_weight,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Whether the autoscaler registered this instance.
    pub fn is_auto_scaled(&self) -> bool {
        self.tags.get(AUTO_SCALED_TAG).is_some_and(|v| v == "true")
    }
}
