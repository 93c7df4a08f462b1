//! Scaling executor: applies a [`ScalingAction`] against the registry.
//!
//! Adds register synthetic instances one at a time; removals evict the
//! oldest live instances first. Every registry call is attempted and its
//! failure recorded on its own, so a batch is never aborted or rolled back
//! part way.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scalecast_core::{ScalingAction, ScalingPolicy, epoch_millis};
use scalecast_registry::{AUTO_SCALED_TAG, InstanceDescriptor, InstanceId, ServiceRegistry};

/// Registry operation that can fail during a scaling batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryOperation {
    Discover,
    Register,
    Deregister,
}

impl fmt::Display for RegistryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistryOperation::Discover => "discover",
            RegistryOperation::Register => "register",
            RegistryOperation::Deregister => "deregister",
        })
    }
}

/// One failed registry call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryCallFailure {
    pub operation: RegistryOperation,
    /// Instance the call targeted, when known.
    pub instance_id: Option<InstanceId>,
    pub message: String,
}

/// Per-instance outcome of applying an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingReport {
    pub added: Vec<InstanceId>,
    pub removed: Vec<InstanceId>,
    pub failures: Vec<RegistryCallFailure>,
}

impl ScalingReport {
    /// Whether every registry call in the batch succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives instance counts toward an action's target.
pub struct ScalingExecutor {
    registry: Arc<dyn ServiceRegistry>,
    sequence: AtomicU64,
}

impl ScalingExecutor {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            registry,
            sequence: AtomicU64::new(0),
        }
    }

    /// Apply `action`. No-op actions make no registry calls.
    pub fn apply(&self, action: &ScalingAction, policy: &ScalingPolicy) -> ScalingReport {
        let mut report = ScalingReport::default();
        if action.is_no_op() {
            return report;
        }

        let current = action.current_instances;
        let target = action.target_instances;
        if target > current {
            self.add_instances(policy, target - current, &mut report);
        } else if target < current {
            self.remove_instances(&policy.service_type, current - target, &mut report);
        }

        debug!(
            service_type = %policy.service_type,
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failures.len(),
            "scaling batch applied"
        );
        report
    }

    fn add_instances(&self, policy: &ScalingPolicy, count: u32, report: &mut ScalingReport) {
        for _ in 0..count {
            let descriptor = self.descriptor(policy);
            match self.registry.register(&descriptor) {
                Ok(id) => {
                    debug!(service_type = %policy.service_type, %id, "instance added");
                    report.added.push(id);
                }
                Err(e) => {
                    warn!(service_type = %policy.service_type, id = %descriptor.id, error = %e, "failed to add instance");
                    report.failures.push(RegistryCallFailure {
                        operation: RegistryOperation::Register,
                        instance_id: Some(descriptor.id),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn remove_instances(&self, service_type: &str, count: u32, report: &mut ScalingReport) {
        let mut live = match self.registry.discover(service_type) {
            Ok(live) => live,
            Err(e) => {
                warn!(%service_type, error = %e, "failed to list instances for removal");
                report.failures.push(RegistryCallFailure {
                    operation: RegistryOperation::Discover,
                    instance_id: None,
                    message: e.to_string(),
                });
                return;
            }
        };

        live.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));

        for record in live.into_iter().take(count as usize) {
            match self.registry.deregister(&record.id) {
                Ok(true) => {
                    debug!(%service_type, id = %record.id, "instance removed");
                    report.removed.push(record.id);
                }
                Ok(false) => {
                    warn!(%service_type, id = %record.id, "instance vanished before removal");
                    report.failures.push(RegistryCallFailure {
                        operation: RegistryOperation::Deregister,
                        instance_id: Some(record.id),
                        message: "instance not found".to_string(),
                    });
                }
                Err(e) => {
                    warn!(%service_type, id = %record.id, error = %e, "failed to remove instance");
                    report.failures.push(RegistryCallFailure {
                        operation: RegistryOperation::Deregister,
                        instance_id: Some(record.id),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn descriptor(&self, policy: &ScalingPolicy) -> InstanceDescriptor {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}-{seq}", policy.service_type, epoch_millis());

        let mut tags = policy.tags.clone();
        tags.insert(AUTO_SCALED_TAG.to_string(), "true".to_string());

        InstanceDescriptor {
            url: format!("http://{id}:{}", policy.instance_config.port),
            id,
            service_type: policy.service_type.clone(),
            tags,
            memory_bytes: policy.instance_config.memory_bytes,
            cpu_weight: policy.instance_config.cpu_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use scalecast_core::{CostImpact, ScalingDirection};
    use scalecast_registry::{
        InstanceRecord, InstanceStatus, RegistryError, RegistryResult, RegistryStore,
    };

    use super::*;

    fn test_action(current: u32, target: u32) -> ScalingAction {
        let action = match target.cmp(&current) {
            std::cmp::Ordering::Greater => ScalingDirection::ScaleUp,
            std::cmp::Ordering::Less => ScalingDirection::ScaleDown,
            std::cmp::Ordering::Equal => ScalingDirection::NoAction,
        };
        ScalingAction {
            service_type: "api".to_string(),
            action,
            current_instances: current,
            target_instances: target,
            reason: "test".to_string(),
            metrics: None,
            prediction: None,
            cost_impact: CostImpact::default(),
            timestamp_ms: 0,
        }
    }

    fn test_record(id: &str, created_at_ms: u64) -> InstanceRecord {
        InstanceRecord {
            id: id.to_string(),
            service_type: "api".to_string(),
            url: format!("http://{id}:8080"),
            status: InstanceStatus::Running,
            tags: BTreeMap::new(),
            memory_bytes: 0,
            cpu_weight: 100,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// Registry that fails every other call of the chosen operation.
    struct FlakyRegistry {
        inner: RegistryStore,
        calls: Mutex<u32>,
    }

    impl FlakyRegistry {
        fn new() -> Self {
            Self {
                inner: RegistryStore::open_in_memory().unwrap(),
                calls: Mutex::new(0),
            }
        }

        fn should_fail(&self) -> bool {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls % 2 == 0
        }
    }

    impl ServiceRegistry for FlakyRegistry {
        fn discover(&self, service_type: &str) -> RegistryResult<Vec<InstanceRecord>> {
            self.inner.discover(service_type)
        }

        fn lookup(&self, instance_id: &str) -> RegistryResult<Option<InstanceRecord>> {
            self.inner.lookup(instance_id)
        }

        fn register(&self, descriptor: &InstanceDescriptor) -> RegistryResult<InstanceId> {
            if self.should_fail() {
                return Err(RegistryError::Unavailable("registry offline".to_string()));
            }
            self.inner.register(descriptor)
        }

        fn deregister(&self, instance_id: &str) -> RegistryResult<bool> {
            if self.should_fail() {
                return Err(RegistryError::Unavailable("registry offline".to_string()));
            }
            self.inner.deregister(instance_id)
        }
    }

    #[test]
    fn scale_up_registers_tagged_instances() {
        let store = RegistryStore::open_in_memory().unwrap();
        let executor = ScalingExecutor::new(Arc::new(store.clone()));
        let mut policy = ScalingPolicy::new("api", 0, 10);
        policy.tags.insert("team".to_string(), "edge".to_string());

        let report = executor.apply(&test_action(0, 3), &policy);
        assert_eq!(report.added.len(), 3);
        assert!(report.is_complete());

        let live = store.discover("api").unwrap();
        assert_eq!(live.len(), 3);
        for record in &live {
            assert!(record.is_auto_scaled());
            assert_eq!(record.tags.get("team").map(String::as_str), Some("edge"));
            assert!(record.url.ends_with(":8080"));
            assert_eq!(record.memory_bytes, policy.instance_config.memory_bytes);
        }
    }

    #[test]
    fn scale_down_evicts_oldest_first() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.put_instance(&test_record("api-b", 2_000)).unwrap();
        store.put_instance(&test_record("api-a", 1_000)).unwrap();
        store.put_instance(&test_record("api-c", 3_000)).unwrap();
        let executor = ScalingExecutor::new(Arc::new(store.clone()));

        let report = executor.apply(&test_action(3, 2), &ScalingPolicy::new("api", 0, 10));
        assert_eq!(report.removed, vec!["api-a".to_string()]);

        let mut remaining: Vec<String> = store.discover("api").unwrap().into_iter().map(|r| r.id).collect();
        remaining.sort();
        assert_eq!(remaining, vec!["api-b".to_string(), "api-c".to_string()]);
    }

    #[test]
    fn no_op_makes_no_calls() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.put_instance(&test_record("api-a", 1_000)).unwrap();
        let executor = ScalingExecutor::new(Arc::new(store.clone()));

        let report = executor.apply(&test_action(1, 1), &ScalingPolicy::new("api", 0, 10));
        assert_eq!(report, ScalingReport::default());
        assert_eq!(store.discover("api").unwrap().len(), 1);
    }

    #[test]
    fn failed_adds_do_not_abort_batch() {
        let registry = Arc::new(FlakyRegistry::new());
        let executor = ScalingExecutor::new(registry.clone());

        let report = executor.apply(&test_action(0, 4), &ScalingPolicy::new("api", 0, 10));
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.operation == RegistryOperation::Register));
        assert_eq!(registry.discover("api").unwrap().len(), 2);
    }

    #[test]
    fn failed_removals_keep_going() {
        let registry = Arc::new(FlakyRegistry::new());
        for (i, id) in ["api-a", "api-b", "api-c"].iter().enumerate() {
            registry.inner.put_instance(&test_record(id, i as u64)).unwrap();
        }
        let executor = ScalingExecutor::new(registry.clone());

        // Three deregistrations, the second fails.
        let report = executor.apply(&test_action(3, 0), &ScalingPolicy::new("api", 0, 10));
        assert_eq!(report.removed, vec!["api-a".to_string(), "api-c".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].instance_id.as_deref(), Some("api-b"));
    }

    #[test]
    fn synthetic_ids_are_unique() {
        let executor = ScalingExecutor::new(Arc::new(RegistryStore::open_in_memory().unwrap()));
        let policy = ScalingPolicy::new("api", 0, 10);
        let a = executor.descriptor(&policy);
        let b = executor.descriptor(&policy);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("api-"));
    }
}
