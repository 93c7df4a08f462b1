//! RegistryStore: redb-backed instance registry.
//!
//! Provides typed CRUD operations over instance records and implements
//! [`ServiceRegistry`] on top of them. The store supports both on-disk
//! and in-memory backends (the latter for testing and embedding).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::ServiceRegistry;
use crate::tables::INSTANCES;
use crate::types::*;

/// Convert any `Display` error into a `RegistryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RegistryError::$variant(e.to_string())
    };
}

/// Thread-safe instance registry backed by redb.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry.
    pub fn open_in_memory() -> RegistryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update an instance record.
    pub fn put_instance(&self, record: &InstanceRecord) -> RegistryResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an instance by ID.
    pub fn get_instance(&self, id: &str) -> RegistryResult<Option<InstanceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: InstanceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List every instance record of a service type, in any status.
    pub fn list_instances_for_service(&self, service_type: &str) -> RegistryResult<Vec<InstanceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: InstanceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.service_type == service_type {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Update the status of an instance. Returns false if it does not exist.
    pub fn set_status(&self, id: &str, status: InstanceStatus) -> RegistryResult<bool> {
        match self.get_instance(id)? {
            Some(mut record) => {
                record.status = status;
                record.updated_at_ms = epoch_millis();
                self.put_instance(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete an instance by ID. Returns true if it existed.
    pub fn delete_instance(&self, id: &str) -> RegistryResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

impl ServiceRegistry for RegistryStore {
    fn discover(&self, service_type: &str) -> RegistryResult<Vec<InstanceRecord>> {
        let mut live = self.list_instances_for_service(service_type)?;
        live.retain(|r| r.status.is_live());
        Ok(live)
    }

    fn lookup(&self, instance_id: &str) -> RegistryResult<Option<InstanceRecord>> {
        self.get_instance(instance_id)
    }

    fn register(&self, descriptor: &InstanceDescriptor) -> RegistryResult<InstanceId> {
        let record = InstanceRecord::from_descriptor(descriptor, epoch_millis());
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            if table.get(record.id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(RegistryError::Duplicate(record.id));
            }
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %record.id, service_type = %record.service_type, "instance registered");
        Ok(record.id)
    }

    fn deregister(&self, instance_id: &str) -> RegistryResult<bool> {
        let existed = self.delete_instance(instance_id)?;
        debug!(id = %instance_id, existed, "instance deregistered");
        Ok(existed)
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_descriptor(service_type: &str, id: &str) -> InstanceDescriptor {
        let mut tags = BTreeMap::new();
        tags.insert(AUTO_SCALED_TAG.to_string(), "true".to_string());
        InstanceDescriptor {
            id: id.to_string(),
            service_type: service_type.to_string(),
            url: format!("http://{id}.internal:8080"),
            tags,
            memory_bytes: 256 * 1024 * 1024,
            cpu_weight: 100,
        }
    }

    fn test_record(service_type: &str, id: &str, created_at_ms: u64) -> InstanceRecord {
        InstanceRecord {
            id: id.to_string(),
            service_type: service_type.to_string(),
            url: format!("http://{id}.internal:8080"),
            status: InstanceStatus::Running,
            tags: BTreeMap::new(),
            memory_bytes: 64 * 1024 * 1024,
            cpu_weight: 100,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    #[test]
    fn register_then_lookup() {
        let store = RegistryStore::open_in_memory().unwrap();
        let id = store.register(&test_descriptor("api", "api-1")).unwrap();
        assert_eq!(id, "api-1");

        let record = store.lookup("api-1").unwrap().unwrap();
        assert_eq!(record.service_type, "api");
        assert_eq!(record.status, InstanceStatus::Running);
        assert!(record.is_auto_scaled());
        assert!(record.created_at_ms > 0);
    }

    #[test]
    fn register_rejects_duplicate_id() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.register(&test_descriptor("api", "api-1")).unwrap();
        let err = store.register(&test_descriptor("api", "api-1")).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(id) if id == "api-1"));
    }

    #[test]
    fn discover_filters_by_type_and_liveness() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.put_instance(&test_record("api", "api-1", 1)).unwrap();
        store.put_instance(&test_record("api", "api-2", 2)).unwrap();
        store.put_instance(&test_record("worker", "worker-1", 3)).unwrap();
        store.set_status("api-2", InstanceStatus::Stopped).unwrap();

        let live = store.discover("api").unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "api-1");

        // Stopped instances are still listed by the raw accessor.
        assert_eq!(store.list_instances_for_service("api").unwrap().len(), 2);
    }

    #[test]
    fn deregister_reports_existence() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.put_instance(&test_record("api", "api-1", 1)).unwrap();

        assert!(store.deregister("api-1").unwrap());
        assert!(!store.deregister("api-1").unwrap());
        assert!(store.discover("api").unwrap().is_empty());
    }

    #[test]
    fn set_status_on_missing_instance() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert!(!store.set_status("nope", InstanceStatus::Stopping).unwrap());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.redb");

        {
            let store = RegistryStore::open(&db_path).unwrap();
            store.register(&test_descriptor("api", "api-7")).unwrap();
        }

        let store = RegistryStore::open(&db_path).unwrap();
        let live = store.discover("api").unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "api-7");
    }
}
