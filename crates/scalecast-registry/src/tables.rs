//! redb table definitions for the registry store.

use redb::TableDefinition;

/// Instance records keyed by instance ID.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
