//! scalecast-registry: the service registry the autoscaler drives.
//!
//! The autoscaler needs a few things from a registry: list the live
//! instances of a service type, look one up by ID, register a new
//! instance, and deregister one. [`ServiceRegistry`] captures that boundary so hosts can plug in
//! their own registry client.
//!
//! [`RegistryStore`] is the bundled implementation, backed by
//! [redb](https://docs.rs/redb). Instance records are JSON-serialized into
//! redb's `&[u8]` value columns, keyed by instance ID. It supports an
//! on-disk and an in-memory backend, and is `Clone` + `Send` + `Sync`.
//!
//! The crate has no dependency on `scalecast-core`, so the store keeps its
//! own copy of the epoch-millisecond clock.

pub mod error;
pub mod registry;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use registry::ServiceRegistry;
pub use store::RegistryStore;
pub use types::*;
