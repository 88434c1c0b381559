//! Tendril Storage - Graph store backends
//!
//! This crate provides the [`GraphStore`](tendril_core::GraphStore)
//! implementations the engine runs on, and opens them from a connection URL.

#![allow(clippy::result_large_err)]

pub mod config;
pub mod error;
pub mod index;
pub mod memory;
pub mod migration;

#[cfg(feature = "redb")]
pub mod redb;

pub use config::{open_store, Backend, ConnectionConfig};
pub use error::{StorageError, StorageResult};
pub use index::PropertyIndex;
pub use memory::{MemoryGraph, MemoryStore, Procedure};
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};

#[cfg(feature = "redb")]
pub use redb::RedbStore;
