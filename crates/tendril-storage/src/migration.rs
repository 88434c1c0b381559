//! Layout versioning for persistent stores
//!
//! Only the store's own file layout is versioned here; user data is never
//! rewritten.

use crate::StorageResult;

/// Current layout version
pub const CURRENT_VERSION: u32 = 1;

/// One layout version
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pub version: u32,
    pub description: &'static str,
}

/// Every layout version, oldest first
pub fn get_migrations() -> Vec<SchemaVersion> {
    vec![SchemaVersion {
        version: 1,
        description: "Node, edge, index and unique-key tables",
    }]
}

/// Version tracking for a persistent store
pub trait Migratable {
    /// Layout version recorded in the store, 0 for a fresh file
    fn get_schema_version(&self) -> StorageResult<u32>;

    fn set_schema_version(&self, version: u32) -> StorageResult<()>;

    /// Apply one version's changes
    fn run_migration(&self, version: u32) -> StorageResult<()>;

    /// Step from the recorded version up to `target_version`
    fn migrate_to(&self, target_version: u32) -> StorageResult<()> {
        let current = self.get_schema_version()?;

        if current == target_version {
            tracing::debug!("Store layout already at version {}", target_version);
            return Ok(());
        }

        if current > target_version {
            tracing::warn!(
                "Store layout version {} is newer than this build ({}); continuing without migrating",
                current,
                target_version
            );
            return Ok(());
        }

        for version in (current + 1)..=target_version {
            self.run_migration(version)?;
            self.set_schema_version(version)?;
            tracing::info!("Store layout migrated to version {}", version);
        }
        Ok(())
    }

    fn migrate_to_latest(&self) -> StorageResult<()> {
        self.migrate_to(CURRENT_VERSION)
    }
}
