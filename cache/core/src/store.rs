//! The store: user-visible SET/GET/DEL semantics over the cache and disk
//! tiers, plus operation counters.

use crate::disk::DiskStore;
use crate::error::{StoreError, StoreResult};
use crate::tiered::{TierKind, TieredCache};
use std::path::PathBuf;

/// Point-in-time snapshot of store counters and tier occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub hot_size: usize,
    pub hot_capacity: usize,
    pub warm_size: usize,
    pub warm_capacity: usize,
}

/// Bounded-memory key-value store with transparent spill to disk.
///
/// All operations run on the owning thread; the reactor is single-threaded,
/// so counters are plain integers and no locking is needed.
pub struct Store {
    cache: TieredCache,
    disk: DiskStore,
    hits: u64,
    misses: u64,
    disk_reads: u64,
    disk_writes: u64,
}

impl Store {
    /// Create a store builder with default capacities.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Store `value` under `key`.
    ///
    /// Any stale disk copy is purged first so the in-memory entry becomes the
    /// single authoritative location. A failed purge leaves the old file
    /// behind; it is harmless because memory now shadows it and the next
    /// demotion overwrites it.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        if self.disk.exists(key) {
            self.disk.delete(key);
            self.disk_writes += 1;
        }
        self.cache.set(key, value.to_vec(), &mut self.disk);
    }

    /// Fetch the value for `key`, consulting memory first and falling back
    /// to the disk tier.
    ///
    /// A disk hit moves the value back into the hot tier: the file is
    /// deleted after a successful load, keeping every key resident in at
    /// most one tier.
    pub fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        if self.cache.exists_in_memory(key) {
            self.hits += 1;
            return self.cache.get(key, &mut self.disk);
        }

        self.misses += 1;
        if self.disk.exists(key) {
            if let Some(value) = self.disk.get(key) {
                self.disk.delete(key);
                self.cache.set(key, value, &mut self.disk);
                self.disk_reads += 1;
                return self.cache.peek(key);
            }
        }
        None
    }

    /// Remove `key` everywhere. Returns true iff the key was resident in
    /// memory or on disk.
    pub fn del(&mut self, key: &[u8]) -> bool {
        let mut removed = self.cache.exists_in_memory(key);
        self.cache.remove(key);

        if self.disk.exists(key) {
            self.disk.delete(key);
            self.disk_writes += 1;
            removed = true;
        }
        removed
    }

    /// True iff `key` is resident in memory or on disk.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.cache.exists_in_memory(key) || self.disk.exists(key)
    }

    /// Snapshot the counters and tier occupancy.
    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.hits,
            misses: self.misses,
            disk_reads: self.disk_reads,
            disk_writes: self.disk_writes,
            hot_size: self.cache.hot_len(),
            hot_capacity: self.cache.hot_capacity(),
            warm_size: self.cache.warm_len(),
            warm_capacity: self.cache.warm_capacity(),
        }
    }

    /// Persist the disk index. Called once at clean shutdown; values already
    /// demoted to disk become recoverable on the next start.
    pub fn persist_index(&self) -> StoreResult<()> {
        self.disk.save_index()?;
        Ok(())
    }

    /// Which tier currently holds `key`, if it is memory-resident.
    pub fn tier_of(&self, key: &[u8]) -> Option<TierKind> {
        self.cache.tier_of(key)
    }

    /// True iff `key` is on the disk tier.
    pub fn on_disk(&self, key: &[u8]) -> bool {
        self.disk.exists(key)
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    hot_capacity: usize,
    warm_capacity: usize,
    promotion_threshold: u32,
    data_dir: PathBuf,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            hot_capacity: 10_000,
            warm_capacity: 50_000,
            promotion_threshold: 3,
            data_dir: PathBuf::from("./blinkdb_data"),
        }
    }

    /// Entry capacity of the hot tier.
    pub fn hot_capacity(mut self, capacity: usize) -> Self {
        self.hot_capacity = capacity;
        self
    }

    /// Entry capacity of the warm tier.
    pub fn warm_capacity(mut self, capacity: usize) -> Self {
        self.warm_capacity = capacity;
        self
    }

    /// Number of accesses after which a warm entry promotes to hot.
    pub fn promotion_threshold(mut self, threshold: u32) -> Self {
        self.promotion_threshold = threshold;
        self
    }

    /// Root directory for the disk tier.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Open the disk tier and build the store.
    pub fn build(self) -> StoreResult<Store> {
        if self.hot_capacity == 0 {
            return Err(StoreError::Config(
                "hot_capacity must be at least 1".to_string(),
            ));
        }
        if self.warm_capacity == 0 {
            return Err(StoreError::Config(
                "warm_capacity must be at least 1".to_string(),
            ));
        }
        if self.promotion_threshold == 0 {
            return Err(StoreError::Config(
                "promotion_threshold must be at least 1".to_string(),
            ));
        }

        let disk = DiskStore::open(&self.data_dir)?;
        Ok(Store {
            cache: TieredCache::new(
                self.hot_capacity,
                self.warm_capacity,
                self.promotion_threshold,
            ),
            disk,
            hits: 0,
            misses: 0,
            disk_reads: 0,
            disk_writes: 0,
        })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
