//! Bounded-memory key-value storage with transparent spill to disk.
//!
//! The crate is organised bottom-up:
//!
//! - [`disk`]: a content-addressed file store for values demoted past the
//!   in-memory tiers, with a persisted key→path index.
//! - [`tiered`]: the two-tier LRU cache (hot and warm), promotion on repeated
//!   access, and the hot→warm→disk eviction chain.
//! - [`store`]: the user-visible SET/GET/DEL/EXISTS semantics plus counters.
//!
//! Everything here is single-threaded by design: the store is owned by the
//! server's reactor and mutated only between I/O readiness events.

pub mod disk;
pub mod error;
pub mod store;
pub mod tiered;

pub use disk::DiskStore;
pub use error::{StoreError, StoreResult};
pub use store::{Stats, Store, StoreBuilder};
pub use tiered::{TierKind, TieredCache};
