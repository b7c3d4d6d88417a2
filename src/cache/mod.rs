// Cache module.
// Two-tier TTL cache: bounded memory over a write-through persistent store.

pub mod clock;
pub mod engine;
pub mod paths;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{CacheEngine, CacheEntry, CacheStats, Placement, SweepReport};
pub use store::{FileStore, MemoryStore, PersistentStore};
pub use sweeper::SweepHandle;
