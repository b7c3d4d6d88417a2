// Trending module.
// Queries, period stamping, stored listings, and the fetch orchestrator.

pub mod orchestrator;
pub mod period;
pub mod query;
pub mod record;

pub use orchestrator::{CacheLookup, Served, ServedFrom, TrendingFetcher};
pub use period::{Period, current_period};
pub use query::{ALL_LANGUAGES, Query, ttl_for};
pub use record::TrendingRecord;
