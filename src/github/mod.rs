// Trending feed module.
// Provides the client and types for the GitHub trending feed.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::TrendingClient;
pub use endpoints::TrendingSource;
pub use types::*;
