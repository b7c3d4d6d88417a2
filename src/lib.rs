// gtrend library.
// Two-tier cache and fetch orchestration for the GitHub trending feed.

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod state;
pub mod trending;

pub use error::{GtrendError, Result};
