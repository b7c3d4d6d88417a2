// Trending state container.
// Latest served listing, observable by any number of subscribers.

use std::sync::Arc;

use tokio::sync::watch;

use crate::github::TrendingItem;

/// Shared handle to the current trending listing. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct TrendingState {
    tx: Arc<watch::Sender<Vec<TrendingItem>>>,
}

impl Default for TrendingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendingState {
    /// Create an empty state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current listing and notify subscribers.
    pub fn publish(&self, items: Vec<TrendingItem>) {
        self.tx.send_replace(items);
    }

    /// Get a copy of the current listing.
    pub fn current(&self) -> Vec<TrendingItem> {
        self.tx.borrow().clone()
    }

    /// Receiver that sees every later publish.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TrendingItem>> {
        self.tx.subscribe()
    }
}
