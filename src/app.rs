// Application wiring.
// Builds the cache, upstream client, and fetcher from configuration and owns the sweep lifecycle.

use std::sync::Arc;

use crate::cache::{CacheEngine, CacheStats, PersistentStore, SweepHandle, SweepReport};
use crate::config::Config;
use crate::error::Result;
use crate::github::{TrendingClient, TrendingSource};
use crate::state::TrendingState;
use crate::trending::{Query, Served, TrendingFetcher};

pub type DynStore = Box<dyn PersistentStore>;

/// Main application state.
pub struct App<U = TrendingClient> {
    fetcher: TrendingFetcher<DynStore, U>,
    sweeper: Option<SweepHandle>,
}

impl App<TrendingClient> {
    /// Wire an app against the real trending feed.
    pub fn new(config: &Config, store: DynStore) -> Result<Self> {
        config.validate()?;
        let client = TrendingClient::new(&config.upstream)?;
        Ok(Self::with_source(config, store, client))
    }
}

impl<U: TrendingSource> App<U> {
    pub fn with_source(config: &Config, store: DynStore, source: U) -> Self {
        let cache = Arc::new(CacheEngine::new(config.cache.clone(), store));
        let fetcher = TrendingFetcher::new(cache, source, TrendingState::new())
            .with_concurrency(config.upstream.concurrency);

        Self {
            fetcher,
            sweeper: None,
        }
    }

    /// Start the background expiry sweep if it is not already running.
    pub fn start_sweeping(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(self.fetcher.cache().start_sweeping());
        }
    }

    /// Stop the background sweep, if any.
    pub async fn stop_sweeping(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.stop().await;
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_some()
    }

    pub async fn fetch(&self, query: &Query) -> Result<Served> {
        self.fetcher.fetch(query).await
    }

    pub fn state(&self) -> &TrendingState {
        self.fetcher.state()
    }

    pub fn stats(&self) -> CacheStats {
        self.fetcher.cache().stats()
    }

    pub fn sweep(&self) -> SweepReport {
        self.fetcher.cache().sweep_expired()
    }

    pub fn clear(&self) {
        self.fetcher.cache().clear();
    }
}
