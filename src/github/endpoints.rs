// Trending feed endpoints.
// Typed fetch of a trending listing, and the source seam the orchestrator uses.

use async_trait::async_trait;

use crate::error::Result;

use super::client::TrendingClient;
use super::types::{Category, Since, TrendingItem};

/// Anything that can produce a trending listing for one language.
///
/// An empty `language` means all languages.
#[async_trait]
pub trait TrendingSource: Send + Sync {
    async fn fetch_trending(
        &self,
        language: &str,
        since: Option<Since>,
        category: Category,
    ) -> Result<Vec<TrendingItem>>;
}

impl TrendingClient {
    /// Get the trending listing for `language` (empty for all languages).
    pub async fn get_trending(
        &self,
        language: &str,
        since: Option<Since>,
        category: Category,
    ) -> Result<Vec<TrendingItem>> {
        let mut params = vec![("language", language)];
        if let Some(since) = since {
            params.push(("since", since.as_str()));
        }

        let body = self
            .get_with_params(&format!("/{}", category.as_str()), &params)
            .await?;
        let items: Vec<TrendingItem> = serde_json::from_str(&body)?;
        Ok(items)
    }
}

#[async_trait]
impl TrendingSource for TrendingClient {
    async fn fetch_trending(
        &self,
        language: &str,
        since: Option<Since>,
        category: Category,
    ) -> Result<Vec<TrendingItem>> {
        self.get_trending(language, since, category).await
    }
}
