// Trending query and cache keys.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::github::{Category, Since};

/// Language entry meaning "all languages". `"all"` is accepted as an alias.
pub const ALL_LANGUAGES: &str = "";

/// Prefix of the logical cache key for trending listings.
const CACHE_KEY_PREFIX: &str = "trending_";

/// A trending request: which languages, over which window, of which kind.
///
/// Languages are a set: they are trimmed, deduplicated and sorted on
/// construction so logically equal queries share a cache key. The languages
/// exactly as the caller passed them are kept for the unprefixed store key,
/// which older records were written under.
#[derive(Debug, Clone)]
pub struct Query {
    languages: Vec<String>,
    requested: Vec<String>,
    since: Option<Since>,
    category: Category,
}

/// Serialized form of a query; field order is part of the key.
#[derive(Serialize)]
struct KeyView<'a> {
    lang: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<Since>,
    #[serde(rename = "type")]
    category: Category,
}

impl Query {
    pub fn new<I, L>(languages: I, since: Option<Since>, category: Category) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let requested: Vec<String> = languages.into_iter().map(Into::into).collect();
        let mut languages: Vec<String> = requested
            .iter()
            .map(|lang| {
                let lang = lang.trim();
                if lang.eq_ignore_ascii_case("all") {
                    ALL_LANGUAGES.to_string()
                } else {
                    lang.to_string()
                }
            })
            .collect();
        languages.sort();
        languages.dedup();

        Self {
            languages,
            requested,
            since,
            category,
        }
    }

    /// Query over all languages.
    pub fn all(since: Option<Since>, category: Category) -> Self {
        Self::new([ALL_LANGUAGES], since, category)
    }

    /// Normalized languages, sorted.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn since(&self) -> Option<Since> {
        self.since
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// True when the query is unscoped: no languages, or the all-languages entry.
    pub fn is_all_languages(&self) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == ALL_LANGUAGES)
    }

    /// Languages to request upstream, one request each.
    pub fn fetch_languages(&self) -> Vec<&str> {
        if self.is_all_languages() {
            vec![ALL_LANGUAGES]
        } else {
            self.languages.iter().map(String::as_str).collect()
        }
    }

    /// JSON form of the query with languages in caller order. This is the
    /// unprefixed store key of legacy records and the stale fallback.
    pub fn raw_key(&self) -> Result<String> {
        self.to_json(&self.requested)
    }

    /// Unprefixed keys to check for an existing record: the caller-order form
    /// first, then the normalized form when it differs.
    pub fn legacy_keys(&self) -> Result<Vec<String>> {
        let raw = self.raw_key()?;
        let canonical = self.to_json(&self.languages)?;
        if raw == canonical {
            Ok(vec![raw])
        } else {
            Ok(vec![raw, canonical])
        }
    }

    /// Logical key for the cache engine. Built from the normalized languages.
    pub fn cache_key(&self) -> Result<String> {
        Ok(format!("{}{}", CACHE_KEY_PREFIX, self.to_json(&self.languages)?))
    }

    fn to_json(&self, lang: &[String]) -> Result<String> {
        Ok(serde_json::to_string(&KeyView {
            lang,
            since: self.since,
            category: self.category,
        })?)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.languages == other.languages
            && self.since == other.since
            && self.category == other.category
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.languages.hash(state);
        self.since.hash(state);
        self.category.hash(state);
    }
}

/// Cache lifetime for a listing over `since`. Shared by fresh fetches and migrations.
pub fn ttl_for(since: Option<Since>) -> Duration {
    const HOUR: u64 = 60 * 60;
    match since {
        Some(Since::Daily) => Duration::from_secs(2 * HOUR),
        Some(Since::Weekly) => Duration::from_secs(6 * HOUR),
        Some(Since::Monthly) => Duration::from_secs(12 * HOUR),
        None => Duration::from_secs(4 * HOUR),
    }
}
