// Trending feed types.
// Query dimensions and the opaque trending record returned upstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Time window of a trending listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Since {
    Daily,
    Weekly,
    Monthly,
}

impl Since {
    pub fn as_str(&self) -> &'static str {
        match self {
            Since::Daily => "daily",
            Since::Weekly => "weekly",
            Since::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Since {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Since {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Since::Daily),
            "weekly" => Ok(Since::Weekly),
            "monthly" => Ok(Since::Monthly),
            other => Err(format!(
                "unknown time window '{other}', expected daily, weekly or monthly"
            )),
        }
    }
}

/// Kind of trending listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Repositories,
    Developers,
}

impl Category {
    /// Path segment for the feed endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Repositories => "repositories",
            Category::Developers => "developers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "repositories" | "repos" => Ok(Category::Repositories),
            "developers" | "devs" => Ok(Category::Developers),
            other => Err(format!(
                "unknown category '{other}', expected repositories or developers"
            )),
        }
    }
}

/// One entry of a trending listing.
///
/// Only `added` (stars gained in the window) is interpreted; everything else
/// is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingItem {
    #[serde(default, deserialize_with = "lenient_count")]
    pub added: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TrendingItem {
    pub fn new(added: u64) -> Self {
        Self {
            added,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Human-readable label: `author/name` for repositories, the username for developers.
    pub fn title(&self) -> String {
        match (self.str_field("author"), self.str_field("name")) {
            (Some(author), Some(name)) => format!("{author}/{name}"),
            (None, Some(name)) => name.to_string(),
            (Some(author), None) => self.str_field("username").unwrap_or(author).to_string(),
            (None, None) => self.str_field("username").unwrap_or("<unnamed>").to_string(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }
}

/// Accept counts as numbers, numeric strings ("1,234"), or null.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => Ok(n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0)),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| !matches!(c, ',' | '_' | ' ')).collect();
            if digits.is_empty() {
                return Ok(0);
            }
            digits
                .parse()
                .map_err(|_| de::Error::custom(format!("invalid count '{s}'")))
        }
        other => Err(de::Error::custom(format!("invalid count {other}"))),
    }
}
