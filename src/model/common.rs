use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = Uuid;

pub fn generate_id() -> Id {
    Uuid::new_v4()
}

/// Parse a raw string as an entity id. Only canonical hyphenated UUIDs are
/// accepted so that names which happen to be 32 hex digits stay names.
pub fn parse_id(raw: &str) -> Option<Id> {
    let raw = raw.trim();
    if raw.len() != 36 {
        return None;
    }
    Uuid::parse_str(raw).ok()
}

/// A raw path/CLI argument classified as either an entity id or a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrName {
    Id(Id),
    Name(String),
}

impl IdOrName {
    pub fn parse(raw: &str) -> Self {
        match parse_id(raw) {
            Some(id) => IdOrName::Id(id),
            None => IdOrName::Name(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for IdOrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrName::Id(id) => write!(f, "{}", id),
            IdOrName::Name(name) => f.write_str(name),
        }
    }
}

/// Paginated list envelope returned by every `GET {path}` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total_item_count: usize,
    #[serde(default = "default_page_count")]
    pub page_count: u32,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page_count() -> u32 {
    1
}

fn default_page() -> u32 {
    1
}

impl<T> Page<T> {
    /// Whether this page, fetched as page `requested`, ends the listing.
    /// The echoed `page` field is not trusted; servers may omit it.
    pub fn is_last(&self, requested: u32) -> bool {
        self.items.is_empty() || requested >= self.page_count
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
