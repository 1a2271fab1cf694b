//! Response envelopes
//!
//! Resource endpoints answer `{success, message, data, meta?}`. The auth
//! endpoints are also accepted flat, see [`unwrap_data`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Single-resource envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: T,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub pagination: Pagination,
}

/// List envelope with pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn pagination(&self) -> Pagination {
        self.meta.pagination
    }
}

/// The payload of a `{data: {...}}` wrapper, or the value itself when it is
/// not wrapped.
pub fn unwrap_data(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if map.get("data").is_some_and(|d| d.is_object()) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

/// Decode `T` from a flat or `data`-wrapped body.
pub fn decode_lenient<T: DeserializeOwned>(value: serde_json::Value) -> serde_json::Result<T> {
    serde_json::from_value(unwrap_data(value))
}
