//! Query string encoding for list and search endpoints
//!
//! Lists become repeated `key[]` pairs and nested objects become `key.sub`
//! pairs; `null` values are skipped.

use serde::Serialize;
use url::Url;

use super::error::ApiError;

/// Flatten a serializable filter struct into query pairs.
pub fn to_pairs<T: Serialize>(criteria: &T) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(criteria) else {
        return pairs;
    };

    for (key, value) in map {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Array(values) => {
                let name = format!("{}[]", key);
                pairs.extend(values.iter().filter_map(scalar).map(|v| (name.clone(), v)));
            }
            serde_json::Value::Object(fields) => {
                for (sub, v) in fields {
                    if let Some(v) = scalar(&v) {
                        pairs.push((format!("{}.{}", key, sub), v));
                    }
                }
            }
            other => {
                if let Some(v) = scalar(&other) {
                    pairs.push((key, v));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `path` with the pairs appended as an encoded query string.
pub fn with_query(path: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    // Only used to borrow the encoder; the base is discarded.
    let mut url = match Url::parse("http://query.invalid/") {
        Ok(u) => u,
        Err(_) => return path.to_string(),
    };
    url.query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    match url.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    }
}

/// Absolute path from literal segments, each one percent-encoded on its own
/// so an id can't climb out of its collection.
pub fn resource_path(segments: &[&str]) -> Result<String, ApiError> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(ApiError::InvalidId((*bad).to_string()));
    }
    let mut url = Url::parse("http://path.invalid/")
        .map_err(|e| ApiError::InvalidId(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidId(segments.join("/")))?
        .extend(segments);
    Ok(url.path().to_string())
}

/// `page`/`limit` pairs for paginated listings.
pub fn page(page: u64, limit: u64) -> Vec<(String, String)> {
    vec![
        ("page".to_string(), page.to_string()),
        ("limit".to_string(), limit.to_string()),
    ]
}
