// Competitor evidence cache operations
//
// Layout: {data_root}/.blueprint/cache/{slug}-{hash8}.json
//
// Keys are normalized queries (lowercased, trimmed, whitespace collapsed)
// so "Note-Taking  Apps " and "note-taking apps" share one entry. Entries
// never expire in this design; fetchedAt and provider are recorded so a
// staleness policy can be added later without a schema change.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{blueprint_dir, ensure_dir, read_json, write_json, FileResult};
use crate::models::CompetitorCandidate;
use crate::utils::short_hash;

const SLUG_MAX_LEN: usize = 40;

/// One cached fan-out result for a normalized query key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<CompetitorCandidate>,
    /// Provider that produced the payload (usually "fan_out" for merged sets)
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
}

/// Normalize a query into a cache key
pub fn normalize_key(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// File-name-safe slug for a normalized key
fn slugify(key: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= SLUG_MAX_LEN {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug
    }
}

/// Get the cache directory for a data root
pub fn cache_dir(root: &Path) -> PathBuf {
    blueprint_dir(root).join("cache")
}

fn cache_path(root: &Path, key: &str) -> PathBuf {
    let hash8 = short_hash(key) & 0xFFFF_FFFF;
    cache_dir(root).join(format!("{}-{:08x}.json", slugify(key), hash8))
}

/// Look up a cached entry for a query. Returns None on a miss.
pub fn get(root: &Path, query: &str) -> FileResult<Option<CacheEntry>> {
    let key = normalize_key(query);
    let path = cache_path(root, &key);
    if !path.is_file() {
        return Ok(None);
    }
    let entry: CacheEntry = read_json(&path)?;
    Ok(Some(entry))
}

/// Store a fan-out result under a query key. Last write wins.
pub fn put(
    root: &Path,
    query: &str,
    payload: Vec<CompetitorCandidate>,
    provider: &str,
) -> FileResult<CacheEntry> {
    let key = normalize_key(query);
    ensure_dir(&cache_dir(root))?;

    let entry = CacheEntry {
        key: key.clone(),
        payload,
        provider: provider.to_string(),
        fetched_at: Utc::now(),
    };
    write_json(&cache_path(root, &key), &entry)?;
    Ok(entry)
}
