//! Resumable session snapshots
//!
//! The whole request list, bookmarks included, is written to a single
//! well-known file. Loading never fails: a missing or unreadable snapshot is
//! simply "no session".

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::timestamp::iso_millis;
use crate::models::StoredRequest;

pub const SESSION_VERSION: &str = "1.0.0";
const SESSION_DIR: &str = ".netwatch";
const SESSION_FILE: &str = "session.json";

#[derive(Serialize)]
struct SessionSnapshotRef<'a> {
    version: &'static str,
    #[serde(with = "iso_millis")]
    timestamp: DateTime<Utc>,
    requests: &'a [Arc<StoredRequest>],
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSnapshot {
    pub version: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub requests: Vec<StoredRequest>,
}

/// `~/.netwatch/session.json`
pub fn default_session_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(SESSION_DIR).join(SESSION_FILE))
}

pub fn save_session(requests: &[Arc<StoredRequest>]) -> anyhow::Result<PathBuf> {
    let path = default_session_path().context("could not resolve home directory")?;
    save_session_to(requests, &path)?;
    Ok(path)
}

pub fn save_session_to(requests: &[Arc<StoredRequest>], path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating session directory {}", parent.display()))?;
    }
    let snapshot = SessionSnapshotRef {
        version: SESSION_VERSION,
        timestamp: Utc::now(),
        requests,
    };
    let json = serde_json::to_string_pretty(&snapshot).context("serializing session")?;
    std::fs::write(path, json).with_context(|| format!("writing session to {}", path.display()))?;
    tracing::info!("Saved session with {} requests to {}", requests.len(), path.display());
    Ok(())
}

pub fn load_session() -> Option<Vec<StoredRequest>> {
    load_session_from(&default_session_path()?)
}

pub fn load_session_from(path: &Path) -> Option<Vec<StoredRequest>> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SessionSnapshot>(&data) {
        Ok(snapshot) => Some(snapshot.requests),
        Err(err) => {
            tracing::warn!("Ignoring corrupt session file {}: {err}", path.display());
            None
        }
    }
}

pub fn has_session() -> bool {
    default_session_path().is_some_and(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, StoredRequestData, StoredResponseData};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn sample(id: u64, method: &str, status: u16, bookmarked: bool) -> Arc<StoredRequest> {
        Arc::new(StoredRequest {
            id,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, id as u32).unwrap(),
            method: method.into(),
            url: format!("https://api.example.com/items/{id}"),
            status,
            duration: 10 * id,
            request_size: 0,
            response_size: 4,
            bookmarked,
            request: StoredRequestData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
            response: StoredResponseData {
                headers: HeaderMap::new(),
                body: json!("body"),
            },
        })
    }

    #[test]
    fn round_trip_preserves_ids_methods_statuses_and_bookmarks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".netwatch").join("session.json");
        let requests = vec![
            sample(3, "DELETE", 204, true),
            sample(2, "POST", 500, false),
            sample(1, "GET", 200, true),
        ];

        save_session_to(&requests, &path).unwrap();
        let loaded = load_session_from(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        for (original, restored) in requests.iter().zip(&loaded) {
            assert_eq!(original.id, restored.id);
            assert_eq!(original.method, restored.method);
            assert_eq!(original.status, restored.status);
            assert_eq!(original.bookmarked, restored.bookmarked);
            assert_eq!(original.timestamp, restored.timestamp);
        }
    }

    #[test]
    fn snapshot_is_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        save_session_to(&[sample(1, "GET", 200, false)], &path).unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], SESSION_VERSION);
        assert!(raw["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(raw["requests"][0]["timestamp"], "2025-01-15T12:00:01.000Z");
    }

    #[test]
    fn missing_file_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_session_from(&dir.path().join("nope.json")).is_none());
    }

    #[test]
    fn corrupt_file_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_session_from(&path).is_none());
        std::fs::write(&path, r#"{"version":"1.0.0"}"#).unwrap();
        assert!(load_session_from(&path).is_none());
    }
}
