use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use super::har::requests_to_har;
use crate::models::timestamp::to_iso_millis;
use crate::models::StoredRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Har,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Har => "har",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "har" => Ok(ExportFormat::Har),
            "json" => Ok(ExportFormat::Json),
            other => Err(anyhow::anyhow!("Unknown export format: {other}")),
        }
    }
}

/// Direct structural serialization of the full list.
pub fn requests_to_json(requests: &[Arc<StoredRequest>]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(requests)
}

pub fn render(requests: &[Arc<StoredRequest>], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Har => requests_to_har(requests),
        ExportFormat::Json => requests_to_json(requests),
    }
}

/// `netwatch-export-2025-01-15T12-00-00-000Z.har`
fn export_file_name(format: ExportFormat) -> String {
    let stamp = to_iso_millis(&Utc::now()).replace([':', '.'], "-");
    format!("netwatch-export-{stamp}.{}", format.extension())
}

/// Write an export into the user's home directory and return its path.
pub fn export_to_file(requests: &[Arc<StoredRequest>], format: ExportFormat) -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("could not resolve home directory")?;
    export_to_dir(requests, format, &home)
}

pub fn export_to_dir(
    requests: &[Arc<StoredRequest>],
    format: ExportFormat,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let content = render(requests, format).context("serializing export")?;
    let path = dir.join(export_file_name(format));
    std::fs::write(&path, content)
        .with_context(|| format!("writing export to {}", path.display()))?;
    tracing::info!("Exported {} requests to {}", requests.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, StoredRequestData, StoredResponseData};
    use serde_json::{json, Value};

    fn sample(id: u64) -> Arc<StoredRequest> {
        Arc::new(StoredRequest {
            id,
            timestamp: Utc::now(),
            method: "GET".into(),
            url: "https://api.example.com/users".into(),
            status: 200,
            duration: 50,
            request_size: 0,
            response_size: 2,
            bookmarked: id % 2 == 0,
            request: StoredRequestData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
            response: StoredResponseData {
                headers: HeaderMap::new(),
                body: json!("[]"),
            },
        })
    }

    #[test]
    fn json_export_is_the_full_list() {
        let parsed: Value = serde_json::from_str(&requests_to_json(&[sample(1), sample(2)]).unwrap()).unwrap();
        let items = parsed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 1);
        assert_eq!(items[1]["bookmarked"], true);
        assert_eq!(items[0]["responseSize"], 2);
    }

    #[test]
    fn writes_timestamped_files() {
        let dir = tempfile::tempdir().unwrap();

        let har = export_to_dir(&[sample(1)], ExportFormat::Har, dir.path()).unwrap();
        let name = har.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("netwatch-export-"));
        assert!(name.ends_with(".har"));
        assert!(!name.contains(':'));
        let contents: Value = serde_json::from_str(&std::fs::read_to_string(&har).unwrap()).unwrap();
        assert_eq!(contents["log"]["entries"][0]["request"]["url"], "https://api.example.com/users");

        let json = export_to_dir(&[sample(1)], ExportFormat::Json, dir.path()).unwrap();
        assert!(json.to_string_lossy().ends_with(".json"));
    }

    #[test]
    fn write_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(export_to_dir(&[sample(1)], ExportFormat::Json, &missing).is_err());
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("HAR".parse::<ExportFormat>().unwrap(), ExportFormat::Har);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
