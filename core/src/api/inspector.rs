//! Inspector facade
//!
//! Wires configuration, the request store and the ingestion server together
//! for the binary (or any other front end).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::NetwatchConfig;
use crate::filter::ExclusionList;
use crate::server::{IngestionContext, IngestionServer, ServerError, ServerHandle};
use crate::storage::{self, ExportFormat, RequestStore};

/// Address the ingestion server listens on; devices on the LAN must reach it.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Initialize logging (call once at startup).
///
/// Debug builds log to stderr. Release builds write a daily-rolling file under
/// `log_dir` when one is given, else stderr. A subscriber that is already set
/// is left alone.
pub fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let level = resolve_log_level();

    #[cfg(debug_assertions)]
    {
        let _ = log_dir;
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        match log_dir {
            Some(dir) => {
                use anyhow::Context;
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
                let file_appender = tracing_appender::rolling::daily(dir, "netwatch");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Logging lasts until process exit.
                std::mem::forget(guard);
                let _ = tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }
    }

    tracing::debug!("netwatch v{} logging initialized", crate::VERSION);
    Ok(())
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// A running inspector: store plus ingestion server.
pub struct Inspector {
    store: Arc<RequestStore>,
    context: Arc<IngestionContext>,
    server: Option<ServerHandle>,
    session_path: Option<PathBuf>,
}

impl Inspector {
    /// Bind the configured port on all interfaces and start ingesting.
    pub async fn start(config: &NetwatchConfig) -> Result<Self, ServerError> {
        Self::start_on(DEFAULT_BIND_ADDRESS, config).await
    }

    pub async fn start_on(bind_address: &str, config: &NetwatchConfig) -> Result<Self, ServerError> {
        let store = Arc::new(RequestStore::new(config.store_config()));
        let context = Arc::new(IngestionContext::new(
            Arc::clone(&store),
            ExclusionList::new(&config.ignored_urls),
        ));
        let server = IngestionServer::bind(bind_address, config.port, Arc::clone(&context))
            .await?
            .spawn()?;

        Ok(Self {
            store,
            context,
            server: Some(server),
            session_path: storage::session::default_session_path(),
        })
    }

    /// Use `path` instead of `~/.netwatch/session.json`.
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    pub fn connected_clients(&self) -> Vec<String> {
        self.context.registry().names()
    }

    fn session_path(&self) -> anyhow::Result<&Path> {
        self.session_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("could not resolve session path"))
    }

    /// Persist the current collection (pending batch included).
    pub fn save_session(&self) -> anyhow::Result<PathBuf> {
        self.store.flush_now();
        let path = self.session_path()?;
        storage::save_session_to(&self.store.requests(), path)?;
        Ok(path.to_path_buf())
    }

    /// Load the saved session into the store. Returns the number of
    /// requests restored, or `None` when there is no usable session.
    pub fn restore_session(&self) -> Option<usize> {
        let requests = storage::load_session_from(self.session_path().ok()?)?;
        let count = requests.len();
        if let Some(max_id) = requests.iter().map(|r| r.id).max() {
            self.context.reserve_ids_through(max_id);
        }
        self.store.load_session(requests);
        tracing::info!("Restored {} requests from session", count);
        Some(count)
    }

    pub fn has_session(&self) -> bool {
        self.session_path.as_deref().is_some_and(Path::exists)
    }

    /// Export the visible requests to a timestamped file in the home directory.
    pub fn export(&self, format: ExportFormat) -> anyhow::Result<PathBuf> {
        storage::export_to_file(&self.store.filtered_requests(), format)
    }

    pub fn export_to_dir(&self, format: ExportFormat, dir: &Path) -> anyhow::Result<PathBuf> {
        storage::export_to_dir(&self.store.filtered_requests(), format, dir)
    }

    /// Stop the server and cancel the store's batch timer.
    pub async fn stop(mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
        self.store.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, StoredRequest, StoredRequestData, StoredResponseData};
    use chrono::Utc;
    use serde_json::Value;

    fn config() -> NetwatchConfig {
        NetwatchConfig {
            port: 0,
            ..NetwatchConfig::default()
        }
    }

    fn request(id: u64) -> StoredRequest {
        StoredRequest {
            id,
            timestamp: Utc::now(),
            method: "GET".into(),
            url: format!("https://x/{id}"),
            status: 200,
            duration: 1,
            request_size: 0,
            response_size: 0,
            bookmarked: id == 1,
            request: StoredRequestData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
            response: StoredResponseData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
        }
    }

    #[test]
    #[serial_test::serial]
    fn log_level_follows_rust_log() {
        use tracing::level_filters::LevelFilter;

        let previous = std::env::var("RUST_LOG").ok();
        std::env::set_var("RUST_LOG", "warning");
        assert_eq!(resolve_log_level(), LevelFilter::WARN);
        std::env::set_var("RUST_LOG", "nonsense");
        assert_eq!(resolve_log_level(), LevelFilter::INFO);
        std::env::remove_var("RUST_LOG");
        assert_eq!(resolve_log_level(), LevelFilter::INFO);
        if let Some(value) = previous {
            std::env::set_var("RUST_LOG", value);
        }
    }

    #[tokio::test]
    async fn saves_and_restores_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let inspector = Inspector::start_on("127.0.0.1", &config())
            .await
            .unwrap()
            .with_session_path(&path);
        assert!(!inspector.has_session());
        assert_eq!(inspector.restore_session(), None);

        inspector.store().add_request(request(2));
        inspector.store().add_request(request(1));
        let saved = inspector.save_session().unwrap();
        assert_eq!(saved, path);
        inspector.stop().await;

        let restored = Inspector::start_on("127.0.0.1", &config())
            .await
            .unwrap()
            .with_session_path(&path);
        assert!(restored.has_session());
        assert_eq!(restored.restore_session(), Some(2));
        let ids: Vec<u64> = restored.store().requests().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(restored.store().get(1).unwrap().bookmarked);
        restored.stop().await;
    }

    #[tokio::test]
    async fn captures_after_restore_get_fresh_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        storage::save_session_to(&[Arc::new(request(0)), Arc::new(request(4))], &path).unwrap();

        let inspector = Inspector::start_on("127.0.0.1", &config())
            .await
            .unwrap()
            .with_session_path(&path);
        assert_eq!(inspector.restore_session(), Some(2));

        let frame = serde_json::json!({
            "type": "netwatch.request",
            "id": 0,
            "timestamp": "2025-01-15T12:00:00.000Z",
            "duration": 5,
            "request": {"method": "GET", "url": "https://new", "headers": {}, "body": null, "size": 0},
            "response": {"status": 200, "headers": {}, "body": "", "size": 0}
        });
        inspector
            .context
            .handle_frame(crate::server::ConnectionId::new(), &frame.to_string());
        inspector.store().flush_now();

        let ids: Vec<u64> = inspector.store().requests().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 0, 4]);

        assert!(inspector.store().toggle_bookmark(0));
        assert!(inspector.store().get(0).unwrap().bookmarked);
        assert!(!inspector.store().get(5).unwrap().bookmarked);
        inspector.stop().await;
    }

    #[tokio::test]
    async fn exports_visible_requests() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = Inspector::start_on("127.0.0.1", &config()).await.unwrap();
        inspector.store().load_session(vec![request(1), request(2)]);
        let path = inspector.export_to_dir(ExportFormat::Json, dir.path()).unwrap();
        let exported: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(exported.as_array().unwrap().len(), 2);
        inspector.stop().await;
    }
}
