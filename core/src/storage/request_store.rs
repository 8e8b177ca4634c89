use crate::filter::fuzzy::{filter_requests, DEFAULT_THRESHOLD};
use crate::models::StoredRequest;
use crate::storage::stats::RequestStats;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Ordered, shareable snapshot of stored requests (most recent first).
pub type RequestList = Arc<Vec<Arc<StoredRequest>>>;

pub const DEFAULT_MAX_REQUESTS: usize = 500;
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(100);
const SEARCH_HISTORY_LEN: usize = 10;
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Retention limit applied after every flush
    pub max_requests: usize,
    /// How long inbound records are buffered before one atomic flush
    pub batch_interval: Duration,
    /// Fuzzy filter threshold (0.0 = exact only)
    pub fuzzy_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            fuzzy_threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Observable changes, one per state mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Flushed { added: usize },
    Cleared,
    BookmarkToggled { id: u64 },
    ConnectionChanged { connected: bool },
    SessionLoaded { count: usize },
}

#[derive(Default)]
struct StoreState {
    connected: bool,
    client_name: Option<String>,
    requests: RequestList,
    pending: Vec<StoredRequest>,
    flush_task: Option<JoinHandle<()>>,
    /// Bumped whenever a batch is started or abandoned; a timer only flushes
    /// the batch it was started for.
    batch_generation: u64,
    selected_index: usize,
    filter_text: String,
    paused: bool,
    bookmarks_only: bool,
    search_history: Vec<String>,
}

impl StoreState {
    fn flush(&mut self, max_len: usize) -> usize {
        self.flush_task = None;
        if self.pending.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.pending);
        let added = batch.len();
        let mut next: Vec<Arc<StoredRequest>> = Vec::with_capacity(added + self.requests.len());
        next.extend(batch.into_iter().map(Arc::new));
        next.extend(self.requests.iter().cloned());
        next.truncate(max_len);
        self.requests = Arc::new(next);
        added
    }

    fn abandon_batch(&mut self) {
        self.pending.clear();
        self.batch_generation += 1;
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
    }
}

/// In-memory request store shared by the ingestion server and the
/// presentation layer.
pub struct RequestStore {
    state: Arc<Mutex<StoreState>>,
    config: StoreConfig,
    events: broadcast::Sender<StoreEvent>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RequestStore {
    pub fn new(config: StoreConfig) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            config,
            events,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// Buffer an inbound request for the next batch flush.
    ///
    /// Dropped entirely while paused. The first buffered request arms the
    /// batch timer; outside a tokio runtime the batch is flushed inline.
    pub fn add_request(&self, request: StoredRequest) {
        let mut state = lock(&self.state);
        if state.paused {
            return;
        }
        state.pending.insert(0, request);
        if state.flush_task.is_some() {
            return;
        }

        state.batch_generation += 1;
        let generation = state.batch_generation;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let weak = Arc::downgrade(&self.state);
                let interval = self.config.batch_interval;
                let max_len = self.config.max_requests;
                let events = self.events.clone();
                state.flush_task = Some(handle.spawn(async move {
                    tokio::time::sleep(interval).await;
                    flush_batch(weak, generation, max_len, events);
                }));
            }
            Err(_) => {
                let added = state.flush(self.config.max_requests);
                drop(state);
                self.emit(StoreEvent::Flushed { added });
            }
        }
    }

    /// Flush the pending batch immediately instead of waiting for the timer.
    pub fn flush_now(&self) -> usize {
        let mut state = lock(&self.state);
        state.batch_generation += 1;
        if let Some(task) = state.flush_task.take() {
            task.abort();
        }
        let added = state.flush(self.config.max_requests);
        drop(state);
        if added > 0 {
            tracing::debug!("Flushed {} requests", added);
            self.emit(StoreEvent::Flushed { added });
        }
        added
    }

    /// Discard the pending batch and every request that is not bookmarked.
    pub fn clear_requests(&self) {
        {
            let mut state = lock(&self.state);
            state.abandon_batch();
            let kept: Vec<Arc<StoredRequest>> = state
                .requests
                .iter()
                .filter(|r| r.bookmarked)
                .cloned()
                .collect();
            state.requests = Arc::new(kept);
            state.selected_index = 0;
        }
        self.emit(StoreEvent::Cleared);
    }

    /// Flip the bookmark on the request with `id`. Returns false if absent.
    pub fn toggle_bookmark(&self, id: u64) -> bool {
        let found = {
            let mut state = lock(&self.state);
            let Some(pos) = state.requests.iter().position(|r| r.id == id) else {
                return false;
            };
            let requests = Arc::make_mut(&mut state.requests);
            let mut updated = StoredRequest::clone(&requests[pos]);
            updated.bookmarked = !updated.bookmarked;
            requests[pos] = Arc::new(updated);
            true
        };
        self.emit(StoreEvent::BookmarkToggled { id });
        found
    }

    pub fn set_connected(&self, connected: bool, client_name: Option<String>) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.connected != connected;
            state.connected = connected;
            state.client_name = if connected { client_name } else { None };
            changed
        };
        if changed {
            self.emit(StoreEvent::ConnectionChanged { connected });
        }
    }

    pub fn toggle_paused(&self) -> bool {
        let mut state = lock(&self.state);
        state.paused = !state.paused;
        state.paused
    }

    pub fn set_filter_text(&self, text: impl Into<String>) {
        let mut state = lock(&self.state);
        state.filter_text = text.into();
        state.selected_index = 0;
    }

    pub fn toggle_bookmarks_filter(&self) -> bool {
        let mut state = lock(&self.state);
        state.bookmarks_only = !state.bookmarks_only;
        state.bookmarks_only
    }

    pub fn set_selected_index(&self, index: usize) {
        lock(&self.state).selected_index = index;
    }

    pub fn add_search_history(&self, text: &str) {
        let mut state = lock(&self.state);
        if text.is_empty() || state.search_history.iter().any(|h| h == text) {
            return;
        }
        state.search_history.insert(0, text.to_string());
        state.search_history.truncate(SEARCH_HISTORY_LEN);
    }

    /// Replace the collection with a restored session.
    pub fn load_session(&self, requests: Vec<StoredRequest>) {
        let count = requests.len();
        {
            let mut state = lock(&self.state);
            state.abandon_batch();
            state.requests = Arc::new(requests.into_iter().map(Arc::new).collect());
            state.selected_index = 0;
        }
        self.emit(StoreEvent::SessionLoaded { count });
    }

    pub fn requests(&self) -> RequestList {
        Arc::clone(&lock(&self.state).requests)
    }

    /// The visible view, derived from the collection, filter text and
    /// bookmarks-only mode. With neither active this is the collection itself.
    pub fn filtered_requests(&self) -> RequestList {
        let (requests, filter_text, bookmarks_only) = {
            let state = lock(&self.state);
            (
                Arc::clone(&state.requests),
                state.filter_text.clone(),
                state.bookmarks_only,
            )
        };
        let filtered = filter_requests(&requests, &filter_text, self.config.fuzzy_threshold);
        if !bookmarks_only {
            return filtered;
        }
        Arc::new(filtered.iter().filter(|r| r.bookmarked).cloned().collect())
    }

    pub fn get(&self, id: u64) -> Option<Arc<StoredRequest>> {
        lock(&self.state)
            .requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn client_name(&self) -> Option<String> {
        lock(&self.state).client_name.clone()
    }

    pub fn paused(&self) -> bool {
        lock(&self.state).paused
    }

    pub fn bookmarks_only(&self) -> bool {
        lock(&self.state).bookmarks_only
    }

    pub fn filter_text(&self) -> String {
        lock(&self.state).filter_text.clone()
    }

    pub fn selected_index(&self) -> usize {
        lock(&self.state).selected_index
    }

    pub fn search_history(&self) -> Vec<String> {
        lock(&self.state).search_history.clone()
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats::from_requests(&self.requests())
    }

    /// Cancel any pending batch timer. The pending batch is discarded.
    pub fn shutdown(&self) {
        lock(&self.state).abandon_batch();
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Drop for RequestStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn flush_batch(
    state: Weak<Mutex<StoreState>>,
    generation: u64,
    max_len: usize,
    events: broadcast::Sender<StoreEvent>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let added = {
        let mut guard = lock(&state);
        if guard.batch_generation != generation {
            return;
        }
        guard.flush(max_len)
    };
    if added > 0 {
        tracing::debug!("Flushed {} requests", added);
        let _ = events.send(StoreEvent::Flushed { added });
    }
}
