use serde::Serialize;

use crate::models::StoredRequest;
use std::sync::Arc;

/// Summary statistics over a set of stored requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total_requests: usize,
    /// Responses with status >= 400
    pub error_count: usize,
    pub avg_duration: u64,
    pub min_duration: u64,
    pub max_duration: u64,
    pub p95_duration: u64,
    /// Sum of response sizes in bytes
    pub total_bandwidth: u64,
}

impl RequestStats {
    pub fn from_requests(requests: &[Arc<StoredRequest>]) -> Self {
        if requests.is_empty() {
            return Self::default();
        }

        let mut durations: Vec<u64> = requests.iter().map(|r| r.duration).collect();
        durations.sort_unstable();
        let n = durations.len();
        let sum: u64 = durations.iter().sum();
        let p95_index = (n as f64 * 0.95).floor() as usize;

        Self {
            total_requests: n,
            error_count: requests.iter().filter(|r| r.status >= 400).count(),
            avg_duration: (sum as f64 / n as f64).round() as u64,
            min_duration: durations[0],
            max_duration: durations[n - 1],
            p95_duration: durations.get(p95_index).copied().unwrap_or(durations[n - 1]),
            total_bandwidth: requests.iter().map(|r| r.response_size).sum(),
        }
    }

    /// Fraction of responses with status >= 400; zero when empty.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_requests as f64
        }
    }
}
