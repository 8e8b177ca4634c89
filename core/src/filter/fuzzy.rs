//! Fuzzy free-text search over captured requests.
//!
//! A request matches when the filter text is within a tunable edit distance
//! of some part of its url, method or status. Scores are normalized edit
//! distances: `0.0` is an exact hit and `1.0` bears no resemblance.

use std::sync::Arc;

use crate::models::StoredRequest;

/// Default similarity threshold; scores above it are rejected.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Longest run of consecutive url tokens compared as one candidate.
const MAX_SPAN_TOKENS: usize = 4;

/// Byte ranges of the alphanumeric runs in `text`.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            start.get_or_insert(idx);
        } else if let Some(s) = start.take() {
            spans.push((s, idx));
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Best normalized distance between `pattern` and any part of `text`.
pub fn score(pattern: &str, text: &str) -> f64 {
    let pattern = pattern.trim().to_lowercase();
    if pattern.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    if text.contains(&pattern) {
        return 0.0;
    }

    let pattern_len = pattern.chars().count();
    let spans = token_spans(&text);
    let mut best = pattern_len;

    for (i, &(start, _)) in spans.iter().enumerate() {
        for &(_, end) in spans.iter().skip(i).take(MAX_SPAN_TOKENS) {
            let span = &text[start..end];
            // Also try the span cut to the pattern's length so a typed prefix
            // of a long token still scores well.
            for candidate in [
                span,
                char_prefix(span, pattern_len),
                char_prefix(span, pattern_len + 1),
            ] {
                best = best.min(strsim::osa_distance(&pattern, candidate));
                if best == 0 {
                    return 0.0;
                }
            }
        }
    }

    (best as f64 / pattern_len as f64).min(1.0)
}

/// Best score of a request across its searchable fields.
pub fn request_score(pattern: &str, request: &StoredRequest) -> f64 {
    let status = request.status.to_string();
    [request.url.as_str(), request.method.as_str(), status.as_str()]
        .into_iter()
        .map(|field| score(pattern, field))
        .fold(1.0, f64::min)
}

/// Filter `requests` by `filter_text`, best matches first.
///
/// An empty filter returns the input list itself rather than a copy.
pub fn filter_requests(
    requests: &Arc<Vec<Arc<StoredRequest>>>,
    filter_text: &str,
    threshold: f64,
) -> Arc<Vec<Arc<StoredRequest>>> {
    if filter_text.trim().is_empty() {
        return Arc::clone(requests);
    }

    let mut scored: Vec<(f64, &Arc<StoredRequest>)> = requests
        .iter()
        .map(|r| (request_score(filter_text, r), r))
        .filter(|(s, _)| *s <= threshold)
        .collect();
    // Stable, so equally good matches keep their recency order.
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    Arc::new(scored.into_iter().map(|(_, r)| Arc::clone(r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, StoredRequestData, StoredResponseData};
    use chrono::Utc;
    use serde_json::Value;

    fn make_request(id: u64, method: &str, url: &str, status: u16) -> Arc<StoredRequest> {
        Arc::new(StoredRequest {
            id,
            timestamp: Utc::now(),
            method: method.into(),
            url: url.into(),
            status,
            duration: 100,
            request_size: 0,
            response_size: 0,
            bookmarked: false,
            request: StoredRequestData {
                headers: HeaderMap::new(),
                body: Value::Null,
            },
            response: StoredResponseData {
                headers: HeaderMap::new(),
                body: Value::String("{}".into()),
            },
        })
    }

    fn ids(list: &[Arc<StoredRequest>]) -> Vec<u64> {
        list.iter().map(|r| r.id).collect()
    }

    #[test]
    fn empty_filter_returns_same_list() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/users", 200),
            make_request(2, "GET", "https://api.example.com/posts", 200),
        ]);
        let filtered = filter_requests(&requests, "", DEFAULT_THRESHOLD);
        assert!(Arc::ptr_eq(&filtered, &requests));
        let filtered = filter_requests(&requests, "   ", DEFAULT_THRESHOLD);
        assert!(Arc::ptr_eq(&filtered, &requests));
    }

    #[test]
    fn filters_by_url() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/users", 200),
            make_request(2, "GET", "https://api.example.com/posts", 200),
        ]);
        assert_eq!(ids(&filter_requests(&requests, "users", DEFAULT_THRESHOLD)), vec![1]);
    }

    #[test]
    fn filters_by_method() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/users", 200),
            make_request(2, "POST", "https://api.example.com/users", 200),
        ]);
        assert_eq!(ids(&filter_requests(&requests, "POST", DEFAULT_THRESHOLD)), vec![2]);
    }

    #[test]
    fn filters_by_status() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/a", 200),
            make_request(2, "GET", "https://api.example.com/b", 404),
        ]);
        assert_eq!(ids(&filter_requests(&requests, "404", DEFAULT_THRESHOLD)), vec![2]);
    }

    #[test]
    fn tolerates_small_typos() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/users", 200),
            make_request(2, "GET", "https://api.example.com/orders", 200),
        ]);
        assert_eq!(ids(&filter_requests(&requests, "usres", DEFAULT_THRESHOLD)), vec![1]);
        assert_eq!(ids(&filter_requests(&requests, "usr", DEFAULT_THRESHOLD)), vec![1]);
    }

    #[test]
    fn exact_matches_rank_before_approximate_ones() {
        let requests = Arc::new(vec![
            make_request(1, "GET", "https://api.example.com/user", 200),
            make_request(2, "GET", "https://api.example.com/users", 200),
        ]);
        assert_eq!(ids(&filter_requests(&requests, "users", DEFAULT_THRESHOLD)), vec![2, 1]);
    }

    #[test]
    fn returns_empty_for_no_matches() {
        let requests = Arc::new(vec![make_request(1, "GET", "https://api.example.com/users", 200)]);
        assert!(filter_requests(&requests, "zzzzzzzzz", DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn threshold_is_tunable() {
        let requests = Arc::new(vec![make_request(1, "GET", "https://api.example.com/users", 200)]);
        assert!(filter_requests(&requests, "usres", 0.0).is_empty());
        assert_eq!(filter_requests(&requests, "usres", 0.4).len(), 1);
    }

    #[test]
    fn score_is_zero_for_substrings() {
        assert_eq!(score("example.com", "https://api.example.com/users"), 0.0);
        assert_eq!(score("USERS", "https://api.example.com/users"), 0.0);
    }
}
