use crate::models::{body_text, method_carries_body, StoredRequest};

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a stored request as an equivalent `curl` command line.
pub fn to_curl(request: &StoredRequest) -> String {
    let mut parts = vec![
        "curl".to_string(),
        format!("-X {}", request.method),
        shell_quote(&request.url),
    ];

    for (key, value) in &request.request.headers {
        parts.push(format!("-H {}", shell_quote(&format!("{key}: {value}"))));
    }

    if method_carries_body(&request.method) {
        if let Some(body) = body_text(&request.request.body) {
            parts.push(format!("-d {}", shell_quote(&body)));
        }
    }

    parts.join(" ")
}
