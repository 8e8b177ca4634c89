//! Exclusion patterns
//!
//! Each configured pattern picks its own dialect:
//! `/.../` is a case-sensitive regex, anything containing `*` or `?` is an
//! anchored glob, and everything else is a case-insensitive substring.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum ExclusionPattern {
    Regex(Regex),
    Glob(Regex),
    Substring(String),
}

impl ExclusionPattern {
    /// Compile one pattern. A regex that fails to compile is reported and
    /// skipped rather than aborting the whole list.
    pub fn parse(pattern: &str) -> Option<Self> {
        if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
            let interior = &pattern[1..pattern.len() - 1];
            return match Regex::new(interior) {
                Ok(re) => Some(ExclusionPattern::Regex(re)),
                Err(err) => {
                    tracing::warn!("Ignoring invalid exclusion regex {pattern}: {err}");
                    None
                }
            };
        }

        if pattern.contains('*') || pattern.contains('?') {
            let mut source = String::with_capacity(pattern.len() + 8);
            source.push('^');
            for ch in pattern.chars() {
                match ch {
                    '*' => source.push_str(".*"),
                    '?' => source.push('.'),
                    other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                }
            }
            source.push('$');
            return match Regex::new(&source) {
                Ok(re) => Some(ExclusionPattern::Glob(re)),
                Err(err) => {
                    tracing::warn!("Ignoring invalid exclusion glob {pattern}: {err}");
                    None
                }
            };
        }

        Some(ExclusionPattern::Substring(pattern.to_lowercase()))
    }

    pub fn is_match(&self, url: &str) -> bool {
        match self {
            ExclusionPattern::Regex(re) | ExclusionPattern::Glob(re) => re.is_match(url),
            ExclusionPattern::Substring(needle) => url.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// A compiled list of exclusion patterns.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| ExclusionPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when any pattern matches. An empty list never matches.
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}

/// One-shot form of [`ExclusionList::matches`] for uncompiled patterns.
pub fn matches<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    ExclusionList::new(patterns).matches(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_dialects_exclude_and_admit() {
        let list = ExclusionList::new(&["/health", "*.bundle", r"/\/v\d+\//"]);
        assert!(list.matches("http://localhost:8081/health"));
        assert!(list.matches("http://localhost:8081/app.bundle"));
        assert!(list.matches("https://api.example.com/v2/users"));
        assert!(!list.matches("https://api.example.com/users"));
    }

    #[test]
    fn empty_list_never_matches() {
        let empty: [&str; 0] = [];
        assert!(!matches("https://anything", &empty));
        assert!(ExclusionList::new(&empty).is_empty());
    }

    #[test]
    fn substring_is_case_insensitive() {
        assert!(matches("https://API.example.com/Symbolicate", &["symbolicate"]));
        assert!(matches("https://api.example.com/users", &["EXAMPLE.COM"]));
    }

    #[test]
    fn regex_is_case_sensitive() {
        assert!(matches("https://x/Users/1", &["/Users/"]));
        assert!(!matches("https://x/users/1", &["/U[s]ers/"]));
    }

    #[test]
    fn glob_is_anchored_and_escapes_metacharacters() {
        assert!(matches("https://cdn.example.com/a.js", &["https://cdn.*"]));
        assert!(!matches("http://x/https://cdn.example.com", &["https://cdn.*"]));
        assert!(matches("https://x/v1", &["https://x/v?"]));
        assert!(!matches("https://x/v10", &["https://x/v?"]));
        // The dot is literal, not "any character".
        assert!(!matches("https://x/appXbundle", &["*.bundle"]));
        assert!(matches("https://x/a+b(1).json", &["*a+b(1).json"]));
    }

    #[test]
    fn short_slash_patterns_are_substrings() {
        // "//" is too short to be a regex.
        assert!(matches("https://x", &["//"]));
        assert!(!matches("http:x", &["//"]));
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let list = ExclusionList::new(&["/(unclosed/", "/health"]);
        assert!(list.matches("https://x/health"));
        assert!(!list.matches("https://x/(unclosed"));
    }
}
