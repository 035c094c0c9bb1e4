// src/ingest/types.rs
use async_trait::async_trait;

/// Result of one fetch. Failures are absorbed into `Empty` with a short reason for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Text(String),
    Empty(String),
}

/// One fetch attempt against one source. Discarded after aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub url: String,
    /// Extracted body, already truncated. Always empty when `fetch_succeeded` is false.
    pub text: String,
    pub truncated_length: usize,
    pub fetch_succeeded: bool,
}

impl SourceDocument {
    pub fn from_outcome(url: &str, outcome: FetchOutcome, char_limit: usize) -> Self {
        match outcome {
            FetchOutcome::Text(body) => {
                let text: String = body.chars().take(char_limit).collect();
                Self {
                    url: url.to_string(),
                    truncated_length: text.chars().count(),
                    text,
                    fetch_succeeded: true,
                }
            }
            FetchOutcome::Empty(_) => Self::empty(url),
        }
    }

    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            text: String::new(),
            truncated_length: 0,
            fetch_succeeded: false,
        }
    }

    /// Origin tag placed in front of every chunk.
    pub fn tag(&self) -> String {
        format!("[[SOURCE: {}]]\n", self.url)
    }
}

/// Fetches a page and returns its headline/paragraph text.
/// Implementations must never fail: every error becomes `FetchOutcome::Empty`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_fetch_has_empty_text() {
        let d = SourceDocument::from_outcome("http://x", FetchOutcome::Empty("timeout".into()), 10);
        assert!(!d.fetch_succeeded);
        assert_eq!(d.text, "");
        assert_eq!(d.truncated_length, 0);
    }

    #[test]
    fn body_is_truncated_by_chars_not_bytes() {
        let d = SourceDocument::from_outcome("http://x", FetchOutcome::Text("ééééé".into()), 3);
        assert_eq!(d.text, "ééé");
        assert_eq!(d.truncated_length, 3);
        assert!(d.fetch_succeeded);
    }
}
