// src/ingest/mod.rs
//! Source ingestion: page fetch, headline/paragraph extraction and the bounded dump
//! that feeds the prompt composer.

pub mod fetcher;
pub mod types;

use crate::ingest::types::{SourceDocument, SourceFetcher};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Blank line between chunks.
const CHUNK_SEPARATOR: &str = "\n\n";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "briefing_source_fetch_total",
            "Source fetches by outcome (ok/empty)."
        );
        describe_histogram!("briefing_source_fetch_ms", "Source fetch time in milliseconds.");
        describe_counter!("briefing_dumps_total", "Aggregated dumps built.");
        describe_histogram!("briefing_dump_chars", "Size of aggregated dumps in characters.");
    });
}

/// Extract text of `h1`, `h2` and `p` elements in document order, joined with single spaces.
pub fn extract_text(html: &str) -> String {
    static RE_NOISE: OnceCell<Regex> = OnceCell::new();
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();

    let re_noise = RE_NOISE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
            .expect("noise regex")
    });
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>|<h2\b[^>]*>(.*?)</h2\s*>|<p\b[^>]*>(.*?)</p\s*>")
            .expect("block regex")
    });

    let cleaned = re_noise.replace_all(html, " ");
    let mut parts = Vec::new();
    for caps in re_blocks.captures_iter(&cleaned) {
        let inner = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let text = normalize_text(inner);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join(" ")
}

/// Normalize inline markup: strip tags, decode entities, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let stripped = re_tags.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&stripped).to_string();

    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// Ordered `(url, text)` entries rendered into one tagged blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedDump {
    entries: Vec<(String, String)>,
    rendered: String,
}

impl AggregatedDump {
    /// Render documents in order; every chunk (tag + body + separator) is capped at `per_source_chars`.
    pub fn from_documents(docs: Vec<SourceDocument>, per_source_chars: usize) -> Self {
        let mut rendered = String::new();
        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            let chunk = format!("{}{}{}", doc.tag(), doc.text, CHUNK_SEPARATOR);
            rendered.extend(chunk.chars().take(per_source_chars));
            entries.push((doc.url, doc.text));
        }
        Self { entries, rendered }
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn char_len(&self) -> usize {
        self.rendered.chars().count()
    }

    /// True when no source contributed any body text.
    pub fn has_no_content(&self) -> bool {
        self.entries.iter().all(|(_, t)| t.is_empty())
    }
}

/// Body budget left for a source once its tag and separator are accounted for.
pub fn body_budget(url: &str, per_source_chars: usize) -> usize {
    let overhead = SourceDocument::empty(url).tag().chars().count() + CHUNK_SEPARATOR.len();
    per_source_chars.saturating_sub(overhead)
}

/// Fetch one source into a document whose body is truncated to `char_limit` characters.
pub async fn fetch_document(
    fetcher: &dyn SourceFetcher,
    url: &str,
    char_limit: usize,
) -> SourceDocument {
    let outcome = fetcher.fetch(url).await;
    SourceDocument::from_outcome(url, outcome, char_limit)
}

/// Fetch every source concurrently and concatenate in source-list order.
/// Never fails: dead sources contribute a bare tag.
pub async fn aggregate(
    fetcher: &dyn SourceFetcher,
    sources: &[String],
    per_source_chars: usize,
) -> AggregatedDump {
    ensure_metrics_described();

    let docs = join_all(
        sources
            .iter()
            .map(|url| fetch_document(fetcher, url, body_budget(url, per_source_chars))),
    )
    .await;

    let failed = docs.iter().filter(|d| !d.fetch_succeeded).count();
    let dump = AggregatedDump::from_documents(docs, per_source_chars);

    counter!("briefing_dumps_total").increment(1);
    histogram!("briefing_dump_chars").record(dump.char_len() as f64);
    tracing::info!(
        target: "ingest",
        fetcher = fetcher.name(),
        sources = sources.len(),
        failed,
        chars = dump.char_len(),
        "dump aggregated"
    );
    dump
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FetchOutcome;

    #[test]
    fn extract_keeps_only_headings_and_paragraphs() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head>
            <body><nav>menu</nav><h1>Bitcoin&nbsp;rallies</h1>
            <div>ignored</div><p class="x">ETF <b>inflows</b>
            surge.</p><h3>skip</h3><h2>Levels</h2><script>var p = "<p>no</p>";</script></body></html>"#;
        assert_eq!(extract_text(html), "Bitcoin rallies ETF inflows surge. Levels");
    }

    #[test]
    fn extract_of_non_markup_is_empty() {
        assert_eq!(extract_text("{\"json\": true}"), "");
        assert_eq!(extract_text(""), "");
    }

    #[test]
    fn paragraph_regex_does_not_match_similar_tags() {
        assert_eq!(extract_text("<pre>code</pre><param>x</param><p>ok</p>"), "ok");
    }

    #[test]
    fn chunks_respect_per_source_budget() {
        let docs = vec![
            SourceDocument::from_outcome("http://a", FetchOutcome::Text("x".repeat(500)), 500),
            SourceDocument::empty("http://b"),
        ];
        let dump = AggregatedDump::from_documents(docs, 100);
        assert!(dump.char_len() <= 200);
        assert!(dump.as_str().starts_with("[[SOURCE: http://a]]\n"));
        assert!(dump.as_str().contains("[[SOURCE: http://b]]\n\n\n"));
    }

    #[test]
    fn body_budget_subtracts_tag_overhead() {
        // "[[SOURCE: http://a]]\n" is 21 chars, separator 2.
        assert_eq!(body_budget("http://a", 100), 77);
        assert_eq!(body_budget("http://a", 10), 0);
    }
}
