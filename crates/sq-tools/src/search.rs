//! Search result types and their plain-text rendering.

use serde::{Deserialize, Serialize};

/// Rendered when a search succeeds with no entries.
pub const NO_RESULTS: &str = "No relevant results found.";

/// One web page returned by the search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry")]
pub struct SearchEntry {
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(rename = "datePublished", skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
}

impl SearchEntry {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            summary: summary.into(),
            date_published: None,
        }
    }
}

/// Wire shape of a `webPages.value` item. The long `summary` is only present
/// when requested, so the short `snippet` stands in for it otherwise.
#[derive(Deserialize)]
struct RawEntry {
    #[serde(alias = "title")]
    name: String,
    url: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(rename = "datePublished", alias = "date_published", default)]
    date_published: Option<String>,
}

impl From<RawEntry> for SearchEntry {
    fn from(raw: RawEntry) -> Self {
        let summary = raw
            .summary
            .filter(|s| !s.is_empty())
            .or(raw.snippet)
            .unwrap_or_default();
        Self {
            title: raw.name,
            url: raw.url,
            summary,
            date_published: raw.date_published,
        }
    }
}

/// Entries in the order the provider ranked them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub entries: Vec<SearchEntry>,
}

impl SearchResults {
    pub fn new(entries: Vec<SearchEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Numbered citation blocks for the answer model.
    pub fn to_citation_text(&self) -> String {
        if self.entries.is_empty() {
            return NO_RESULTS.to_string();
        }

        let mut text = String::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            text.push_str(&format!(
                "Citation: {}\nTitle: {}\nURL: {}\nContent: {}\n",
                idx + 1,
                entry.title,
                entry.url,
                entry.summary
            ));
        }
        text.trim().to_string()
    }
}
