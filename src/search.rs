//! Query pagination over a search provider
//!
//! [`QueryIterator`] turns a paginated [`SearchProvider`] into a lazy,
//! finite sequence of [`Candidate`]s for one query. It stops when the
//! provider returns no continuation token, when the page limit is reached,
//! or when the provider hands back the token it was just given (stall).
//! A failed provider call ends the sequence for that query only; it never
//! propagates past the dispatcher.

use crate::error::{Error, Result};
use crate::types::Candidate;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span, warn};

/// One page of search results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Results on this page, in provider order
    pub items: Vec<Candidate>,
    /// Opaque cursor for the next page, `None` when exhausted
    pub continuation: Option<String>,
}

/// Paginated search backend
///
/// Implementations wrap a remote search index. They are treated as opaque:
/// only the page/continuation contract matters here.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Fetch one page for `query`, starting at `continuation` (first page when `None`)
    async fn search(&self, query: &str, continuation: Option<&str>) -> Result<SearchPage>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Lazy candidate sequence for a single query
///
/// Continuation state lives only inside the iterator, so a query cannot be
/// resumed mid-stream once the iterator is dropped.
pub struct QueryIterator {
    provider: Arc<dyn SearchProvider>,
    query: String,
    page_limit: u32,
    pages_fetched: u32,
    continuation: Option<String>,
    buffer: VecDeque<Candidate>,
    finished: bool,
    span: tracing::Span,
}

impl QueryIterator {
    /// Start iterating `query`; `page_limit` of 0 means no limit
    pub fn new(provider: Arc<dyn SearchProvider>, query: impl Into<String>, page_limit: u32) -> Self {
        let query = query.into();
        let span = info_span!("query", provider = provider.name(), query = %query);
        Self {
            provider,
            query,
            page_limit,
            pages_fetched: 0,
            continuation: None,
            buffer: VecDeque::new(),
            finished: false,
            span,
        }
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Next candidate, fetching pages as needed
    pub async fn next(&mut self) -> Option<Candidate> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            if self.finished {
                return None;
            }
            self.fetch_page().await;
        }
    }

    async fn fetch_page(&mut self) {
        if self.page_limit > 0 && self.pages_fetched >= self.page_limit {
            debug!(parent: &self.span, pages = self.pages_fetched, "page limit reached");
            self.finished = true;
            return;
        }

        let sent = self.continuation.clone();
        let result = self
            .provider
            .search(&self.query, sent.as_deref())
            .instrument(self.span.clone())
            .await;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "search page failed, ending query");
                self.finished = true;
                return;
            }
        };

        self.pages_fetched += 1;
        debug!(
            parent: &self.span,
            page = self.pages_fetched,
            items = page.items.len(),
            "search page received"
        );
        self.buffer.extend(page.items);

        match page.continuation.filter(|token| !token.is_empty()) {
            None => {
                debug!(parent: &self.span, "search exhausted");
                self.finished = true;
            }
            Some(next) if sent.as_deref() == Some(next.as_str()) => {
                warn!(parent: &self.span, "continuation token did not advance, ending query");
                self.finished = true;
            }
            Some(next) => self.continuation = Some(next),
        }
    }
}

/// Search provider backed by a fixed list of URLs
///
/// Every query returns the whole list as one page with no continuation.
/// Useful to harvest a known set of items without searching.
#[derive(Clone, Debug, Default)]
pub struct UrlListProvider {
    candidates: Vec<Candidate>,
}

impl UrlListProvider {
    /// Build from candidates
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Parse `<url> [name]` lines; blank lines and `#` comments are ignored
    pub fn parse(text: &str) -> Result<Self> {
        let mut candidates = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(raw_url) = parts.next() else {
                continue;
            };
            let id = item_id_from_url(raw_url).ok_or_else(|| {
                Error::Search(format!("line {}: cannot derive an id from `{}`", lineno + 1, raw_url))
            })?;
            let title = parts.collect::<Vec<_>>().join(" ");
            candidates.push(Candidate {
                title: if title.is_empty() { id.clone() } else { title },
                id,
                url: raw_url.to_string(),
            });
        }
        Ok(Self { candidates })
    }

    /// Load a URL list file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }

    /// Number of listed candidates
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True when the list is empty
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait]
impl SearchProvider for UrlListProvider {
    async fn search(&self, _query: &str, _continuation: Option<&str>) -> Result<SearchPage> {
        Ok(SearchPage {
            items: self.candidates.clone(),
            continuation: None,
        })
    }

    fn name(&self) -> &'static str {
        "url-list"
    }
}

/// Derive an item identity from its URL
///
/// Uses the `v` query parameter when present, else the last path segment.
pub fn item_id_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v")
        && !v.is_empty()
    {
        return Some(v.into_owned());
    }
    parsed
        .path_segments()?
        .rev()
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
