//! Paginated, rate-limited retrieval of collections.
//!
//! Two paging styles exist upstream. The annotation server pages by number
//! and signals exhaustion with a 404 or an empty page; the task server pages
//! by offset and signals exhaustion with a short page. Both are driven by the
//! same loop in [`Fetcher::fetch_all`], parameterized by [`Pagination`].

use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RATE_LIMIT_POLL;
use crate::error::{HarvesterError, Result};
use crate::http::HttpGet;

/// Header carrying the number of requests left in the current window.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Header carrying the epoch timestamp at which the window resets.
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// How an endpoint is paged and how exhaustion is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `?page=n` from 0, body `{ total, items }`; ends on 404 or an empty page.
    PageNumber,

    /// `?offset=n&limit=l&all=1`, body is an array; ends on a short page.
    Offset { limit: usize },
}

impl fmt::Display for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageNumber => write!(f, "page"),
            Self::Offset { limit } => write!(f, "offset:{limit}"),
        }
    }
}

/// One decoded page.
#[derive(Debug, Default)]
struct Page {
    items: Vec<Value>,
    total: Option<u64>,
}

/// Wire shape of a page-numbered collection page.
#[derive(Debug, Deserialize)]
struct NumberedPage {
    #[serde(default)]
    total: Option<u64>,
    items: Vec<Value>,
}

impl Pagination {
    /// URL of the page to request next.
    ///
    /// `page` counts requests made so far, `fetched` counts items received.
    fn page_url(&self, endpoint: &Url, page: usize, fetched: usize) -> Url {
        let mut url = endpoint.clone();
        match self {
            Self::PageNumber => {
                url.query_pairs_mut()
                    .append_pair("page", &page.to_string());
            }
            Self::Offset { limit } => {
                url.query_pairs_mut()
                    .append_pair("offset", &fetched.to_string())
                    .append_pair("limit", &limit.to_string())
                    .append_pair("all", "1");
            }
        }
        url
    }

    fn parse_page(&self, url: &Url, body: &[u8]) -> Result<Page> {
        let invalid = |e: serde_json::Error| HarvesterError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        };
        match self {
            Self::PageNumber => {
                let page: NumberedPage = serde_json::from_slice(body).map_err(invalid)?;
                Ok(Page {
                    items: page.items,
                    total: page.total,
                })
            }
            Self::Offset { .. } => {
                let items: Vec<Value> = serde_json::from_slice(body).map_err(invalid)?;
                Ok(Page { items, total: None })
            }
        }
    }

    /// Whether a page of `count` items is the final one.
    ///
    /// An empty page always ends the harvest, even with a zero limit.
    fn is_last(&self, count: usize) -> bool {
        match self {
            Self::PageNumber => count == 0,
            Self::Offset { limit } => count == 0 || count < *limit,
        }
    }
}

/// Rate limit state advertised by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests left in the current window.
    pub remaining: u64,

    /// When the window resets.
    pub reset: DateTime<Utc>,
}

impl RateLimit {
    /// Read rate limit headers; `None` when either is absent or unparseable.
    ///
    /// The reset header is epoch seconds and may carry a fractional part.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let remaining = header(RATE_LIMIT_REMAINING)?.parse::<u64>().ok()?;
        let reset_secs = header(RATE_LIMIT_RESET)?.parse::<f64>().ok()?;
        if !reset_secs.is_finite() {
            return None;
        }
        let reset = DateTime::from_timestamp_millis((reset_secs * 1000.0) as i64)?;

        Some(Self { remaining, reset })
    }

    /// Whether the quota for the current window is used up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Sequential, rate-limit aware collection fetcher.
pub struct Fetcher<H> {
    http: H,
    poll_interval: Duration,
    show_progress: bool,
}

impl<H: HttpGet> Fetcher<H> {
    /// Create a fetcher over an HTTP capability.
    pub fn new(http: H) -> Self {
        Self {
            http,
            poll_interval: RATE_LIMIT_POLL,
            show_progress: false,
        }
    }

    /// Set the poll interval of the rate limit wait loop.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Draw a progress bar on stderr while fetching.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The underlying HTTP capability.
    pub fn http(&self) -> &H {
        &self.http
    }

    /// Fetch every item of a paged endpoint.
    ///
    /// Pages are requested strictly in order. Between pages, an exhausted
    /// rate limit blocks the thread until the advertised reset time. Any
    /// non-404 failure aborts the whole harvest; nothing partial is returned.
    pub fn fetch_all(&self, endpoint: &Url, pagination: Pagination) -> Result<Vec<Value>> {
        let progress = self.progress_bar(endpoint);
        let result = self.fetch_pages(endpoint, pagination, &progress);
        progress.finish_and_clear();
        result
    }

    fn fetch_pages(
        &self,
        endpoint: &Url,
        pagination: Pagination,
        progress: &ProgressBar,
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut page_number = 0;

        loop {
            let url = pagination.page_url(endpoint, page_number, items.len());
            debug!(url = %url, page = page_number, "Fetching page");

            let response = self.http.get(&url)?;
            if response.is_not_found() {
                debug!(page = page_number, "Page not found, collection exhausted");
                break;
            }
            if !response.is_success() {
                return Err(HarvesterError::HttpStatus {
                    url: url.to_string(),
                    status: response.status,
                });
            }

            let page = pagination.parse_page(&url, &response.body)?;
            if let Some(total) = page.total {
                set_total(progress, total);
            }

            let count = page.items.len();
            items.extend(page.items);
            progress.inc(count as u64);

            if pagination.is_last(count) {
                debug!(page = page_number, count, "Last page reached");
                break;
            }

            if let Some(limit) = RateLimit::from_headers(&response.headers) {
                if limit.is_exhausted() {
                    self.wait_for_reset(limit.reset, progress);
                }
            }

            page_number += 1;
        }

        info!(
            endpoint = %endpoint,
            items = items.len(),
            pages = page_number + 1,
            "Harvest complete"
        );
        Ok(items)
    }

    /// Block until `reset` has passed, polling at the configured interval.
    fn wait_for_reset(&self, reset: DateTime<Utc>, progress: &ProgressBar) {
        warn!(reset = %reset, "Rate limit reached, waiting for reset");
        progress.set_message("Waiting for rate limit reset...");
        while Utc::now() < reset {
            thread::sleep(self.poll_interval);
        }
        progress.set_message("Downloading");
    }

    fn progress_bar(&self, endpoint: &Url) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {pos} items")
                .expect("valid template"),
        );
        pb.set_message("Downloading");
        debug!(endpoint = %endpoint, "Progress bar enabled");
        pb
    }
}

/// Switch a spinner to a bar once the server advertises a total.
fn set_total(progress: &ProgressBar, total: u64) {
    if progress.length() == Some(total) {
        return;
    }
    progress.set_length(total);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} annotations")
            .expect("valid template"),
    );
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::http::HttpResponse;

    /// Serves scripted responses in order and records every request.
    #[derive(Default)]
    struct ScriptedHttp {
        responses: RefCell<VecDeque<HttpResponse>>,
        requests: RefCell<Vec<(Url, DateTime<Utc>)>>,
    }

    impl ScriptedHttp {
        fn push(&self, response: HttpResponse) {
            self.responses.borrow_mut().push_back(response);
        }

        fn requested_urls(&self) -> Vec<String> {
            self.requests
                .borrow()
                .iter()
                .map(|(url, _)| url.to_string())
                .collect()
        }
    }

    impl HttpGet for ScriptedHttp {
        fn get(&self, url: &Url) -> Result<HttpResponse> {
            self.requests.borrow_mut().push((url.clone(), Utc::now()));
            Ok(self.responses.borrow_mut().pop_front().unwrap_or(HttpResponse {
                status: 404,
                ..HttpResponse::default()
            }))
        }
    }

    fn json_response(body: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            ..HttpResponse::default()
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://annotations.example.org/annotations/playbills-results/").unwrap()
    }

    #[test]
    fn test_page_number_stops_on_404() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!({"total": 3, "items": [{"id": 1}, {"id": 2}]})));
        http.push(json_response(json!({"total": 3, "items": [{"id": 3}]})));
        http.push(status(404));
        http.push(json_response(json!({"total": 3, "items": [{"id": 99}]})));

        let fetcher = Fetcher::new(&http);
        let items = fetcher.fetch_all(&endpoint(), Pagination::PageNumber).unwrap();

        let ids: Vec<i64> = items.iter().filter_map(|v| v["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            http.requested_urls(),
            vec![
                "https://annotations.example.org/annotations/playbills-results/?page=0",
                "https://annotations.example.org/annotations/playbills-results/?page=1",
                "https://annotations.example.org/annotations/playbills-results/?page=2",
            ]
        );
    }

    #[test]
    fn test_page_number_stops_on_empty_page() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!({"total": 1, "items": [{"id": 1}]})));
        http.push(json_response(json!({"total": 1, "items": []})));
        http.push(json_response(json!({"total": 1, "items": [{"id": 2}]})));

        let items = Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(http.requested_urls().len(), 2);
    }

    #[test]
    fn test_empty_collection_is_success() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!({"total": 0, "items": []})));

        let items = Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap();
        assert!(items.is_empty());

        let http = ScriptedHttp::default();
        http.push(status(404));
        let items = Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_offset_stops_on_short_page() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!([{"id": 1}, {"id": 2}])));
        http.push(json_response(json!([{"id": 3}])));

        let endpoint = Url::parse("https://tasks.example.org/api/task").unwrap();
        let items = Fetcher::new(&http)
            .fetch_all(&endpoint, Pagination::Offset { limit: 2 })
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(
            http.requested_urls(),
            vec![
                "https://tasks.example.org/api/task?offset=0&limit=2&all=1",
                "https://tasks.example.org/api/task?offset=2&limit=2&all=1",
            ]
        );
    }

    #[test]
    fn test_offset_with_zero_limit_stops_on_empty_page() {
        let http = ScriptedHttp::default();
        for _ in 0..3 {
            http.push(json_response(json!([])));
        }

        let endpoint = Url::parse("https://tasks.example.org/api/task").unwrap();
        let items = Fetcher::new(&http)
            .fetch_all(&endpoint, Pagination::Offset { limit: 0 })
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(
            http.requested_urls(),
            vec!["https://tasks.example.org/api/task?offset=0&limit=0&all=1"]
        );
    }

    #[test]
    fn test_server_error_aborts_harvest() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!({"total": 4, "items": [{"id": 1}]})));
        http.push(status(500));

        let err = Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap_err();

        assert!(matches!(err, HarvesterError::HttpStatus { status: 500, .. }));
        assert_eq!(http.requested_urls().len(), 2);
    }

    #[test]
    fn test_malformed_page_is_invalid_response() {
        let http = ScriptedHttp::default();
        http.push(json_response(json!({"unexpected": true})));

        let err = Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidResponse { .. }));
    }

    #[test]
    fn test_waits_for_rate_limit_reset() {
        let reset_secs = Utc::now().timestamp() + 2;
        let reset = DateTime::from_timestamp(reset_secs, 0).unwrap();

        let http = ScriptedHttp::default();
        let mut limited = json_response(json!({"total": 2, "items": [{"id": 1}]}));
        limited
            .headers
            .insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        limited.headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_str(&reset_secs.to_string()).unwrap(),
        );
        http.push(limited);
        http.push(json_response(json!({"total": 2, "items": [{"id": 2}]})));
        http.push(status(404));

        let items = Fetcher::new(&http)
            .with_poll_interval(Duration::from_millis(20))
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap();

        assert_eq!(items.len(), 2);
        let requests = http.requests.borrow();
        assert!(
            requests[1].1 >= reset,
            "second request issued at {} before reset {}",
            requests[1].1,
            reset
        );
    }

    #[test]
    fn test_remaining_quota_does_not_wait() {
        let far_future = Utc::now().timestamp() + 3600;

        let http = ScriptedHttp::default();
        let mut response = json_response(json!({"total": 1, "items": [{"id": 1}]}));
        response
            .headers
            .insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("10"));
        response.headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_str(&far_future.to_string()).unwrap(),
        );
        http.push(response);

        let started = Utc::now();
        Fetcher::new(&http)
            .fetch_all(&endpoint(), Pagination::PageNumber)
            .unwrap();
        assert!(Utc::now() - started < chrono::Duration::seconds(5));
    }

    #[test]
    fn test_rate_limit_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(RateLimit::from_headers(&headers), None);

        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        assert_eq!(RateLimit::from_headers(&headers), None);

        headers.insert(RATE_LIMIT_RESET, HeaderValue::from_static("1500000000.5"));
        let limit = RateLimit::from_headers(&headers).unwrap();
        assert!(limit.is_exhausted());
        assert_eq!(limit.reset.timestamp_millis(), 1_500_000_000_500);

        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("many"));
        assert_eq!(RateLimit::from_headers(&headers), None);
    }

    #[test]
    fn test_pagination_display() {
        assert_eq!(Pagination::PageNumber.to_string(), "page");
        assert_eq!(Pagination::Offset { limit: 100 }.to_string(), "offset:100");
    }
}
