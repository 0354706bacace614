use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, Level};

use crate::config::{ClientConfig, DEFAULT_LIMIT, DEFAULT_MAX_PER_PAGE};
use crate::error::{Error, Result};
use crate::log::{LogSink, TracingSink};
use crate::pagination::{self, PagePlan};
use crate::rate_limit::{RateLimitSnapshot, RateLimitTracker};
use crate::retry::RequestExecutor;
use crate::transport::{authorization_header, build_url, ReqwestTransport, Transport};

/// Field added to every returned record.
pub const ORIGINAL_QUERY_FIELD: &str = "original_query";

/// Query keys owned by the pagination loop.
const RESERVED_PARAMS: [&str; 3] = ["query", "page", "per_page"];

/// Parameters of one search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Position of the first record wanted
    pub offset: usize,
    /// Total records wanted
    pub limit: usize,
    pub max_per_page: usize,
    /// Extra filters sent with every page, e.g. `orientation` or `color`
    pub params: Vec<(String, String)>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            offset: 0,
            limit: DEFAULT_LIMIT,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            params: Vec::new(),
        }
    }

    /// Add a query parameter. `query`, `page` and `per_page` are set by the
    /// searcher and are ignored here.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !RESERVED_PARAMS.contains(&key.as_str()) {
            self.params.push((key, value.into()));
        }
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn max_per_page(mut self, max_per_page: usize) -> Self {
        self.max_per_page = max_per_page;
        self
    }
}

/// Loop state of a single search call. Never shared between calls.
#[derive(Debug, Default)]
pub struct AggregationState {
    /// Position of the next record not yet delivered
    pub offset: usize,
    pub accumulated: Vec<Value>,
}

impl AggregationState {
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            accumulated: Vec::new(),
        }
    }

    /// Merge one fetched page, dropping the `skip` records that lie before
    /// the current offset. Returns how many records were merged.
    pub fn merge_page(&mut self, mut records: Vec<Value>, skip: usize) -> usize {
        let skip = skip.min(records.len());
        records.drain(..skip);
        let merged = records.len();
        self.accumulated.extend(records);
        merged
    }

    pub fn into_results(mut self, limit: usize) -> Vec<Value> {
        self.accumulated.truncate(limit);
        self.accumulated
    }
}

/// Client for the Unsplash photo search API.
///
/// Searches are best effort: failures are reported to the log sink and the
/// caller receives whatever records were collected before the failure.
pub struct UnsplashSearcher {
    config: ClientConfig,
    executor: RequestExecutor,
    rate_limits: RateLimitTracker,
    sink: Arc<dyn LogSink>,
}

impl UnsplashSearcher {
    /// Create a new UnsplashSearcher backed by a `reqwest` transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout, &config.user_agent)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a searcher over any [`Transport`]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::MissingApiKey);
        }
        config.validate()?;

        Ok(UnsplashSearcher {
            executor: RequestExecutor::new(transport, config.retry),
            rate_limits: RateLimitTracker::new(config.reset_clock),
            sink: Arc::new(TracingSink),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.config.limit = limit;
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.config.offset = offset;
    }

    pub fn set_max_per_page(&mut self, max_per_page: usize) {
        self.config.max_per_page = max_per_page;
    }

    pub fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sink = sink;
    }

    /// Quota reported by the most recent response, whatever its status.
    pub fn rate_limits(&self) -> Option<RateLimitSnapshot> {
        self.rate_limits.snapshot()
    }

    /// Search for up to `limit` photos, starting at the configured offset.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Value> {
        let request = SearchRequest::new(query)
            .offset(self.config.offset)
            .limit(limit)
            .max_per_page(self.config.max_per_page);
        self.execute(request).await
    }

    /// Search using the configured limit.
    pub async fn search_default(&self, query: &str) -> Vec<Value> {
        self.search(query, self.config.limit).await
    }

    /// Fetch pages until `request.limit` records are collected, the source
    /// runs dry, or a page fails.
    pub async fn execute(&self, request: SearchRequest) -> Vec<Value> {
        if request.limit == 0 {
            return Vec::new();
        }
        let max_per_page = request.max_per_page.max(1);
        let mut state = AggregationState::new(request.offset);

        loop {
            let plan = pagination::plan(state.offset, request.limit, max_per_page);
            debug!(
                "Searching '{}' - offset {} page {} per_page {}",
                request.query, state.offset, plan.page, plan.per_page
            );

            let Some(records) = self.search_page(&request, plan).await else {
                debug!("Stopping search for '{}' at page {}", request.query, plan.page);
                break;
            };

            let fetched = records.len();
            let merged = state.merge_page(records, plan.skip_for(state.offset));
            info!(
                "Collected {} results for '{}' page {} ({} total)",
                merged,
                request.query,
                plan.page,
                state.accumulated.len()
            );

            if state.accumulated.len() >= request.limit {
                break;
            }
            if fetched < max_per_page {
                debug!("No more results for '{}'", request.query);
                break;
            }
            state.offset += merged;
        }

        state.into_results(request.limit)
    }

    /// Fetch, decode and tag one page. `None` when the page is unusable.
    async fn search_page(&self, request: &SearchRequest, plan: PagePlan) -> Option<Vec<Value>> {
        let query = request.query.as_str();
        let mut params = vec![
            ("query", query.to_string()),
            ("page", plan.page.to_string()),
            ("per_page", plan.per_page.to_string()),
        ];
        params.extend(
            request
                .params
                .iter()
                .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
                .map(|(key, value)| (key.as_str(), value.clone())),
        );
        let url = match build_url(&self.config.host, &self.config.search_path, &[], &params) {
            Ok(url) => url,
            Err(e) => {
                self.sink.log(Level::ERROR, &format!("Invalid search URL: {}", e));
                return None;
            }
        };

        let response = self
            .executor
            .execute(
                &url,
                &[self.auth_header()],
                self.sink.as_ref(),
                &self.rate_limits,
            )
            .await
            .ok()?;

        let records = match response.body {
            Value::Object(mut body) => body.remove(&self.config.results_key),
            _ => None,
        };
        match records {
            Some(Value::Array(records)) => Some(tag_records(records, query)),
            _ => {
                let err = Error::MissingResults {
                    field: self.config.results_key.clone(),
                };
                self.sink.log(
                    Level::WARN,
                    &format!(
                        "{} for '{}' page {} (status {})",
                        err, query, plan.page, response.status
                    ),
                );
                None
            }
        }
    }

    /// Tell the API a photo was downloaded. Returns whether the call went
    /// through.
    pub async fn track_download(&self, photo_id: &str) -> bool {
        let url = match build_url(
            &self.config.host,
            &self.config.track_download_path,
            &[("id", photo_id)],
            &[],
        ) {
            Ok(url) => url,
            Err(e) => {
                self.sink.log(Level::ERROR, &format!("Invalid download URL: {}", e));
                return false;
            }
        };

        self.executor
            .execute(
                &url,
                &[self.auth_header()],
                self.sink.as_ref(),
                &self.rate_limits,
            )
            .await
            .is_ok()
    }

    fn auth_header(&self) -> (String, String) {
        authorization_header(&self.config.auth_scheme, &self.config.api_key)
    }
}

impl std::fmt::Debug for UnsplashSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsplashSearcher")
            .field("host", &self.config.host)
            .field("executor", &self.executor)
            .field("rate_limits", &self.rate_limits.snapshot())
            .finish_non_exhaustive()
    }
}

fn tag_records(records: Vec<Value>, query: &str) -> Vec<Value> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(fields) = record.as_object_mut() {
                fields.insert(
                    ORIGINAL_QUERY_FIELD.to_string(),
                    Value::String(query.to_string()),
                );
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::testing::RecordingSink;
    use crate::rate_limit::ResetClock;
    use crate::transport::RawResponse;
    use futures::future::{join_all, BoxFuture};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    type Responder = dyn Fn(&Url) -> Result<RawResponse> + Send + Sync;

    /// Answers every GET with a closure and remembers the URLs it saw.
    struct ScriptedTransport {
        respond: Box<Responder>,
        requests: Mutex<Vec<Url>>,
    }

    impl ScriptedTransport {
        fn new(respond: impl Fn(&Url) -> Result<RawResponse> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                requests: Mutex::new(Vec::new()),
            })
        }

        /// Serves `total` records (`None` for an endless source) with ids
        /// equal to their position.
        fn catalog(total: Option<usize>) -> Arc<Self> {
            Self::new(move |url| {
                let page = query_value(url, "page");
                let per_page = query_value(url, "per_page");
                let start = (page - 1) * per_page;
                let end = match total {
                    Some(total) => (start + per_page).min(total),
                    None => start + per_page,
                };
                let results: Vec<Value> = (start..end.max(start))
                    .map(|id| json!({ "id": id }))
                    .collect();
                Ok(json_response(json!({ "total": total, "results": results })))
            })
        }

        fn requests(&self) -> Vec<Url> {
            self.requests.lock().unwrap().clone()
        }

        fn pages(&self) -> Vec<(usize, usize)> {
            self.requests()
                .iter()
                .map(|url| (query_value(url, "page"), query_value(url, "per_page")))
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn get<'a>(
            &'a self,
            url: &'a Url,
            _headers: &'a [(String, String)],
        ) -> BoxFuture<'a, Result<RawResponse>> {
            self.requests.lock().unwrap().push(url.clone());
            let response = (self.respond)(url);
            Box::pin(async move { response })
        }
    }

    fn query_value(url: &Url, key: &str) -> usize {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse().ok())
            .unwrap()
    }

    fn json_response(body: Value) -> RawResponse {
        RawResponse {
            status: 200,
            body: body.to_string(),
            header_lines: vec![
                "X-Ratelimit-Limit: 50".to_string(),
                "X-Ratelimit-Remaining: 42".to_string(),
            ],
        }
    }

    fn test_config(max_per_page: usize) -> ClientConfig {
        ClientConfig::builder()
            .api_key("test-key")
            .max_per_page(max_per_page)
            .retry(2, Duration::from_millis(1))
            .reset_clock(ResetClock::Server)
            .build()
    }

    fn searcher(
        config: ClientConfig,
        transport: Arc<ScriptedTransport>,
    ) -> (UnsplashSearcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let mut searcher = UnsplashSearcher::with_transport(config, transport).unwrap();
        searcher.set_log_sink(sink.clone());
        (searcher, sink)
    }

    fn ids(records: &[Value]) -> Vec<u64> {
        records.iter().map(|r| r["id"].as_u64().unwrap()).collect()
    }

    #[test]
    fn test_search_request_builder() {
        let request = SearchRequest::new("fox").offset(5).limit(40).max_per_page(20);
        assert_eq!(request.query, "fox");
        assert_eq!(request.offset, 5);
        assert_eq!(request.limit, 40);
        assert_eq!(request.max_per_page, 20);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_search_request_ignores_reserved_params() {
        let request = SearchRequest::new("fox")
            .param("orientation", "landscape")
            .param("page", "9")
            .param("per_page", "99")
            .param("query", "owl");
        assert_eq!(
            request.params,
            vec![("orientation".to_string(), "landscape".to_string())]
        );
    }

    #[tokio::test]
    async fn test_extra_params_sent_with_every_page() {
        let transport = ScriptedTransport::catalog(Some(25));
        let (searcher, _) = searcher(test_config(10), transport.clone());
        let mut request = SearchRequest::new("fox")
            .limit(25)
            .max_per_page(10)
            .param("orientation", "landscape")
            .param("color", "green");
        request.params.push(("page".to_string(), "9".to_string()));

        let results = searcher.execute(request).await;

        assert_eq!(results.len(), 25);
        assert_eq!(transport.pages(), vec![(1, 10), (2, 10), (3, 10)]);
        for url in transport.requests() {
            let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            assert_eq!(
                &pairs[3..],
                &[
                    ("orientation".to_string(), "landscape".to_string()),
                    ("color".to_string(), "green".to_string()),
                ]
            );
            assert_eq!(pairs.iter().filter(|(k, _)| k == "page").count(), 1);
        }
    }

    #[test]
    fn test_merge_page_drops_leading_records() {
        let mut state = AggregationState::new(23);
        let page: Vec<Value> = (20..30).map(|id| json!({ "id": id })).collect();
        assert_eq!(state.merge_page(page, 3), 7);
        assert_eq!(ids(&state.accumulated), (23..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_merge_page_skip_larger_than_page() {
        let mut state = AggregationState::default();
        assert_eq!(state.merge_page(vec![json!(1), json!(2)], 5), 0);
        assert!(state.accumulated.is_empty());
    }

    #[test]
    fn test_with_transport_requires_api_key() {
        let transport = ScriptedTransport::catalog(Some(0));
        let config = ClientConfig::builder().api_key("  ").build();
        assert!(matches!(
            UnsplashSearcher::with_transport(config, transport),
            Err(Error::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_three_pages_until_limit() {
        let transport = ScriptedTransport::catalog(Some(25));
        let (searcher, _) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 25).await;

        assert_eq!(transport.pages(), vec![(1, 10), (2, 10), (3, 10)]);
        assert_eq!(results.len(), 25);
        assert_eq!(ids(&results), (0..25).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r[ORIGINAL_QUERY_FIELD] == "fox"));
    }

    #[tokio::test]
    async fn test_single_page_when_limit_fits() {
        let transport = ScriptedTransport::catalog(None);
        let (searcher, _) = searcher(test_config(30), transport.clone());

        let results = searcher.search("fox", 5).await;

        assert_eq!(transport.pages(), vec![(1, 5)]);
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_first_page_failure_returns_empty() {
        let transport = ScriptedTransport::new(|_| Err(Error::MissingApiKey));
        let (searcher, sink) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 25).await;

        assert!(results.is_empty());
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(sink.count(Level::WARN), 2);
        assert_eq!(sink.count(Level::ERROR), 1);
        assert!(searcher.rate_limits().is_none());
    }

    #[tokio::test]
    async fn test_unaligned_offset_skips_delivered_records() {
        let transport = ScriptedTransport::catalog(None);
        let (mut searcher, _) = searcher(test_config(10), transport.clone());
        searcher.set_offset(23);

        let results = searcher.search("fox", 25).await;

        assert_eq!(transport.pages(), vec![(3, 10), (4, 10), (5, 10)]);
        assert_eq!(ids(&results), (23..48).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_endless_source_stops_at_limit() {
        let transport = ScriptedTransport::catalog(None);
        let (searcher, _) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 95).await;

        assert_eq!(transport.requests().len(), 10);
        assert_eq!(results.len(), 95);
    }

    #[tokio::test]
    async fn test_short_page_ends_search() {
        let transport = ScriptedTransport::catalog(Some(14));
        let (searcher, _) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 50).await;

        assert_eq!(transport.pages(), vec![(1, 10), (2, 10)]);
        assert_eq!(results.len(), 14);
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_partial_results() {
        let transport = ScriptedTransport::new(|url| {
            if query_value(url, "page") == 1 {
                let results: Vec<Value> = (0..10).map(|id| json!({ "id": id })).collect();
                Ok(json_response(json!({ "results": results })))
            } else {
                Err(Error::MissingApiKey)
            }
        });
        let (searcher, sink) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 30).await;

        assert_eq!(results.len(), 10);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(sink.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_missing_results_is_not_retried() {
        let transport =
            ScriptedTransport::new(|_| Ok(json_response(json!({ "errors": ["OAuth error"] }))));
        let (searcher, sink) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 10).await;

        assert!(results.is_empty());
        assert_eq!(transport.requests().len(), 1);
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.contains("no 'results' collection"));
    }

    #[tokio::test]
    async fn test_non_object_records_pass_through() {
        let transport = ScriptedTransport::new(|_| {
            Ok(json_response(json!({ "results": [{ "id": 1 }, "loose", 7] })))
        });
        let (searcher, _) = searcher(test_config(10), transport);

        let results = searcher.search("fox", 10).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0][ORIGINAL_QUERY_FIELD], "fox");
        assert_eq!(results[1], json!("loose"));
        assert_eq!(results[2], json!(7));
    }

    #[tokio::test]
    async fn test_rate_limits_recorded_from_response() {
        let transport = ScriptedTransport::catalog(Some(3));
        let (searcher, _) = searcher(test_config(10), transport);

        searcher.search("fox", 3).await;

        assert_eq!(
            searcher.rate_limits(),
            Some(RateLimitSnapshot {
                remaining: Some(42),
                limit: Some(50),
                reset_at: None,
            })
        );
    }

    #[tokio::test]
    async fn test_exhausted_quota_is_logged() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse {
                status: 200,
                body: json!({ "results": [] }).to_string(),
                header_lines: vec!["X-Ratelimit-Remaining: 0".to_string()],
            })
        });
        let (searcher, sink) = searcher(test_config(10), transport);

        searcher.search("fox", 10).await;

        assert_eq!(sink.count(Level::WARN), 1);
        assert!(sink.entries()[0].1.contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_search_default_uses_configured_limit() {
        let transport = ScriptedTransport::catalog(None);
        let (mut searcher, _) = searcher(test_config(10), transport.clone());
        searcher.set_limit(4);

        let results = searcher.search_default("fox").await;

        assert_eq!(results.len(), 4);
        assert_eq!(transport.pages(), vec![(1, 4)]);
    }

    #[tokio::test]
    async fn test_set_max_per_page() {
        let transport = ScriptedTransport::catalog(None);
        let (mut searcher, _) = searcher(test_config(30), transport.clone());
        searcher.set_max_per_page(8);

        let results = searcher.search("fox", 20).await;

        assert_eq!(results.len(), 20);
        assert_eq!(transport.pages(), vec![(1, 8), (2, 8), (3, 8)]);
    }

    #[tokio::test]
    async fn test_zero_limit_fetches_nothing() {
        let transport = ScriptedTransport::catalog(None);
        let (searcher, _) = searcher(test_config(10), transport.clone());

        assert!(searcher.search("fox", 0).await.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_searches_on_shared_client() {
        let transport = ScriptedTransport::catalog(Some(40));
        let (searcher, _) = searcher(test_config(10), transport.clone());

        let queries = ["fox", "owl", "cat"];
        let results = join_all(queries.iter().map(|q| searcher.search(q, 25))).await;

        for (query, records) in queries.iter().zip(&results) {
            assert_eq!(ids(records), (0..25).collect::<Vec<_>>());
            assert!(records.iter().all(|r| r[ORIGINAL_QUERY_FIELD] == *query));
        }
        assert_eq!(transport.requests().len(), 9);
    }

    #[tokio::test]
    async fn test_track_download() {
        let transport = ScriptedTransport::new(|url| {
            if url.path() == "/photos/abc/download" {
                Ok(json_response(json!({ "url": "https://images.unsplash.com/abc" })))
            } else {
                Err(Error::MissingApiKey)
            }
        });
        let (searcher, sink) = searcher(test_config(10), transport.clone());

        assert!(searcher.track_download("abc").await);
        assert_eq!(searcher.rate_limits().unwrap().remaining, Some(42));
        assert!(sink.entries().is_empty());

        assert!(!searcher.track_download("missing").await);
        assert_eq!(sink.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_quota_recorded_for_unparseable_response() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse {
                status: 403,
                body: "Rate Limit Exceeded".to_string(),
                header_lines: vec![
                    "X-Ratelimit-Limit: 50".to_string(),
                    "X-Ratelimit-Remaining: 0".to_string(),
                ],
            })
        });
        let (searcher, sink) = searcher(test_config(10), transport.clone());

        let results = searcher.search("fox", 5).await;

        assert!(results.is_empty());
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(
            searcher.rate_limits(),
            Some(RateLimitSnapshot {
                remaining: Some(0),
                limit: Some(50),
                reset_at: None,
            })
        );
        assert_eq!(sink.count(Level::ERROR), 1);
    }
}
