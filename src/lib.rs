//! # Unsplash Search
//!
//! A Rust client for the Unsplash photo search API that collects results
//! across pages, retries transient failures and reports rate-limit quota.
//!
//! ## Main Components
//!
//! - [`UnsplashSearcher`]: runs searches and download tracking
//! - [`ClientConfig`]: host, credentials, paging and retry settings
//! - [`Transport`]: the HTTP seam, with [`ReqwestTransport`] as the default
//! - [`LogSink`]: where retry and failure messages go
//!
//! ## Example
//!
//! ```no_run
//! use unsplash_search::{ClientConfig, UnsplashSearcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // Reads UNSPLASH_ACCESS_KEY from the environment or a .env file
//!     let config = ClientConfig::from_env()?;
//!     let searcher = UnsplashSearcher::new(config)?;
//!
//!     let photos = searcher.search("mountain lake", 45).await;
//!     println!("{} photos, quota {:?}", photos.len(), searcher.rate_limits());
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod log;
pub mod pagination;
pub mod rate_limit;
mod retry;
mod transport;
mod unsplash_searcher;

// Re-export main components for documentation and external use
pub use crate::config::{ClientConfig, ClientConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::log::{LogSink, TracingSink};
pub use crate::pagination::{plan, PagePlan};
pub use crate::rate_limit::{
    next_hour_boundary, parse_rate_limits, RateLimitSnapshot, RateLimitTracker, ResetClock,
};
pub use crate::retry::{run_with_retry, JsonResponse, RequestExecutor, RetryPolicy};
pub use crate::transport::{
    authorization_header, build_url, canonical_header_name, header_lines, RawResponse,
    ReqwestTransport, Transport,
};
pub use crate::unsplash_searcher::{
    AggregationState, SearchRequest, UnsplashSearcher, ORIGINAL_QUERY_FIELD,
};
