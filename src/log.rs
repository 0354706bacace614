use tracing::{debug, error, info, trace, warn, Level};

/// Destination for the client's diagnostic messages.
///
/// Failures never propagate out of a search, so this is the only place a
/// caller learns about retries and bad responses. Install a custom sink with
/// [`crate::UnsplashSearcher::set_log_sink`].
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Default sink: forwards every message as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => error!(target: "unsplash_search", "{}", message),
            Level::WARN => warn!(target: "unsplash_search", "{}", message),
            Level::INFO => info!(target: "unsplash_search", "{}", message),
            Level::DEBUG => debug!(target: "unsplash_search", "{}", message),
            _ => trace!(target: "unsplash_search", "{}", message),
        }
    }
}
