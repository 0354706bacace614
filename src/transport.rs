//! HTTP plumbing: the transport seam and the URL builder.

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::Result;

/// Body and headers of one HTTP response, whatever its status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Header lines as `Name: value`.
    pub header_lines: Vec<String>,
}

/// Issues a single GET. Implementations must not retry on their own.
pub trait Transport: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a Url,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<RawResponse>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a Url,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<RawResponse>> {
        Box::pin(async move {
            debug!("Requesting URL: {}", url);
            let mut request = self.client.get(url.clone());
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request.send().await?;

            // Error statuses still carry a body and quota headers worth reading.
            let status = response.status().as_u16();
            let header_lines = header_lines(response.headers());
            let body = response.text().await?;

            Ok(RawResponse {
                status,
                body,
                header_lines,
            })
        })
    }
}

/// Render a header map as `Name: value` lines with canonical name casing.
pub fn header_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some(format!("{}: {}", canonical_header_name(name.as_str()), value))
        })
        .collect()
}

/// `x-ratelimit-remaining` -> `X-Ratelimit-Remaining`.
///
/// The HTTP stack lowercases names, but rate-limit parsing matches the
/// server's casing exactly.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Build `{host}{path}?{query}`, replacing `:name` path segments from
/// `path_params`. Parameter values are percent-encoded.
pub fn build_url(
    host: &str,
    path_template: &str,
    path_params: &[(&str, &str)],
    query: &[(&str, String)],
) -> Result<Url> {
    let mut url = Url::parse(host)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.pop_if_empty();
        for segment in path_template.split('/').filter(|s| !s.is_empty()) {
            let value = segment
                .strip_prefix(':')
                .and_then(|key| path_params.iter().find(|(name, _)| *name == key))
                .map_or(segment, |(_, value)| *value);
            segments.push(value);
        }
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}

/// `Authorization: <scheme> <key>` as a header pair.
pub fn authorization_header(scheme: &str, key: &str) -> (String, String) {
    ("Authorization".to_string(), format!("{} {}", scheme, key))
}
