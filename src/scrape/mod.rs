//! Fetch a URL and extract the descendant URLs from its content.
//!
//! The HTTP side lives behind the [`Fetcher`] trait so the worker can be
//! driven in tests without a network. Only `text/*` bodies are downloaded at
//! all, and only `text/html` gets URL extraction.

pub mod extract;

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("webharvest/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("invalid target URL {0:?}")]
    InvalidTarget(String),
}

/// A fetched document: its mime, and its body when the content was `text/*`.
#[derive(Debug, Clone)]
pub struct FetchedDoc {
    pub mime: String,
    pub body: Option<String>,
}

/// HTTP boundary of the scrape step.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDoc, ScrapeError>;
}

/// Production fetcher: reqwest with a client-level timeout and a bounded
/// body read.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(max_body_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");

        HttpFetcher {
            client,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDoc, ScrapeError> {
        let response = self.client.get(url).send().await?;

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| match v.find(';') {
                Some(i) => v[..i].to_string(),
                None => v.to_string(),
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        // Non-text content never gets parsed; skip the body entirely.
        if !mime.starts_with("text") {
            return Ok(FetchedDoc { mime, body: None });
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(ScrapeError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedDoc {
            mime,
            body: Some(String::from_utf8_lossy(&body).into_owned()),
        })
    }
}

/// Fetch `target_url` and return its mime plus the deduplicated descendant
/// URLs found in the document.
pub async fn scrape<F: Fetcher + ?Sized>(
    fetcher: &F,
    target_url: &str,
) -> Result<(String, Vec<String>), ScrapeError> {
    let doc = fetcher.fetch(target_url).await?;

    let body = match doc.body {
        Some(ref body) if doc.mime == "text/html" => body,
        // Other text subtypes are fetched but not expanded.
        _ => return Ok((doc.mime, Vec::new())),
    };

    let target = Url::parse(target_url)
        .map_err(|_| ScrapeError::InvalidTarget(target_url.to_string()))?;

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for candidate in extract::find_urls(body) {
        if let Some(resolved) = extract::resolve(&target, &candidate) {
            if seen.insert(resolved.clone()) {
                urls.push(resolved);
            }
        }
    }

    Ok((doc.mime, urls))
}
