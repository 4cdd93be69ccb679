//! Fetching listing pages over HTTP with retry and encoding detection.
//!
//! # Architecture
//!
//! - [`Fetch`]: Core trait defining an async page fetch
//! - [`HttpFetcher`]: `reqwest`-backed implementation
//! - [`RetryFetch`]: Decorator that adds a [`RetryPolicy`] to any [`Fetch`] implementation
//!
//! # Retry Strategy
//!
//! The default policy makes at most 3 attempts with a fixed 5 second pause
//! between them. Any failure is retried: connection errors, timeouts, and
//! non-2xx statuses alike. After the last attempt the last error is returned
//! unchanged.
//!
//! # Encoding
//!
//! Response bytes are decoded with, in order of preference: a byte order
//! mark, the `Content-Type` charset, a `<meta>` charset declaration near the
//! top of the page, and finally statistical detection over the bytes.

use crate::error::FetchError;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::bytes::Regex;
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// How far into the body to look for a `<meta>` charset declaration.
const META_SNIFF_LEN: usize = 1024;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
        .expect("meta charset pattern is valid")
});

/// A fetched page: the raw bytes, the encoding they were decoded with, and the text.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// The URL that was requested.
    pub url: String,
    /// The response body as received.
    pub bytes: Vec<u8>,
    /// The encoding used to produce `text`.
    pub encoding: &'static Encoding,
    /// The decoded body.
    pub text: String,
}

impl RawDocument {
    /// Decode `bytes`, honouring `declared` when it names a known encoding.
    pub fn decode(url: &str, bytes: Vec<u8>, declared: Option<&str>) -> Self {
        let encoding = detect_encoding(&bytes, declared);
        let (text, used, had_errors) = encoding.decode(&bytes);
        if had_errors {
            debug!(%url, encoding = used.name(), "Replaced malformed byte sequences while decoding");
        }
        let text = text.into_owned();
        Self {
            url: url.to_string(),
            bytes,
            encoding: used,
            text,
        }
    }

    /// Parse the decoded text into an HTML document.
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.text)
    }
}

/// Pick the encoding for `bytes`.
pub fn detect_encoding(bytes: &[u8], declared: Option<&str>) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if let Some(encoding) = declared.and_then(|label| Encoding::for_label(label.trim().as_bytes())) {
        return encoding;
    }
    let head = &bytes[..bytes.len().min(META_SNIFF_LEN)];
    if let Some(encoding) = META_CHARSET
        .captures(head)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return encoding;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

/// Pull the `charset` parameter out of a `Content-Type` header value.
pub fn charset_from_content_type(value: &str) -> Option<&str> {
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(val.trim().trim_matches(|c| c == '"' || c == '\''))
        } else {
            None
        }
    })
}

/// Trait for fetching a page.
///
/// The pipeline is generic over this so tests can serve pages from memory.
pub trait Fetch {
    /// Fetch `url` and return its decoded body.
    async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError>;
}

/// Plain HTTP fetcher. Makes exactly one request per call.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type)
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(http_err)?;

        let document = RawDocument::decode(url, bytes.to_vec(), declared.as_deref());
        debug!(
            bytes = document.bytes.len(),
            encoding = document.encoding.name(),
            "Fetched page"
        );
        Ok(document)
    }
}

/// When to try again after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// `attempts` tries in total, `delay` apart.
    Fixed { attempts: usize, delay: Duration },
    /// `attempts` tries in total; the pause doubles from `base_delay`, is
    /// capped at `max_delay`, and gets 0-250ms of random jitter.
    Exponential {
        attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts, never less than one.
    pub fn attempts(&self) -> usize {
        match *self {
            RetryPolicy::Fixed { attempts, .. } | RetryPolicy::Exponential { attempts, .. } => {
                attempts.max(1)
            }
        }
    }

    /// The pause after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        match *self {
            RetryPolicy::Fixed { delay, .. } => delay,
            RetryPolicy::Exponential {
                base_delay,
                max_delay,
                ..
            } => {
                let shift = attempt.saturating_sub(1).min(31) as u32;
                let delay = base_delay.saturating_mul(1 << shift).min(max_delay);
                let jitter_ms: u64 = rng().random_range(0..=250);
                delay.saturating_add(Duration::from_millis(jitter_ms))
            }
        }
    }
}

/// Wrapper that retries any [`Fetch`] implementation according to a [`RetryPolicy`].
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
        let total_t0 = Instant::now();
        let max = self.policy.attempts();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(document) => return Ok(document),
                Err(e) => {
                    if attempt >= max {
                        error!(
                            attempt,
                            max,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        max,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "fetch attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
