use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Body(String),
    /// The source has no URL configured for this signal.
    Skipped,
}

/// Source of raw gateway dumps.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the text behind `url`. An empty `url` yields
    /// [`FetchOutcome::Skipped`] without any I/O.
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}

/// Plain HTTP GET with a per-request timeout.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            // Gateways drop idle keep-alive connections between cycles.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        if url.is_empty() {
            return Ok(FetchOutcome::Skipped);
        }

        let to_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    source: e,
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(to_error)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(to_error)?;
        Ok(FetchOutcome::Body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_is_skipped_without_request() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.fetch("").await.unwrap(), FetchOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
        let url = format!("http://{addr}/stats");
        let started = std::time::Instant::now();
        let result = fetcher.fetch(&url).await;

        assert!(
            matches!(&result, Err(FetchError::Timeout { url: u }) if *u == url),
            "unexpected result: {result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on loopback is closed on test machines.
        let result = fetcher.fetch("http://127.0.0.1:9/stats").await;
        assert!(result.is_err());
    }
}
