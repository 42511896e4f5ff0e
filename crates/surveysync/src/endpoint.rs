//! The remote submission endpoint.
//!
//! One call delivers one serialized survey. Any 2xx response is an
//! acknowledgement; everything else is a failure. The endpoint does not
//! promise idempotency, so a survey whose acknowledgement was lost may be
//! recorded twice server-side. Each request carries the payload digest in
//! [`DIGEST_HEADER`] so a cooperating server can drop such duplicates.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::payload::SerializedPayload;

/// Header carrying the BLAKE3 digest of the request body.
pub const DIGEST_HEADER: &str = "X-Submission-Digest";

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY: usize = 200;

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint could not be reached, or the connection broke.
    #[error("endpoint unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint rejected submission ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Result type for delivery attempts.
pub type DeliveryResult = std::result::Result<(), DeliveryError>;

/// Something that accepts serialized surveys.
#[async_trait::async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    /// Human-readable description of the target (for logging).
    fn describe(&self) -> String;

    /// Attempt one delivery. No retries.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the payload was not acknowledged.
    async fn deliver(&self, payload: &SerializedPayload) -> DeliveryResult;
}

/// HTTP implementation: `POST` the payload as JSON.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    url: String,
    http_client: reqwest::Client,
}

impl HttpEndpoint {
    /// Create an endpoint client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let url = config.url.trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::ConfigValidation {
                message: format!("endpoint.url must include http:// or https://: {url}"),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder.build().map_err(|e| Error::ConfigValidation {
            message: format!("failed to create HTTP client: {e}"),
        })?;

        Ok(Self { url, http_client })
    }

    /// The target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl SubmissionEndpoint for HttpEndpoint {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn deliver(&self, payload: &SerializedPayload) -> DeliveryResult {
        let response = self
            .http_client
            .post(&self.url)
            .header(DIGEST_HEADER, payload.digest())
            .body(payload.as_str().to_owned())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: truncate(body.trim(), MAX_ERROR_BODY),
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::TcpListener;

    use crate::payload::SurveyPayload;

    fn config(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            timeout_secs: 5,
        }
    }

    /// Serve exactly one HTTP request with the given status line, returning
    /// the raw request text.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/submit-survey", listener.local_addr().unwrap());

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, server)
    }

    fn payload() -> SerializedPayload {
        SurveyPayload::new()
            .with("language", "pl")
            .with("pa1", 3)
            .serialize()
            .unwrap()
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let err = HttpEndpoint::new(&config("localhost:3000/submit-survey")).unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_describe_is_url() {
        let endpoint = HttpEndpoint::new(&config(" http://localhost:3000/submit-survey ")).unwrap();
        assert_eq!(endpoint.url(), "http://localhost:3000/submit-survey");
        assert_eq!(endpoint.describe(), endpoint.url());
    }

    #[tokio::test]
    async fn test_success_status_is_acknowledgement() {
        let (url, server) = serve_once("200 OK", r#"{"success":true}"#);
        let endpoint = HttpEndpoint::new(&config(&url)).unwrap();

        endpoint.deliver(&payload()).await.unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /submit-survey"));
        assert!(request
            .to_ascii_lowercase()
            .contains("content-type: application/json"));
        assert!(request
            .to_ascii_lowercase()
            .contains(&format!("x-submission-digest: {}", payload().digest())));
        assert!(request.ends_with(payload().as_str()));
    }

    #[tokio::test]
    async fn test_server_error_is_rejection() {
        let (url, server) = serve_once("500 Internal Server Error", "Database error");
        let endpoint = HttpEndpoint::new(&config(&url)).unwrap();

        let err = endpoint.deliver(&payload()).await.unwrap_err();
        server.join().unwrap();
        match err {
            DeliveryError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "Database error");
            }
            other @ DeliveryError::Transport(_) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/submit-survey", listener.local_addr().unwrap());
        drop(listener);

        let endpoint = HttpEndpoint::new(&config(&url)).unwrap();
        let err = endpoint.deliver(&payload()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("żółw", 3), "ż...");
    }
}
