use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RANGE};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;

use airlift_core::{CancelToken, PauseGate};
use airlift_util::error::AirliftError;

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);
const INDEX_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_INITIATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Body streaming has no absolute deadline, but bytes must keep arriving.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// One index or artifact request, with the headers registries care about.
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    pub url: String,
    /// Override `Accept` (OCI manifest lists need one).
    pub accept: Option<String>,
    /// Bearer token from a registry auth challenge.
    pub bearer: Option<String>,
    /// Basic credentials for private repositories.
    pub basic: Option<(String, String)>,
}

impl IndexRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(accept) = &self.accept {
            if let Ok(v) = HeaderValue::from_str(accept) {
                headers.insert(ACCEPT, v);
            }
        }
        if let Some(token) = &self.bearer {
            if let Ok(v) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, v);
            }
        }
        headers
    }
}

/// Status and challenge header from a [`Transport::probe`] call.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub status: u16,
    pub www_authenticate: Option<String>,
}

/// HTTPS transport with streaming bodies, byte-range resume, and a bounded
/// retry budget with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new() -> miette::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("airlift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AirliftError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Fetch a full index document into memory.
    ///
    /// Returns `Ok(None)` for 404 so adapters can fall through to the next
    /// repository. 5xx and transport errors retry up to the budget.
    pub async fn fetch_index(
        &self,
        request: &IndexRequest,
        cancel: &CancelToken,
    ) -> miette::Result<Option<Vec<u8>>> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt, &request.url)).await;
            }
            if cancel.is_cancelled() {
                return Err(AirliftError::Cancelled.into());
            }

            let mut req = self
                .client
                .get(&request.url)
                .headers(request.headers())
                .timeout(INDEX_TIMEOUT);
            if let Some((user, pass)) = &request.basic {
                req = req.basic_auth(user, Some(pass));
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status.is_server_error() {
                        last_err = format!("HTTP {status} from {}", request.url);
                        continue;
                    }
                    if !status.is_success() {
                        return Err(AirliftError::IndexUnavailable {
                            message: format!("HTTP {status} fetching {}", request.url),
                        }
                        .into());
                    }
                    let bytes = resp.bytes().await.map_err(|e| AirliftError::Network {
                        message: format!("failed to read response from {}: {e}", request.url),
                    })?;
                    return Ok(Some(bytes.to_vec()));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = e.to_string();
                    continue;
                }
                Err(e) => {
                    return Err(AirliftError::Network {
                        message: format!("request to {} failed: {e}", request.url),
                    }
                    .into());
                }
            }
        }

        Err(AirliftError::IndexUnavailable {
            message: format!(
                "failed after {MAX_RETRIES} attempts for {}: {last_err}",
                request.url
            ),
        }
        .into())
    }

    /// Issue a GET and report only the status and auth challenge header.
    ///
    /// OCI registries answer 401 with a `WWW-Authenticate: Bearer ...`
    /// challenge naming the token realm; this is the only caller.
    pub async fn probe(&self, request: &IndexRequest) -> miette::Result<ProbeResult> {
        let resp = self
            .client
            .get(&request.url)
            .headers(request.headers())
            .timeout(INDEX_TIMEOUT)
            .send()
            .await
            .map_err(|e| AirliftError::Network {
                message: format!("request to {} failed: {e}", request.url),
            })?;
        let www_authenticate = resp
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ProbeResult {
            status: resp.status().as_u16(),
            www_authenticate,
        })
    }

    /// Stream an artifact body to `dest`, resuming from `resume_from` bytes
    /// via a `Range` header when a partial file exists.
    ///
    /// The body is never buffered in memory; each chunk is appended to the
    /// destination and reported through `on_chunk(total_bytes_on_disk)`.
    /// Cancellation is observed between chunks. Returns the final on-disk
    /// byte count.
    pub async fn download(
        &self,
        request: &IndexRequest,
        dest: &Path,
        resume_from: u64,
        cancel: &CancelToken,
        pause: Option<&PauseGate>,
        mut on_chunk: impl FnMut(u64),
    ) -> miette::Result<u64> {
        let mut req = self
            .client
            .get(&request.url)
            .headers(request.headers())
            .timeout(BODY_INITIATION_TIMEOUT);
        if let Some((user, pass)) = &request.basic {
            req = req.basic_auth(user, Some(pass));
        }
        if resume_from > 0 {
            req = req.header(RANGE, format!("bytes={resume_from}-"));
        }

        let resp = req.send().await.map_err(|e| AirliftError::Network {
            message: format!("request to {} failed: {e}", request.url),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AirliftError::FetchFailed {
                message: format!("HTTP {status} fetching {}", request.url),
            }
            .into());
        }

        // A server that ignores Range answers 200 with the full body; start
        // the file over in that case.
        let resumed = status == StatusCode::PARTIAL_CONTENT;
        let mut written: u64 = if resumed { resume_from } else { 0 };

        if let Some(parent) = dest.parent() {
            airlift_util::fs::ensure_dir(parent).map_err(AirliftError::Io)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(dest)
            .await
            .map_err(AirliftError::Io)?;

        let mut stream = resp.bytes_stream();
        loop {
            if let Some(gate) = pause {
                gate.wait_while_paused(cancel).await;
            }
            if cancel.is_cancelled() {
                file.flush().await.map_err(AirliftError::Io)?;
                return Err(AirliftError::Cancelled.into());
            }
            let next = tokio::time::timeout(CHUNK_TIMEOUT, stream.next()).await;
            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    return Err(AirliftError::FetchFailed {
                        message: format!("body stream from {} failed: {e}", request.url),
                    }
                    .into());
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(AirliftError::FetchFailed {
                        message: format!(
                            "no bytes from {} within {CHUNK_TIMEOUT:?}",
                            request.url
                        ),
                    }
                    .into());
                }
            };
            file.write_all(&chunk).await.map_err(AirliftError::Io)?;
            written += chunk.len() as u64;
            on_chunk(written);
        }

        file.flush().await.map_err(AirliftError::Io)?;
        Ok(written)
    }
}

/// Exponential backoff with ±20 % deterministic jitter.
///
/// The jitter is derived from the URL so that concurrent retries against
/// different endpoints do not synchronize, without needing an RNG.
fn backoff_delay(attempt: u32, url: &str) -> Duration {
    let base = BACKOFF_BASE * 2u32.saturating_pow(attempt - 1);
    let seed = url
        .bytes()
        .fold(attempt as u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    // Map the seed into [-20%, +20%]
    let jitter_permille = (seed % 401) as i64 - 200;
    let base_ms = base.as_millis() as i64;
    let jittered = base_ms + base_ms * jitter_permille / 1000;
    Duration::from_millis(jittered.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn backoff_grows_and_stays_within_jitter() {
        let d1 = backoff_delay(1, "https://example.org/a");
        let d2 = backoff_delay(2, "https://example.org/a");
        assert!(d1.as_millis() >= 200 && d1.as_millis() <= 300);
        assert!(d2.as_millis() >= 400 && d2.as_millis() <= 600);
        assert!(d2 > d1);
    }

    #[tokio::test]
    async fn fetch_index_returns_none_for_404() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let transport = Transport::new().unwrap();
        let result = transport
            .fetch_index(&IndexRequest::get(format!("{}/missing", server.url())), &token())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fetch_index_exhausts_retry_budget_on_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let flaky = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;
        let transport = Transport::new().unwrap();
        let err = transport
            .fetch_index(&IndexRequest::get(format!("{}/flaky", server.url())), &token())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed after 3 attempts"));
        flaky.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_index_returns_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/index.json")
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;
        let transport = Transport::new().unwrap();
        let body = transport
            .fetch_index(
                &IndexRequest::get(format!("{}/index.json", server.url())),
                &token(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, b"payload");
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn download_streams_to_disk() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/artifact.bin")
            .with_status(200)
            .with_body(vec![7u8; 4096])
            .create_async()
            .await;
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("artifact.bin");
        let transport = Transport::new().unwrap();
        let mut last_seen = 0;
        let written = transport
            .download(
                &IndexRequest::get(format!("{}/artifact.bin", server.url())),
                &dest,
                0,
                &token(),
                None,
                |n| last_seen = n,
            )
            .await
            .unwrap();
        assert_eq!(written, 4096);
        assert_eq!(last_seen, 4096);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn download_resumes_with_range() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/resumable")
            .match_header("range", "bytes=4-")
            .with_status(206)
            .with_body(b"5678".to_vec())
            .create_async()
            .await;
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("resumable");
        std::fs::write(&dest, b"1234").unwrap();
        let transport = Transport::new().unwrap();
        let written = transport
            .download(
                &IndexRequest::get(format!("{}/resumable", server.url())),
                &dest,
                4,
                &token(),
                None,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"12345678");
    }

    #[tokio::test]
    async fn download_restarts_when_server_ignores_range() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/norange")
            .with_status(200)
            .with_body(b"full-body".to_vec())
            .create_async()
            .await;
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("norange");
        std::fs::write(&dest, b"stale-partial").unwrap();
        let transport = Transport::new().unwrap();
        let written = transport
            .download(
                &IndexRequest::get(format!("{}/norange", server.url())),
                &dest,
                13,
                &token(),
                None,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&dest).unwrap(), b"full-body");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_send() {
        let transport = Transport::new().unwrap();
        let cancel = token();
        cancel.cancel();
        let err = transport
            .fetch_index(&IndexRequest::get("http://127.0.0.1:1/never"), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
