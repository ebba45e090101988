//! Scheduler and per-artifact state machine.
//!
//! Every artifact moves `pending -> downloading -> (completed | failed |
//! skipped | cancelled)`, with `paused` a reversible sibling of
//! `downloading`. Auxiliary files are fetched inside `adapter.fetch`
//! sequentially, so per-artifact progress is monotone.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use airlift_adapters::{AdapterContext, AdapterSet, FetchedFile};
use airlift_core::events::{DownloadStatus, ProgressEvent};
use airlift_core::{PauseGate, ResolvedArtifact};
use airlift_util::error::AirliftError;

/// Progress events are throttled to one per artifact per this window;
/// state transitions always pass through.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(300);

/// Retry budget for one artifact; partials resume across attempts.
const ARTIFACT_RETRIES: u32 = 3;

/// Receives throttled progress and state-change events.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Terminal record for one artifact.
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    pub artifact: ResolvedArtifact,
    pub status: DownloadStatus,
    pub files: Vec<FetchedFile>,
    pub error: Option<String>,
}

/// The pipeline's summary: one record per flat-list entry, in input
/// order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub results: Vec<ArtifactResult>,
}

impl FetchReport {
    pub fn completed(&self) -> usize {
        self.count(DownloadStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(DownloadStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(DownloadStatus::Cancelled)
    }

    fn count(&self, status: DownloadStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Whether the session ended by cancellation rather than completion.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled() > 0
    }
}

/// Bounded-concurrency scheduler over a flat list.
pub struct FetchPipeline {
    adapters: Arc<AdapterSet>,
    ctx: AdapterContext,
    pause: PauseGate,
    sink: ProgressSink,
}

impl FetchPipeline {
    pub fn new(adapters: Arc<AdapterSet>, ctx: AdapterContext, sink: ProgressSink) -> Self {
        Self {
            adapters,
            ctx,
            pause: PauseGate::new(),
            sink,
        }
    }

    /// The pause gate shared by every in-flight transfer.
    pub fn pause_gate(&self) -> PauseGate {
        self.pause.clone()
    }

    /// Download every artifact, bounded by the configured concurrency.
    ///
    /// Cancellation leaves already-completed artifacts alone, marks
    /// everything else `cancelled`, and returns normally; the caller
    /// decides whether to seal a bundle.
    pub async fn run(&self, flat_list: &[ResolvedArtifact]) -> miette::Result<FetchReport> {
        let concurrency = self.ctx.config.effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set = JoinSet::new();

        for (position, artifact) in flat_list.iter().cloned().enumerate() {
            self.emit_state(&artifact, DownloadStatus::Pending, 0, None, None);

            let adapter = self.adapters.get(artifact.ecosystem)?;
            let ctx = self.ctx.clone();
            let pause = self.pause.clone();
            let sink = self.sink.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if ctx.cancel.is_cancelled() {
                    return (
                        position,
                        ArtifactResult {
                            status: DownloadStatus::Cancelled,
                            files: Vec::new(),
                            error: None,
                            artifact,
                        },
                    );
                }

                let result = fetch_with_retry(adapter.as_ref(), &ctx, &artifact, &pause, &sink)
                    .await;
                (position, result)
            });
        }

        let mut results: Vec<Option<ArtifactResult>> = vec![None; flat_list.len()];
        while let Some(joined) = join_set.join_next().await {
            let (position, result) = joined.map_err(|e| AirliftError::Network {
                message: format!("fetch task panicked: {e}"),
            })?;
            self.emit_state(
                &result.artifact,
                result.status,
                0,
                None,
                result.error.clone(),
            );
            results[position] = Some(result);
        }

        Ok(FetchReport {
            results: results.into_iter().flatten().collect(),
        })
    }

    fn emit_state(
        &self,
        artifact: &ResolvedArtifact,
        status: DownloadStatus,
        downloaded: u64,
        total: Option<u64>,
        error: Option<String>,
    ) {
        (self.sink)(ProgressEvent {
            id: artifact.key(),
            status,
            progress: progress_percent(downloaded, total.or(artifact.size)),
            downloaded,
            total: total.or(artifact.size),
            speed: 0,
            error,
        });
    }
}

fn progress_percent(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => ((downloaded * 100) / total).min(100) as u8,
        _ => 0,
    }
}

/// Drive one artifact through the adapter with the retry budget.
async fn fetch_with_retry(
    adapter: &dyn airlift_adapters::EcosystemAdapter,
    ctx: &AdapterContext,
    artifact: &ResolvedArtifact,
    pause: &PauseGate,
    sink: &ProgressSink,
) -> ArtifactResult {
    let throttle = Mutex::new((Instant::now() - PROGRESS_INTERVAL, 0u64));
    let id = artifact.key();
    let size = artifact.size;
    let sink_ref = sink.clone();
    let paused = pause.clone();
    let progress = move |downloaded: u64, total: Option<u64>| {
        let mut guard = throttle.lock().unwrap();
        let (last_emit, last_bytes) = *guard;
        let elapsed = last_emit.elapsed();
        if elapsed < PROGRESS_INTERVAL {
            return;
        }
        let speed = if elapsed.as_secs_f64() > 0.0 {
            ((downloaded.saturating_sub(last_bytes)) as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };
        *guard = (Instant::now(), downloaded);
        let status = if paused.is_paused() {
            DownloadStatus::Paused
        } else {
            DownloadStatus::Downloading
        };
        sink_ref(ProgressEvent {
            id: id.clone(),
            status,
            progress: progress_percent(downloaded, total.or(size)),
            downloaded,
            total: total.or(size),
            speed,
            error: None,
        });
    };

    let mut last_error = String::new();
    for attempt in 1..=ARTIFACT_RETRIES {
        if ctx.cancel.is_cancelled() {
            return ArtifactResult {
                artifact: artifact.clone(),
                status: DownloadStatus::Cancelled,
                files: Vec::new(),
                error: None,
            };
        }
        match adapter.fetch(ctx, artifact, pause, &progress).await {
            Ok(outcome) => {
                return ArtifactResult {
                    artifact: artifact.clone(),
                    status: DownloadStatus::Completed,
                    files: outcome.files,
                    error: None,
                };
            }
            Err(e) => {
                if e.downcast_ref::<AirliftError>()
                    .map(AirliftError::is_cancelled)
                    .unwrap_or(false)
                {
                    return ArtifactResult {
                        artifact: artifact.clone(),
                        status: DownloadStatus::Cancelled,
                        files: Vec::new(),
                        error: None,
                    };
                }
                last_error = e.to_string();
                tracing::warn!(
                    "fetch attempt {attempt} for {} failed: {last_error}",
                    artifact.file_name
                );
            }
        }
    }

    ArtifactResult {
        artifact: artifact.clone(),
        status: DownloadStatus::Failed,
        files: Vec::new(),
        error: Some(last_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_core::{BundleConfig, Ecosystem, RepoDescriptor};
    use airlift_net::{CacheStore, Transport};
    use airlift_util::hash::{sha256_bytes, Checksum};
    use std::sync::Mutex as StdMutex;

    fn context(cache: &std::path::Path) -> AdapterContext {
        AdapterContext::new(
            Transport::new().unwrap(),
            CacheStore::new(cache),
            BundleConfig::default(),
        )
    }

    fn npm_artifact(server: &str, name: &str, body: &[u8]) -> ResolvedArtifact {
        ResolvedArtifact {
            ecosystem: Ecosystem::Npm,
            name: name.to_string(),
            version: "1.0.0".to_string(),
            architecture: None,
            url: format!("{server}/{name}.tgz"),
            file_name: format!("{name}.tgz"),
            size: Some(body.len() as u64),
            checksum: Some(Checksum::Sha256(sha256_bytes(body))),
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("npm", server),
            is_root: true,
            requested_by: None,
        }
    }

    fn collecting_sink() -> (ProgressSink, Arc<StdMutex<Vec<ProgressEvent>>>) {
        let seen: Arc<StdMutex<Vec<ProgressEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |event| {
            sink_seen.lock().unwrap().push(event);
        });
        (sink, seen)
    }

    #[tokio::test]
    async fn downloads_whole_flat_list() {
        let mut server = mockito::Server::new_async().await;
        let body_a = vec![1u8; 2048];
        let body_b = vec![2u8; 1024];
        let _a = server
            .mock("GET", "/pkg-a.tgz")
            .with_body(body_a.clone())
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/pkg-b.tgz")
            .with_body(body_b.clone())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let (sink, events) = collecting_sink();
        let pipeline = FetchPipeline::new(Arc::new(AdapterSet::standard()), ctx, sink);

        let flat = vec![
            npm_artifact(&server.url(), "pkg-a", &body_a),
            npm_artifact(&server.url(), "pkg-b", &body_b),
        ];
        let report = pipeline.run(&flat).await.unwrap();
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.results[0].files.len(), 1);
        assert!(report.results[0].files[0].path.is_file());

        let events = events.lock().unwrap();
        // pending precedes the terminal state for each artifact
        for artifact in &flat {
            let key = artifact.key();
            let states: Vec<DownloadStatus> = events
                .iter()
                .filter(|e| e.id == key)
                .map(|e| e.status)
                .collect();
            assert_eq!(states.first(), Some(&DownloadStatus::Pending));
            assert_eq!(states.last(), Some(&DownloadStatus::Completed));
        }
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/bad.tgz")
            .with_body(b"corrupted".to_vec())
            .expect_at_least(2)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let (sink, _) = collecting_sink();
        let pipeline = FetchPipeline::new(Arc::new(AdapterSet::standard()), ctx, sink);

        let mut artifact = npm_artifact(&server.url(), "bad", b"expected-bytes");
        artifact.size = Some(9); // matches the corrupted body length
        let report = pipeline.run(&[artifact]).await.unwrap();
        assert_eq!(report.failed(), 1);
        let error = report.results[0].error.as_deref().unwrap();
        assert!(error.contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn cancellation_marks_unstarted_as_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        ctx.cancel.cancel();
        let (sink, _) = collecting_sink();
        let pipeline = FetchPipeline::new(Arc::new(AdapterSet::standard()), ctx, sink);

        let flat = vec![
            npm_artifact("http://127.0.0.1:1", "never-a", b"x"),
            npm_artifact("http://127.0.0.1:1", "never-b", b"y"),
        ];
        let report = pipeline.run(&flat).await.unwrap();
        assert_eq!(report.cancelled(), 2);
        assert!(report.was_cancelled());
    }

    #[tokio::test]
    async fn completed_artifact_survives_cache_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 512];
        let mock = server
            .mock("GET", "/once.tgz")
            .with_body(body.clone())
            .expect(1)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let (sink, _) = collecting_sink();
        let pipeline =
            FetchPipeline::new(Arc::new(AdapterSet::standard()), ctx.clone(), sink.clone());
        let artifact = npm_artifact(&server.url(), "once", &body);

        let first = pipeline.run(std::slice::from_ref(&artifact)).await.unwrap();
        assert_eq!(first.completed(), 1);
        // Second run serves from the content-addressed cache.
        let second = pipeline.run(std::slice::from_ref(&artifact)).await.unwrap();
        assert_eq!(second.completed(), 1);
        mock.assert_async().await;
    }
}
