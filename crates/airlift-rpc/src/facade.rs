//! The engine facade: endpoint implementations and the per-client
//! session lifecycle.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use airlift_adapters::{AdapterContext, AdapterSet};
use airlift_bundle::assemble;
use airlift_core::events::ProgressEvent;
use airlift_core::{BundleConfig, CancelToken, SessionEvent};
use airlift_fetch::{FetchPipeline, ProgressSink};
use airlift_net::{CacheStats, CacheStore, Transport};
use airlift_resolver::{resolve, Resolution};
use airlift_util::error::AirliftError;

use crate::dtos::*;

/// One live download session.
struct Session {
    cancel: CancelToken,
}

/// The process-wide engine behind every RPC endpoint.
///
/// Owns the shared transport and cache store; each `download.start`
/// spawns one session that owns a resolver run, a fetch pool and a
/// cancellation token registered under the caller's `clientId`.
pub struct Engine {
    adapters: Arc<AdapterSet>,
    transport: Transport,
    cache: CacheStore,
    defaults: BundleConfig,
    sessions: Arc<DashMap<String, Session>>,
}

impl Engine {
    pub fn new(defaults: BundleConfig) -> miette::Result<Self> {
        Ok(Self {
            adapters: Arc::new(AdapterSet::standard()),
            transport: Transport::new()?,
            cache: CacheStore::new(&defaults.cache_path),
            defaults,
            sessions: Arc::new(DashMap::new()),
        })
    }

    /// Build an engine over explicit adapters (tests, private mirrors).
    pub fn with_adapters(defaults: BundleConfig, adapters: AdapterSet) -> miette::Result<Self> {
        Ok(Self {
            adapters: Arc::new(adapters),
            transport: Transport::new()?,
            cache: CacheStore::new(&defaults.cache_path),
            defaults,
            sessions: Arc::new(DashMap::new()),
        })
    }

    fn context(&self, options: &ConfigPatch) -> AdapterContext {
        let config = options.apply(&self.defaults);
        AdapterContext::new(self.transport.clone(), self.cache.clone(), config)
    }

    /// `resolve`: expand the closure without downloading anything.
    pub async fn resolve(&self, request: ResolveRequest) -> miette::Result<ResolveResponse> {
        let ctx = self.context(&request.options);
        let resolution = resolve(&self.adapters, &ctx, &request.packages).await?;
        Ok(resolution_response(request.packages, resolution))
    }

    /// `download.start`: run resolve, fetch and assemble as one session,
    /// streaming typed events to the returned receiver.
    pub fn download_start(
        &self,
        request: DownloadRequest,
    ) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = self.context(&request.options);
        let adapters = self.adapters.clone();
        let sessions = self.sessions.clone();
        let client_id = request.client_id.clone();

        sessions.insert(
            client_id.clone(),
            Session {
                cancel: ctx.cancel.clone(),
            },
        );

        tokio::spawn(async move {
            run_session(adapters, ctx, request, tx).await;
            sessions.remove(&client_id);
        });
        rx
    }

    /// `download.cancel`: trip the session's token.
    pub fn download_cancel(&self, request: CancelRequest) -> CancelResponse {
        match self.sessions.get(&request.client_id) {
            Some(session) => {
                session.cancel.cancel();
                CancelResponse { cancelled: true }
            }
            None => CancelResponse { cancelled: false },
        }
    }

    /// `download.checkPath`: inspect an output directory.
    pub fn check_path(&self, request: CheckPathRequest) -> CheckPathResponse {
        let dir = &request.output_dir;
        CheckPathResponse {
            exists: dir.exists(),
            file_count: airlift_util::fs::file_count(dir),
            total_size: airlift_util::fs::dir_size(dir),
        }
    }

    /// `download.clearPath`: empty an output directory.
    pub fn clear_path(&self, request: ClearPathRequest) -> miette::Result<ClearPathResponse> {
        if !request.output_dir.exists() {
            return Ok(ClearPathResponse { deleted: false });
        }
        airlift_util::fs::clear_dir(&request.output_dir).map_err(AirliftError::Io)?;
        Ok(ClearPathResponse { deleted: true })
    }

    /// `search`: adapter-ranked candidates.
    pub async fn search(&self, request: SearchRequest) -> miette::Result<SearchResponse> {
        let ctx = self.context(&request.options);
        let adapter = self.adapters.get(request.ecosystem)?;
        let results = adapter.search(&ctx, &request.query, request.limit).await?;
        Ok(SearchResponse { results })
    }

    /// `listVersions`: ecosystem-native newest-first listing.
    pub async fn list_versions(
        &self,
        request: ListVersionsRequest,
    ) -> miette::Result<ListVersionsResponse> {
        let ctx = self.context(&request.options);
        let adapter = self.adapters.get(request.ecosystem)?;
        let package = airlift_core::PackageRequest::new(request.ecosystem, &request.name, "latest");
        let versions = adapter.list_versions(&ctx, &package).await?;
        Ok(ListVersionsResponse {
            versions: versions.into_iter().map(|v| v.version).collect(),
        })
    }

    /// `cache.stats`.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// `cache.clear`.
    pub fn cache_clear(&self) -> CacheClearResponse {
        CacheClearResponse {
            success: self.cache.clear().is_ok(),
        }
    }
}

fn resolution_response(
    original_packages: Vec<airlift_core::PackageRequest>,
    resolution: Resolution,
) -> ResolveResponse {
    ResolveResponse {
        original_packages,
        all_packages: resolution.flat_list,
        dependency_trees: resolution.trees,
        conflicts: resolution.conflicts,
        failed_packages: resolution.failed,
    }
}

/// One full download session: resolve, stream fetch progress, assemble.
async fn run_session(
    adapters: Arc<AdapterSet>,
    ctx: AdapterContext,
    request: DownloadRequest,
    tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let send = |event: SessionEvent| {
        let _ = tx.send(event);
    };

    send(SessionEvent::Status {
        phase: "resolving".to_string(),
        message: format!("resolving {} package request(s)", request.packages.len()),
    });

    let resolution = match resolve(&adapters, &ctx, &request.packages).await {
        Ok(resolution) => resolution,
        Err(e) => {
            if ctx.cancel.is_cancelled() {
                send(SessionEvent::Cancelled {});
            } else {
                send(SessionEvent::Status {
                    phase: "failed".to_string(),
                    message: e.to_string(),
                });
                send(SessionEvent::Complete {
                    success: false,
                    output_path: String::new(),
                });
            }
            return;
        }
    };

    send(SessionEvent::DepsResolved {
        original_packages: request.packages.clone(),
        all_packages: resolution.flat_list.clone(),
        dependency_trees: resolution.trees.clone(),
        conflicts: resolution.conflicts.clone(),
        failed_packages: resolution.failed.clone(),
    });

    if ctx.cancel.is_cancelled() {
        send(SessionEvent::Cancelled {});
        return;
    }

    send(SessionEvent::Status {
        phase: "downloading".to_string(),
        message: format!("fetching {} artifact(s)", resolution.flat_list.len()),
    });

    let progress_tx = tx.clone();
    let sink: ProgressSink = Arc::new(move |event: ProgressEvent| {
        let _ = progress_tx.send(SessionEvent::Progress(event));
    });
    let pipeline = FetchPipeline::new(adapters, ctx.clone(), sink);
    let report = match pipeline.run(&resolution.flat_list).await {
        Ok(report) => report,
        Err(e) => {
            send(SessionEvent::Status {
                phase: "failed".to_string(),
                message: e.to_string(),
            });
            send(SessionEvent::Complete {
                success: false,
                output_path: String::new(),
            });
            return;
        }
    };

    // Cancellation skips assembly; completed artifacts stay in cache for
    // a later resume.
    if ctx.cancel.is_cancelled() || report.was_cancelled() {
        send(SessionEvent::Cancelled {});
        return;
    }

    send(SessionEvent::Status {
        phase: "assembling".to_string(),
        message: "laying out bundle".to_string(),
    });
    match assemble(&ctx.config, &report, request.allow_existing_output) {
        Ok(outcome) => {
            send(SessionEvent::Complete {
                success: report.failed() == 0,
                output_path: outcome.output_path.display().to_string(),
            });
        }
        Err(e) => {
            send(SessionEvent::Status {
                phase: "failed".to_string(),
                message: e.to_string(),
            });
            send(SessionEvent::Complete {
                success: false,
                output_path: String::new(),
            });
        }
    }
}

/// Convenience for embedders exposing the stream over HTTP: drain a
/// receiver into SSE frames.
pub fn event_to_sse_frame(event: &SessionEvent) -> String {
    event.to_sse()
}

/// Inspect a directory without an engine (used by thin shells).
pub fn inspect_path(path: &Path) -> CheckPathResponse {
    CheckPathResponse {
        exists: path.exists(),
        file_count: airlift_util::fs::file_count(path),
        total_size: airlift_util::fs::dir_size(path),
    }
}
