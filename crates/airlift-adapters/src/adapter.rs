//! The adapter contract shared by all eight ecosystems, plus the default
//! cache-aware fetch path.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use airlift_core::{
    BundleConfig, CancelToken, Ecosystem, PackageRequest, PauseGate, PlatformProfile,
    ResolvedArtifact, VersionSpec,
};
use airlift_net::{CacheKey, CacheStore, IndexRequest, Transport};
use airlift_util::error::AirliftError;

/// Everything an adapter call needs: shared transport, the process cache
/// store, the session configuration and platform, and the session's
/// cancellation token.
#[derive(Clone)]
pub struct AdapterContext {
    pub transport: Transport,
    pub cache: CacheStore,
    pub config: BundleConfig,
    pub platform: PlatformProfile,
    pub cancel: CancelToken,
}

impl AdapterContext {
    pub fn new(transport: Transport, cache: CacheStore, config: BundleConfig) -> Self {
        let platform = config.platform_profile();
        Self {
            transport,
            cache,
            config,
            platform,
            cancel: CancelToken::new(),
        }
    }

    /// Fetch an index document through the cache with single-flight.
    pub async fn cached_index(
        &self,
        ecosystem: Ecosystem,
        request: &IndexRequest,
        ttl: std::time::Duration,
    ) -> miette::Result<Option<Vec<u8>>> {
        let key = CacheKey::index(ecosystem, &request.url, "", &self.platform);
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        let req = request.clone();
        self.cache
            .index(&key, ttl, &request.url, || async move {
                transport.fetch_index(&req, &cancel).await
            })
            .await
    }
}

/// One search candidate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<String>>,
}

/// One entry from `list_versions`, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: String,
    /// `latest`, dist-tags and similar index aliases are preserved but
    /// marked; they never survive into a bundle.
    pub alias: bool,
}

impl VersionEntry {
    pub fn concrete(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            alias: false,
        }
    }

    pub fn aliased(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            alias: true,
        }
    }
}

/// A dependency edge extracted from an artifact manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySpec {
    pub name: String,
    pub constraint: VersionSpec,
    /// Optional/recommended edges are followed only when policy opts in.
    pub optional: bool,
    /// Ecosystem-native scope label (`runtime`, `compile`, `peer`, ...).
    pub scope: String,
}

impl DependencySpec {
    pub fn mandatory(name: impl Into<String>, constraint: VersionSpec) -> Self {
        Self {
            name: name.into(),
            constraint,
            optional: false,
            scope: "runtime".to_string(),
        }
    }
}

/// One file materialized by a fetch: the artifact body or an auxiliary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub file_name: String,
    pub path: PathBuf,
}

/// The result of fetching one artifact: the main body first, auxiliaries
/// after, all resting in the cache store.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub files: Vec<FetchedFile>,
    /// Total bytes now on disk for this artifact.
    pub bytes: u64,
}

/// Progress callback: `(bytes_downloaded, total_if_known)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// The capability set every ecosystem implements. The resolver and fetch
/// pipeline are generic over this contract.
#[async_trait]
pub trait EcosystemAdapter: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Bounded candidate search: exact match first, then prefix, then
    /// substring; ties broken by index popularity where available,
    /// otherwise lexicographic.
    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>>;

    /// All known versions, newest first, in ecosystem-native order.
    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>>;

    /// Pin one concrete, fetchable artifact for a chosen version, applying
    /// the ecosystem's platform compatibility rules.
    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact>;

    /// Dependency edges declared by the artifact's manifest.
    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>>;

    /// Whether `version` satisfies `constraint` under ecosystem-native
    /// semantics. Pure CPU; no suspension.
    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool;

    /// Ecosystem-native version ordering, used to pick "newest".
    fn compare_versions(&self, a: &str, b: &str) -> Ordering;

    /// Fetch the artifact body and its auxiliaries into the cache store.
    ///
    /// The default path covers every ecosystem whose artifact is a single
    /// addressable body plus sidecars; docker overrides it to assemble an
    /// image tarball from config and layer blobs.
    async fn fetch(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
        pause: &PauseGate,
        progress: ProgressFn<'_>,
    ) -> miette::Result<FetchOutcome> {
        default_fetch(ctx, artifact, pause, progress).await
    }
}

/// Cache-aware fetch shared by seven of the eight adapters.
///
/// Consults the artifact cache; on a miss opens a streaming GET with a
/// `Range` header when a partial exists, verifies size and checksum on
/// close, then commits. Auxiliary files are fetched sequentially after the
/// body so per-artifact progress stays monotone.
pub async fn default_fetch(
    ctx: &AdapterContext,
    artifact: &ResolvedArtifact,
    pause: &PauseGate,
    progress: ProgressFn<'_>,
) -> miette::Result<FetchOutcome> {
    let disk = ctx.cache.disk();
    let mut outcome = FetchOutcome::default();
    let total = artifact.size;

    let key = CacheKey::artifact(
        artifact.ecosystem,
        &artifact.name,
        &artifact.version,
        artifact.architecture.as_deref(),
    );

    let main_path = if let Some(path) = disk.artifact_get(&key) {
        tracing::debug!("cache hit for {}", artifact.file_name);
        let len = std::fs::metadata(&path).map_err(AirliftError::Io)?.len();
        outcome.bytes = len;
        progress(len, total.or(Some(len)));
        path
    } else {
        let resume_from = disk.partial_len(&key);
        if resume_from > 0 {
            tracing::debug!(
                "resuming {} from byte {resume_from}",
                artifact.file_name
            );
        }
        let partial = disk.partial_path(&key);
        let written = ctx
            .transport
            .download(
                &IndexRequest::get(&artifact.url),
                &partial,
                resume_from,
                &ctx.cancel,
                Some(pause),
                |n| progress(n, total),
            )
            .await?;

        if let Some(expected) = artifact.size {
            if written != expected {
                disk.discard_partial(&key);
                return Err(AirliftError::FetchFailed {
                    message: format!(
                        "{} is {written} bytes, index declared {expected}",
                        artifact.file_name
                    ),
                }
                .into());
            }
        }
        if let Some(checksum) = &artifact.checksum {
            let ok = checksum
                .verify_file(&partial)
                .map_err(AirliftError::Io)?;
            if !ok {
                disk.discard_partial(&key);
                return Err(AirliftError::FetchFailed {
                    message: format!(
                        "{} checksum mismatch ({} expected {})",
                        artifact.file_name,
                        checksum.algorithm(),
                        checksum.expected()
                    ),
                }
                .into());
            }
        }
        outcome.bytes = written;
        disk.commit_partial(&key)?
    };

    outcome.files.push(FetchedFile {
        file_name: artifact.file_name.clone(),
        path: main_path,
    });

    for aux in &artifact.auxiliary {
        let aux_key = CacheKey::artifact(
            artifact.ecosystem,
            &format!("{}#{}", artifact.name, aux.file_name),
            &artifact.version,
            artifact.architecture.as_deref(),
        );
        if let Some(path) = disk.artifact_get(&aux_key) {
            outcome.bytes += std::fs::metadata(&path).map_err(AirliftError::Io)?.len();
            progress(outcome.bytes, None);
            outcome.files.push(FetchedFile {
                file_name: aux.file_name.clone(),
                path,
            });
            continue;
        }

        let partial = disk.partial_path(&aux_key);
        let base = outcome.bytes;
        let result = ctx
            .transport
            .download(
                &IndexRequest::get(&aux.url),
                &partial,
                disk.partial_len(&aux_key),
                &ctx.cancel,
                Some(pause),
                |n| progress(base + n, None),
            )
            .await;

        match result {
            Ok(written) => {
                if let Some(checksum) = &aux.checksum {
                    let ok = checksum
                        .verify_file(&partial)
                        .map_err(AirliftError::Io)?;
                    if !ok {
                        disk.discard_partial(&aux_key);
                        return Err(AirliftError::FetchFailed {
                            message: format!("{} checksum mismatch", aux.file_name),
                        }
                        .into());
                    }
                }
                outcome.bytes += written;
                let path = disk.commit_partial(&aux_key)?;
                outcome.files.push(FetchedFile {
                    file_name: aux.file_name.clone(),
                    path,
                });
            }
            Err(e) if aux.optional => {
                tracing::warn!("optional auxiliary {} unavailable: {e}", aux.file_name);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

/// The full adapter set, dispatched by ecosystem.
pub struct AdapterSet {
    adapters: Vec<Arc<dyn EcosystemAdapter>>,
}

impl AdapterSet {
    /// Construct the production set with all eight adapters.
    pub fn standard() -> Self {
        Self {
            adapters: vec![
                Arc::new(crate::pip::PipAdapter::new()),
                Arc::new(crate::conda::CondaAdapter::new()),
                Arc::new(crate::maven::MavenAdapter::new()),
                Arc::new(crate::npm::NpmAdapter::new()),
                Arc::new(crate::yum::YumAdapter::new()),
                Arc::new(crate::apt::AptAdapter::new()),
                Arc::new(crate::apk::ApkAdapter::new()),
                Arc::new(crate::docker::DockerAdapter::new()),
            ],
        }
    }

    /// Build a set from explicit adapters (tests use synthetic ones).
    pub fn from_adapters(adapters: Vec<Arc<dyn EcosystemAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, ecosystem: Ecosystem) -> miette::Result<Arc<dyn EcosystemAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.ecosystem() == ecosystem)
            .cloned()
            .ok_or_else(|| {
                AirliftError::InvalidRequest {
                    message: format!("no adapter registered for ecosystem {ecosystem}"),
                }
                .into()
            })
    }

    /// Validate and classify a request before any network traffic.
    pub fn validate(&self, request: &PackageRequest) -> miette::Result<()> {
        request.validate().map_err(|message| {
            AirliftError::InvalidRequest { message }.into()
        })
    }
}

/// Build an [`AdapterContext`] over a temp cache for adapter tests.
#[cfg(test)]
pub(crate) fn test_context(cache_dir: &std::path::Path) -> AdapterContext {
    AdapterContext::new(
        Transport::new().unwrap(),
        CacheStore::new(cache_dir),
        BundleConfig::default(),
    )
}
