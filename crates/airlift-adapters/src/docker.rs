//! Docker/OCI registry adapter.
//!
//! Speaks the OCI Distribution API v2: bearer-token challenges,
//! multi-arch manifest lists, and per-digest blob fetches. An image's
//! "dependencies" are its layers; they are auxiliary files of a single
//! artifact, and `fetch` assembles them into one `docker save` tarball.

use std::cmp::Ordering;
use std::io::Write;

use async_trait::async_trait;
use serde::Deserialize;

use airlift_core::{
    AuxKind, AuxiliaryFile, Ecosystem, PackageRequest, PauseGate, RepoDescriptor,
    ResolvedArtifact, VersionSpec,
};
use airlift_net::store::TTL_MUTABLE;
use airlift_net::{CacheKey, IndexRequest};
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, FetchOutcome, FetchedFile, ProgressFn,
    SearchHit, VersionEntry,
};

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

/// Per-layer retry budget within one artifact-level fetch.
const LAYER_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestEnvelope {
    #[serde(default, rename = "mediaType")]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<ManifestListEntry>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct ManifestListEntry {
    digest: String,
    #[serde(default)]
    platform: Option<OciPlatform>,
}

#[derive(Debug, Deserialize)]
struct OciPlatform {
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    os: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Descriptor {
    digest: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HubSearchResponse {
    #[serde(default)]
    results: Vec<HubSearchResult>,
}

#[derive(Debug, Deserialize)]
struct HubSearchResult {
    repo_name: String,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    pull_count: u64,
}

pub struct DockerAdapter {
    /// Overrides every host decision when set (tests).
    host_override: Option<String>,
    /// Disables TLS-scheme assumptions for plain-HTTP test registries.
    insecure: bool,
}

impl DockerAdapter {
    pub fn new() -> Self {
        Self {
            host_override: None,
            insecure: false,
        }
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host_override: Some(host.into()),
            insecure: true,
        }
    }

    fn host(&self, ctx: &AdapterContext, request_registry: Option<&str>) -> String {
        if let Some(host) = &self.host_override {
            return host.clone();
        }
        match request_registry {
            Some(reg) if reg == "docker.io" => "registry-1.docker.io".to_string(),
            Some(reg) => reg.to_string(),
            None => ctx.config.docker_host(),
        }
    }

    fn base(&self, host: &str) -> String {
        if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else if self.insecure {
            format!("http://{host}")
        } else {
            format!("https://{host}")
        }
    }

    /// Docker Hub official images live under `library/`.
    fn repo_path(host: &str, name: &str) -> String {
        if host.contains("docker.io") && !name.contains('/') {
            format!("library/{name}")
        } else {
            name.to_string()
        }
    }

    /// Obtain a pull-scoped bearer token if the registry challenges.
    async fn token(
        &self,
        ctx: &AdapterContext,
        base: &str,
        repo: &str,
    ) -> miette::Result<Option<String>> {
        let probe = ctx
            .transport
            .probe(&IndexRequest::get(format!("{base}/v2/")))
            .await?;
        if probe.status != 401 {
            return Ok(None);
        }
        let challenge = probe.www_authenticate.unwrap_or_default();
        let Some((realm, service)) = parse_bearer_challenge(&challenge) else {
            return Ok(None);
        };
        let mut token_url = format!(
            "{realm}?scope=repository:{repo}:pull",
        );
        if let Some(service) = service {
            token_url.push_str(&format!("&service={}", urlencoding::encode(&service)));
        }
        // Tokens are short-lived; they bypass the cache store.
        let body = ctx
            .transport
            .fetch_index(&IndexRequest::get(&token_url), &ctx.cancel)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("token endpoint {realm} rejected the request"),
            })?;
        let token: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
                message: format!("malformed token response from {realm}: {e}"),
            })?;
        Ok(token.token.or(token.access_token))
    }

    async fn manifest(
        &self,
        ctx: &AdapterContext,
        base: &str,
        repo: &str,
        reference: &str,
        bearer: Option<&str>,
    ) -> miette::Result<ManifestEnvelope> {
        let url = format!("{base}/v2/{repo}/manifests/{reference}");
        let request = IndexRequest {
            url: url.clone(),
            accept: Some(MANIFEST_ACCEPT.to_string()),
            bearer: bearer.map(str::to_string),
            basic: None,
        };
        let body = ctx
            .cached_index(Ecosystem::Docker, &request, TTL_MUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("registry has no manifest {repo}:{reference}"),
            })?;
        serde_json::from_slice(&body).map_err(|e| {
            AirliftError::Parse {
                message: format!("malformed manifest for {repo}:{reference}: {e}"),
            }
            .into()
        })
    }

    /// Resolve a tag to the platform's image manifest, walking through a
    /// manifest list when the registry serves one.
    async fn image_manifest(
        &self,
        ctx: &AdapterContext,
        base: &str,
        repo: &str,
        reference: &str,
        bearer: Option<&str>,
    ) -> miette::Result<ManifestEnvelope> {
        let envelope = self.manifest(ctx, base, repo, reference, bearer).await?;
        let is_list = envelope
            .media_type
            .as_deref()
            .map(|m| m.contains("manifest.list") || m.contains("image.index"))
            .unwrap_or(!envelope.manifests.is_empty());
        if !is_list {
            return Ok(envelope);
        }

        let (want_os, want_arch) = ctx.platform.docker_platform();
        let entry = envelope
            .manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .map(|p| p.architecture == want_arch && p.os == want_os)
                    .unwrap_or(false)
            })
            .ok_or_else(|| AirliftError::PlatformIncompatible {
                message: format!(
                    "no {want_os}/{want_arch} image for {repo}:{reference} in manifest list"
                ),
            })?;
        self.manifest(ctx, base, repo, &entry.digest, bearer).await
    }
}

impl Default for DockerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for DockerAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Docker
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        // Only Docker Hub exposes a search API.
        if self.host_override.is_none() && !ctx.config.docker_host().contains("docker.io") {
            return Ok(Vec::new());
        }
        let base = match &self.host_override {
            Some(host) => self.base(host),
            None => "https://hub.docker.com".to_string(),
        };
        let url = format!(
            "{base}/v2/search/repositories/?query={}&page_size={}",
            urlencoding::encode(query),
            limit.clamp(1, 100)
        );
        let body = ctx
            .cached_index(Ecosystem::Docker, &IndexRequest::get(&url), TTL_MUTABLE)
            .await?
            .unwrap_or_default();
        let response: HubSearchResponse =
            serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
                message: format!("malformed Docker Hub search response: {e}"),
            })?;
        let mut ranked: Vec<(u8, u64, SearchHit)> = response
            .results
            .into_iter()
            .map(|r| {
                let rank = if r.repo_name == query {
                    0
                } else if r.repo_name.starts_with(query) {
                    1
                } else {
                    2
                };
                (
                    rank,
                    r.pull_count,
                    SearchHit {
                        name: r.repo_name,
                        version: "latest".to_string(),
                        description: r.short_description,
                        versions: None,
                    },
                )
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
        Ok(ranked.into_iter().map(|(_, _, h)| h).take(limit).collect())
    }

    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>> {
        let host = self.host(ctx, request.registry.as_deref());
        let base = self.base(&host);
        let repo = Self::repo_path(&host, &request.name);
        let bearer = self.token(ctx, &base, &repo).await?;
        let url = format!("{base}/v2/{repo}/tags/list");
        let request_spec = IndexRequest {
            url: url.clone(),
            accept: None,
            bearer: bearer.clone(),
            basic: None,
        };
        let body = ctx
            .cached_index(Ecosystem::Docker, &request_spec, TTL_MUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("registry lists no tags for {repo}"),
            })?;
        let tags: TagList = serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
            message: format!("malformed tag list for {repo}: {e}"),
        })?;
        let mut entries: Vec<VersionEntry> = tags
            .tags
            .iter()
            .filter(|t| *t != "latest")
            .map(|t| VersionEntry::concrete(t.clone()))
            .collect();
        entries.sort_by(|a, b| self.compare_versions(&b.version, &a.version));
        if tags.tags.iter().any(|t| t == "latest") {
            entries.push(VersionEntry::aliased("latest"));
        }
        Ok(entries)
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let host = self.host(ctx, request.registry.as_deref());
        let base = self.base(&host);
        let repo = Self::repo_path(&host, &request.name);
        let bearer = self.token(ctx, &base, &repo).await?;
        let manifest = self
            .image_manifest(ctx, &base, &repo, version, bearer.as_deref())
            .await?;

        let config = manifest.config.as_ref().ok_or_else(|| {
            AirliftError::Parse {
                message: format!("manifest for {repo}:{version} has no config descriptor"),
            }
        })?;

        let mut auxiliary = vec![AuxiliaryFile {
            url: format!("{base}/v2/{repo}/blobs/{}", config.digest),
            file_name: format!("{}.json", digest_hex(&config.digest)),
            kind: AuxKind::ImageConfig,
            checksum: digest_checksum(&config.digest),
            optional: false,
        }];
        let mut total = config.size.unwrap_or(0);
        for layer in &manifest.layers {
            total += layer.size.unwrap_or(0);
            auxiliary.push(AuxiliaryFile {
                url: format!("{base}/v2/{repo}/blobs/{}", layer.digest),
                file_name: format!("{}.tar", digest_hex(&layer.digest)),
                kind: AuxKind::Layer,
                checksum: digest_checksum(&layer.digest),
                optional: false,
            });
        }

        let (_, want_arch) = ctx.platform.docker_platform();
        let file_name = format!(
            "{}_{version}.tar",
            request.name.replace(['/', ':'], "_")
        );
        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Docker,
            name: request.name.clone(),
            version: version.to_string(),
            architecture: Some(want_arch.to_string()),
            url: format!("{base}/v2/{repo}/manifests/{version}"),
            file_name,
            size: (total > 0).then_some(total),
            checksum: None,
            auxiliary,
            repository: RepoDescriptor::new("docker", &base),
            is_root: false,
            requested_by: None,
        })
    }

    /// Layers are auxiliary files of the image artifact, not graph edges.
    async fn dependencies(
        &self,
        _ctx: &AdapterContext,
        _artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        Ok(Vec::new())
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => pin == version,
            VersionSpec::Range(spec) => spec == version,
        }
    }

    /// Tags are an arbitrary string set; dotted-numeric tags compare
    /// numerically, everything else lexicographically.
    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        let nums = |s: &str| -> Option<Vec<u64>> {
            s.split('.').map(|p| p.parse::<u64>().ok()).collect()
        };
        match (nums(a), nums(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => a.cmp(b),
        }
    }

    /// Fetch config and layer blobs, then assemble one `docker save`
    /// tarball: `manifest.json`, `<config>.json`, `<digest>/layer.tar`.
    async fn fetch(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
        pause: &PauseGate,
        progress: ProgressFn<'_>,
    ) -> miette::Result<FetchOutcome> {
        let disk = ctx.cache.disk();
        let key = CacheKey::artifact(
            Ecosystem::Docker,
            &artifact.name,
            &artifact.version,
            artifact.architecture.as_deref(),
        );
        if let Some(path) = disk.artifact_get(&key) {
            let len = std::fs::metadata(&path).map_err(AirliftError::Io)?.len();
            progress(len, Some(len));
            return Ok(FetchOutcome {
                files: vec![FetchedFile {
                    file_name: artifact.file_name.clone(),
                    path,
                }],
                bytes: len,
            });
        }

        let base = artifact.repository.base_url.clone();
        let host = base
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        let repo = Self::repo_path(&host, &artifact.name);
        let bearer = self.token(ctx, &base, &repo).await?;

        // Pull every blob into the cache, retrying each one on its own.
        let mut blob_paths = Vec::new();
        let mut downloaded = 0u64;
        for aux in &artifact.auxiliary {
            let aux_key = CacheKey::artifact(
                Ecosystem::Docker,
                &format!("{}#{}", artifact.name, aux.file_name),
                &artifact.version,
                artifact.architecture.as_deref(),
            );
            if let Some(path) = disk.artifact_get(&aux_key) {
                downloaded += std::fs::metadata(&path).map_err(AirliftError::Io)?.len();
                progress(downloaded, artifact.size);
                blob_paths.push((aux, path));
                continue;
            }

            let request = IndexRequest {
                url: aux.url.clone(),
                accept: None,
                bearer: bearer.clone(),
                basic: None,
            };
            let partial = disk.partial_path(&aux_key);
            let mut attempt = 0;
            let path = loop {
                attempt += 1;
                let base_bytes = downloaded;
                let result = ctx
                    .transport
                    .download(
                        &request,
                        &partial,
                        disk.partial_len(&aux_key),
                        &ctx.cancel,
                        Some(pause),
                        |n| progress(base_bytes + n, artifact.size),
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
                                if attempt >= LAYER_RETRIES {
                                    return Err(AirliftError::FetchFailed {
                                        message: format!(
                                            "layer {} digest mismatch after {attempt} attempts",
                                            aux.file_name
                                        ),
                                    }
                                    .into());
                                }
                                continue;
                            }
                        }
                        downloaded += written;
                        break disk.commit_partial(&aux_key)?;
                    }
                    Err(e) => {
                        if e.downcast_ref::<AirliftError>()
                            .map(AirliftError::is_cancelled)
                            .unwrap_or(false)
                            || attempt >= LAYER_RETRIES
                        {
                            return Err(e);
                        }
                        tracing::warn!(
                            "layer {} fetch attempt {attempt} failed: {e}",
                            aux.file_name
                        );
                    }
                }
            };
            blob_paths.push((aux, path));
        }

        // Assemble the image tarball at the artifact's content address.
        let partial = disk.partial_path(&key);
        if let Some(parent) = partial.parent() {
            airlift_util::fs::ensure_dir(parent).map_err(AirliftError::Io)?;
        }
        let file = std::fs::File::create(&partial).map_err(AirliftError::Io)?;
        let mut builder = tar::Builder::new(file);

        let mut config_name = String::new();
        let mut layer_entries = Vec::new();
        for (aux, path) in &blob_paths {
            match aux.kind {
                AuxKind::ImageConfig => {
                    config_name = aux.file_name.clone();
                    append_file(&mut builder, path, &aux.file_name)?;
                }
                AuxKind::Layer => {
                    let hex = aux.file_name.trim_end_matches(".tar");
                    let entry = format!("{hex}/layer.tar");
                    append_file(&mut builder, path, &entry)?;
                    layer_entries.push(entry);
                }
                _ => {}
            }
        }

        let manifest = serde_json::json!([{
            "Config": config_name,
            "RepoTags": [format!("{}:{}", artifact.name, artifact.version)],
            "Layers": layer_entries,
        }]);
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| {
            AirliftError::Parse {
                message: format!("image manifest serialization failed: {e}"),
            }
        })?;
        append_bytes(&mut builder, &manifest_bytes, "manifest.json")?;

        let mut file = builder.into_inner().map_err(AirliftError::Io)?;
        file.flush().map_err(AirliftError::Io)?;
        drop(file);

        let final_path = disk.commit_partial(&key)?;
        let bytes = std::fs::metadata(&final_path)
            .map_err(AirliftError::Io)?
            .len();
        progress(bytes.max(downloaded), Some(bytes.max(downloaded)));
        Ok(FetchOutcome {
            files: vec![FetchedFile {
                file_name: artifact.file_name.clone(),
                path: final_path,
            }],
            bytes,
        })
    }
}

/// `sha256:abcd...` to the bare hex.
fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map(|(_, hex)| hex).unwrap_or(digest)
}

fn digest_checksum(digest: &str) -> Option<Checksum> {
    digest
        .strip_prefix("sha256:")
        .map(|hex| Checksum::Sha256(hex.to_string()))
}

/// Parse `Bearer realm="...",service="..."` into `(realm, service)`.
fn parse_bearer_challenge(header: &str) -> Option<(String, Option<String>)> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    for part in rest.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.trim_matches('"').to_string();
        match key {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            _ => {}
        }
    }
    realm.map(|r| (r, service))
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &std::path::Path,
    entry_name: &str,
) -> miette::Result<()> {
    let mut file = std::fs::File::open(path).map_err(AirliftError::Io)?;
    let len = file.metadata().map_err(AirliftError::Io)?.len();
    let mut header = tar::Header::new_gnu();
    header.set_size(len);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, entry_name, &mut file)
        .map_err(AirliftError::Io)?;
    Ok(())
}

fn append_bytes<W: Write>(
    builder: &mut tar::Builder<W>,
    bytes: &[u8],
    entry_name: &str,
) -> miette::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, entry_name, bytes)
        .map_err(AirliftError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_util::hash::sha256_bytes;

    #[test]
    fn bearer_challenge_parsing() {
        let (realm, service) = parse_bearer_challenge(
            "Bearer realm=\"https://auth.docker.io/token\",service=\"registry.docker.io\"",
        )
        .unwrap();
        assert_eq!(realm, "https://auth.docker.io/token");
        assert_eq!(service.as_deref(), Some("registry.docker.io"));
        assert!(parse_bearer_challenge("Basic realm=\"x\"").is_none());
    }

    #[test]
    fn official_images_get_library_prefix() {
        assert_eq!(
            DockerAdapter::repo_path("registry-1.docker.io", "nginx"),
            "library/nginx"
        );
        assert_eq!(
            DockerAdapter::repo_path("registry-1.docker.io", "grafana/grafana"),
            "grafana/grafana"
        );
        assert_eq!(DockerAdapter::repo_path("ghcr.io", "nginx"), "nginx");
    }

    #[test]
    fn tag_ordering() {
        let adapter = DockerAdapter::new();
        assert_eq!(adapter.compare_versions("1.25", "1.9"), Ordering::Greater);
        assert_eq!(
            adapter.compare_versions("1.25.3", "1.25"),
            Ordering::Greater
        );
        // numeric tags rank above words
        assert_eq!(adapter.compare_versions("1.25", "alpine"), Ordering::Greater);
    }

    fn layer_blob() -> Vec<u8> {
        b"layer-tar-bytes".to_vec()
    }

    fn config_blob() -> Vec<u8> {
        b"{\"architecture\":\"arm64\"}".to_vec()
    }

    async fn mock_registry(
        server: &mut mockito::Server,
    ) -> (String, String, Vec<mockito::Mock>) {
        let config = config_blob();
        let layer = layer_blob();
        let config_digest = format!("sha256:{}", sha256_bytes(&config));
        let layer_digest = format!("sha256:{}", sha256_bytes(&layer));

        let list = serde_json::json!({
            "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
            "manifests": [
                {"digest": "sha256:amd64manifest", "platform": {"architecture": "amd64", "os": "linux"}},
                {"digest": "sha256:arm64manifest", "platform": {"architecture": "arm64", "os": "linux"}}
            ]
        });
        let image = serde_json::json!({
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"digest": config_digest, "size": config.len()},
            "layers": [{"digest": layer_digest, "size": layer.len()}]
        });

        let mocks = vec![
            server
                .mock("GET", "/v2/")
                .with_status(200)
                .create_async()
                .await,
            server
                .mock("GET", "/v2/nginx/manifests/1.25")
                .with_body(list.to_string())
                .create_async()
                .await,
            server
                .mock("GET", "/v2/nginx/manifests/sha256:arm64manifest")
                .with_body(image.to_string())
                .create_async()
                .await,
            server
                .mock(
                    "GET",
                    format!("/v2/nginx/blobs/{config_digest}").as_str(),
                )
                .with_body(config)
                .create_async()
                .await,
            server
                .mock("GET", format!("/v2/nginx/blobs/{layer_digest}").as_str())
                .with_body(layer)
                .create_async()
                .await,
        ];
        (config_digest, layer_digest, mocks)
    }

    #[tokio::test]
    async fn manifest_list_selects_platform_and_save_format_assembles() {
        let mut server = mockito::Server::new_async().await;
        let (config_digest, layer_digest, _mocks) = mock_registry(&mut server).await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = crate::adapter::test_context(tmp.path());
        ctx.platform.arch = airlift_core::Arch::Arm64;
        let adapter = DockerAdapter::with_host(server.url());
        let request = PackageRequest::new(Ecosystem::Docker, "nginx", "1.25");

        let artifact = adapter
            .select_artifact(&ctx, &request, "1.25")
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "nginx_1.25.tar");
        assert_eq!(artifact.architecture.as_deref(), Some("arm64"));
        assert_eq!(artifact.auxiliary.len(), 2);
        assert_eq!(artifact.auxiliary[0].kind, AuxKind::ImageConfig);
        assert_eq!(artifact.auxiliary[1].kind, AuxKind::Layer);

        let pause = PauseGate::new();
        let outcome = adapter
            .fetch(&ctx, &artifact, &pause, &|_, _| {})
            .await
            .unwrap();
        assert_eq!(outcome.files.len(), 1);

        // Verify docker-save structure
        let tar_bytes = std::fs::read(&outcome.files[0].path).unwrap();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.contains(&format!("{}.json", digest_hex(&config_digest))));
        assert!(names.contains(&format!("{}/layer.tar", digest_hex(&layer_digest))));
        assert!(names.contains(&"manifest.json".to_string()));
    }

    #[tokio::test]
    async fn missing_platform_entry_is_incompatible() {
        let mut server = mockito::Server::new_async().await;
        let list = serde_json::json!({
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"digest": "sha256:s390x", "platform": {"architecture": "s390x", "os": "linux"}}
            ]
        });
        let _probe = server
            .mock("GET", "/v2/")
            .with_status(200)
            .create_async()
            .await;
        let _manifest = server
            .mock("GET", "/v2/nginx/manifests/1.25")
            .with_body(list.to_string())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = DockerAdapter::with_host(server.url());
        let request = PackageRequest::new(Ecosystem::Docker, "nginx", "1.25");
        let err = adapter
            .select_artifact(&ctx, &request, "1.25")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No compatible artifact"));
    }

    #[tokio::test]
    async fn tags_list_marks_latest_alias() {
        let mut server = mockito::Server::new_async().await;
        let _probe = server
            .mock("GET", "/v2/")
            .with_status(200)
            .create_async()
            .await;
        let _tags = server
            .mock("GET", "/v2/nginx/tags/list")
            .with_body(r#"{"name": "nginx", "tags": ["1.24", "1.25", "latest", "alpine"]}"#)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = DockerAdapter::with_host(server.url());
        let request = PackageRequest::new(Ecosystem::Docker, "nginx", "latest");
        let versions = adapter.list_versions(&ctx, &request).await.unwrap();
        assert_eq!(versions[0].version, "1.25");
        let latest = versions.iter().find(|v| v.version == "latest").unwrap();
        assert!(latest.alias);
    }
}
