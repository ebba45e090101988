//! PyPI adapter: JSON index queries, wheel selection, PEP 440 version
//! ordering and PEP 508 dependency markers.

pub mod wheel;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::{MarkerEnvironment, MarkerEnvironmentBuilder, Requirement};
use serde::Deserialize;

use airlift_core::{
    Ecosystem, PackageRequest, PlatformProfile, RepoDescriptor, ResolvedArtifact, TargetOs,
    VersionSpec,
};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

const PYPI_BASE: &str = "https://pypi.org/pypi";

/// Response from the PyPI JSON API project endpoint.
#[derive(Debug, Clone, Deserialize)]
struct PypiProject {
    info: PypiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PypiFile>>,
    /// Files of the release when querying the version endpoint.
    #[serde(default)]
    urls: Vec<PypiFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct PypiInfo {
    name: String,
    version: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct PypiFile {
    filename: String,
    packagetype: String,
    url: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    digests: PypiDigests,
    #[serde(default)]
    yanked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PypiDigests {
    #[serde(default)]
    sha256: Option<String>,
}

pub struct PipAdapter {
    base: String,
}

impl PipAdapter {
    pub fn new() -> Self {
        Self {
            base: PYPI_BASE.to_string(),
        }
    }

    /// Point the adapter at a different index (mirrors, tests).
    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    async fn project(
        &self,
        ctx: &AdapterContext,
        name: &str,
    ) -> miette::Result<Option<PypiProject>> {
        let url = format!("{}/{}/json", self.base, urlencoding::encode(name));
        let body = ctx
            .cached_index(Ecosystem::Pip, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?;
        match body {
            Some(bytes) => {
                let project =
                    serde_json::from_slice(&bytes).map_err(|e| AirliftError::Parse {
                        message: format!("malformed PyPI response for {name}: {e}"),
                    })?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    async fn release_files(
        &self,
        ctx: &AdapterContext,
        name: &str,
        version: &str,
    ) -> miette::Result<(PypiInfo, Vec<PypiFile>)> {
        let url = format!(
            "{}/{}/{version}/json",
            self.base,
            urlencoding::encode(name)
        );
        let body = ctx
            .cached_index(Ecosystem::Pip, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("PyPI has no release {name} {version}"),
            })?;
        let project: PypiProject =
            serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
                message: format!("malformed PyPI response for {name} {version}: {e}"),
            })?;
        Ok((project.info, project.urls))
    }
}

impl Default for PipAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for PipAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pip
    }

    /// PyPI exposes no structured search endpoint, so search degrades to an
    /// exact-name probe: the strongest rank the relevance rules define.
    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(project) = self.project(ctx, query.trim()).await? else {
            return Ok(Vec::new());
        };
        let mut versions: Vec<String> = project.releases.keys().cloned().collect();
        versions.sort_by(|a, b| self.compare_versions(b, a));
        Ok(vec![SearchHit {
            name: project.info.name,
            version: project.info.version,
            description: project.info.summary,
            versions: Some(versions.into_iter().take(20).collect()),
        }])
    }

    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>> {
        let project = self
            .project(ctx, &request.name)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("PyPI has no project named {}", request.name),
            })?;
        let mut versions: Vec<String> = project
            .releases
            .iter()
            .filter(|(_, files)| files.iter().any(|f| !f.yanked))
            .map(|(v, _)| v.clone())
            .collect();
        versions.sort_by(|a, b| self.compare_versions(b, a));
        Ok(versions.into_iter().map(VersionEntry::concrete).collect())
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let (_, files) = self.release_files(ctx, &request.name, version).await?;
        let profile = &ctx.platform;

        let mut best: Option<(u32, &PypiFile)> = None;
        let mut sdist: Option<&PypiFile> = None;
        for file in files.iter().filter(|f| !f.yanked) {
            match file.packagetype.as_str() {
                "bdist_wheel" => {
                    if let Some((_, _, tags)) = wheel::parse_wheel_filename(&file.filename) {
                        if let Some(score) = wheel::score(&tags, profile) {
                            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                                best = Some((score, file));
                            }
                        }
                    }
                }
                "sdist" => sdist = sdist.or(Some(file)),
                _ => {}
            }
        }

        let chosen = best.map(|(_, f)| f).or(sdist).ok_or_else(|| {
            AirliftError::PlatformIncompatible {
                message: format!(
                    "no compatible wheel for {} {version} matching {} on {}/{}",
                    request.name,
                    profile.python_tag().unwrap_or_else(|| "py3".to_string()),
                    profile.os,
                    profile.arch.canonical()
                ),
            }
        })?;

        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Pip,
            name: request.name.clone(),
            version: version.to_string(),
            architecture: None,
            url: chosen.url.clone(),
            file_name: chosen.filename.clone(),
            size: chosen.size,
            checksum: chosen.digests.sha256.clone().map(Checksum::Sha256),
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("pypi", &self.base),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let (info, _) = self
            .release_files(ctx, &artifact.name, &artifact.version)
            .await?;
        let requires = info.requires_dist.unwrap_or_default();
        let env = marker_environment(&ctx.platform)?;
        Ok(parse_requires_dist(&requires, &env))
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => match (Version::from_str(pin), Version::from_str(version)) {
                (Ok(a), Ok(b)) => a == b,
                _ => pin == version,
            },
            VersionSpec::Range(spec) => {
                match (
                    VersionSpecifiers::from_str(spec),
                    Version::from_str(version),
                ) {
                    (Ok(specs), Ok(v)) => specs.contains(&v),
                    _ => false,
                }
            }
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        match (Version::from_str(a), Version::from_str(b)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            // Unparsable versions sort below everything parsable.
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.cmp(b),
        }
    }
}

/// Build the PEP 508 marker environment for a target profile.
fn marker_environment(profile: &PlatformProfile) -> miette::Result<MarkerEnvironment> {
    let python = profile.python_version.as_deref().unwrap_or("3.11");
    let full = if python.matches('.').count() >= 2 {
        python.to_string()
    } else {
        format!("{python}.0")
    };
    let (sys_platform, platform_system, os_name) = match profile.os {
        TargetOs::Windows => ("win32", "Windows", "nt"),
        TargetOs::Macos => ("darwin", "Darwin", "posix"),
        TargetOs::Linux | TargetOs::Any => ("linux", "Linux", "posix"),
    };
    MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
        implementation_name: "cpython",
        implementation_version: &full,
        os_name,
        platform_machine: profile.arch.canonical().unix_name(),
        platform_python_implementation: "CPython",
        platform_release: "",
        platform_system,
        platform_version: "",
        python_full_version: &full,
        python_version: python,
        sys_platform,
    })
    .map_err(|e| {
        AirliftError::InvalidRequest {
            message: format!("invalid python version {python}: {e}"),
        }
        .into()
    })
}

/// Parse `Requires-Dist` entries, dropping those whose environment markers
/// exclude the target platform. Extra-gated requirements are flagged
/// optional so policy can include them.
fn parse_requires_dist(requires: &[String], env: &MarkerEnvironment) -> Vec<DependencySpec> {
    let mut deps = Vec::new();
    for raw in requires {
        let requirement = match Requirement::<pep508_rs::VerbatimUrl>::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("skipping unparsable requirement {raw:?}: {e}");
                continue;
            }
        };
        // Requirements gated on an extra never match the bare install; keep
        // them as optional edges instead of dropping them silently.
        let extra_gated = raw.contains("extra ==") || raw.contains("extra==");
        if !extra_gated && !requirement.marker.evaluate(env, &[]) {
            continue;
        }
        let constraint = match &requirement.version_or_url {
            Some(pep508_rs::VersionOrUrl::VersionSpecifier(specs)) => {
                VersionSpec::parse(&specs.to_string())
            }
            Some(pep508_rs::VersionOrUrl::Url(_)) | None => VersionSpec::Latest,
        };
        deps.push(DependencySpec {
            name: requirement.name.to_string(),
            constraint,
            optional: extra_gated,
            scope: "runtime".to_string(),
        });
    }
    deps
}
