//! Conda channel adapter: `repodata.json` lookup with subdir and build
//! string filtering, and conda match-spec dependency parsing.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use pep440_rs::{Version, VersionSpecifiers};
use serde::Deserialize;

use airlift_core::{Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact, VersionSpec};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

/// One package record inside `repodata.json`.
#[derive(Debug, Clone, Deserialize)]
struct RepodataRecord {
    name: String,
    version: String,
    #[serde(default)]
    build: String,
    #[serde(default)]
    build_number: u64,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Repodata {
    #[serde(default)]
    packages: HashMap<String, RepodataRecord>,
    #[serde(default, rename = "packages.conda")]
    packages_conda: HashMap<String, RepodataRecord>,
}

/// A candidate file found in the channel: `(filename, subdir, record)`.
#[derive(Debug, Clone)]
struct Candidate {
    filename: String,
    subdir: String,
    record: RepodataRecord,
}

pub struct CondaAdapter {
    /// Overrides the configured channel base URL when set (tests).
    base_override: Option<String>,
}

impl CondaAdapter {
    pub fn new() -> Self {
        Self {
            base_override: None,
        }
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base_override: Some(base.into()),
        }
    }

    fn channel_base(&self, ctx: &AdapterContext) -> String {
        self.base_override
            .clone()
            .unwrap_or_else(|| ctx.config.conda_channel.base_url().to_string())
    }

    async fn repodata(
        &self,
        ctx: &AdapterContext,
        subdir: &str,
    ) -> miette::Result<Repodata> {
        let url = format!("{}/{subdir}/repodata.json", self.channel_base(ctx));
        let body = ctx
            .cached_index(Ecosystem::Conda, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?;
        match body {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AirliftError::Parse {
                    message: format!("malformed repodata for {subdir}: {e}"),
                }
                .into()
            }),
            // Channels without the subdir simply contribute nothing.
            None => Ok(Repodata::default()),
        }
    }

    /// All candidate files for a package across the platform subdir and
    /// `noarch`.
    async fn candidates(
        &self,
        ctx: &AdapterContext,
        name: &str,
    ) -> miette::Result<Vec<Candidate>> {
        let mut out = Vec::new();
        let subdir = ctx.platform.conda_subdir();
        for sd in [subdir.as_str(), "noarch"] {
            let repodata = self.repodata(ctx, sd).await?;
            for (filename, record) in repodata
                .packages
                .into_iter()
                .chain(repodata.packages_conda)
            {
                if record.name == name {
                    out.push(Candidate {
                        filename,
                        subdir: sd.to_string(),
                        record,
                    });
                }
            }
            if sd == "noarch" && subdir == "noarch" {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for CondaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for CondaAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Conda
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let subdir = ctx.platform.conda_subdir();
        let repodata = self.repodata(ctx, &subdir).await?;
        // newest version per matching name
        let mut best: HashMap<String, String> = HashMap::new();
        for record in repodata
            .packages
            .values()
            .chain(repodata.packages_conda.values())
        {
            if !record.name.contains(query) {
                continue;
            }
            let entry = best.entry(record.name.clone()).or_default();
            if entry.is_empty() || self.compare_versions(&record.version, entry) == Ordering::Greater
            {
                *entry = record.version.clone();
            }
        }
        let mut hits: Vec<SearchHit> = best
            .into_iter()
            .map(|(name, version)| SearchHit {
                name,
                version,
                description: None,
                versions: None,
            })
            .collect();
        hits.sort_by(|a, b| {
            relevance(&a.name, query)
                .cmp(&relevance(&b.name, query))
                .then_with(|| a.name.cmp(&b.name))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>> {
        let candidates = self.candidates(ctx, &request.name).await?;
        if candidates.is_empty() {
            return Err(AirliftError::IndexUnavailable {
                message: format!(
                    "channel has no package {} for {}",
                    request.name,
                    ctx.platform.conda_subdir()
                ),
            }
            .into());
        }
        let mut versions: Vec<String> = candidates
            .into_iter()
            .map(|c| c.record.version)
            .collect();
        versions.sort_by(|a, b| self.compare_versions(b, a));
        versions.dedup();
        Ok(versions.into_iter().map(VersionEntry::concrete).collect())
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let candidates = self.candidates(ctx, &request.name).await?;
        let py_tag = ctx.platform.conda_py_tag();

        let chosen = candidates
            .into_iter()
            .filter(|c| c.record.version == version)
            .max_by_key(|c| {
                // Prefer builds matching the interpreter; break ties on
                // build number (highest rebuild wins).
                let py_match = match &py_tag {
                    Some(tag) => {
                        if c.record.build.contains(tag.as_str()) {
                            2
                        } else if c.record.build.contains("py") {
                            0
                        } else {
                            1
                        }
                    }
                    None => 1,
                };
                (py_match, c.record.build_number)
            })
            .ok_or_else(|| AirliftError::PlatformIncompatible {
                message: format!(
                    "no {} build of {} {version} for {}",
                    py_tag.as_deref().unwrap_or("any"),
                    request.name,
                    ctx.platform.conda_subdir()
                ),
            })?;

        let base = self.channel_base(ctx);
        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Conda,
            name: request.name.clone(),
            version: version.to_string(),
            architecture: Some(chosen.subdir.clone()),
            url: format!("{base}/{}/{}", chosen.subdir, chosen.filename),
            file_name: chosen.filename.clone(),
            size: chosen.record.size,
            checksum: chosen
                .record
                .sha256
                .clone()
                .map(Checksum::Sha256)
                .or_else(|| chosen.record.md5.clone().map(Checksum::Md5)),
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("conda", &base),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let candidates = self.candidates(ctx, &artifact.name).await?;
        let record = candidates
            .into_iter()
            .find(|c| c.filename == artifact.file_name)
            .map(|c| c.record)
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("repodata entry for {} disappeared", artifact.file_name),
            })?;
        Ok(record
            .depends
            .iter()
            .filter_map(|spec| parse_match_spec(spec))
            .collect())
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => {
                match (Version::from_str(pin), Version::from_str(version)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => pin == version,
                }
            }
            VersionSpec::Range(spec) => {
                // Conda constraint grammar is close enough to PEP 440 for
                // the common >=, <=, !=, == and comma-joined forms.
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
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.cmp(b),
        }
    }
}

fn relevance(name: &str, query: &str) -> u8 {
    if name == query {
        0
    } else if name.starts_with(query) {
        1
    } else {
        2
    }
}

/// Parse one conda match-spec: `name [version-constraint [build]]`.
///
/// Virtual packages (`__glibc`, `__cuda`) describe the host, not a
/// fetchable dependency, and are skipped.
fn parse_match_spec(spec: &str) -> Option<DependencySpec> {
    let mut parts = spec.split_whitespace();
    let name = parts.next()?;
    if name.starts_with("__") {
        return None;
    }
    let constraint = parts.next().map(|c| c.to_string());
    let constraint = match constraint {
        // `1.2.3` in a match-spec means exactly that version; `1.2.*`,
        // `>=1.2` and friends are ranges.
        Some(c) if c == "*" => VersionSpec::Latest,
        Some(c) if c.contains(['>', '<', '!', '|', ',']) => VersionSpec::Range(c),
        Some(c) if c.ends_with(".*") => VersionSpec::Range(format!("=={c}")),
        Some(c) => VersionSpec::Exact(c),
        None => VersionSpec::Latest,
    };
    Some(DependencySpec {
        name: name.to_string(),
        constraint,
        optional: false,
        scope: "runtime".to_string(),
    })
}
