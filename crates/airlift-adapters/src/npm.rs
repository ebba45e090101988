//! npm registry adapter: packuments, dist-tags and semver ranges.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use node_semver::{Range, Version};
use serde::Deserialize;

use airlift_core::{Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact, VersionSpec};
use airlift_net::store::{TTL_IMMUTABLE, TTL_MUTABLE};
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

const NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Response from the registry package endpoint (the packument).
#[derive(Debug, Clone, Deserialize)]
struct Packument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    versions: HashMap<String, PackumentVersion>,
    #[serde(default, rename = "dist-tags")]
    dist_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PackumentVersion {
    version: String,
    dist: DistInfo,
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: HashMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DistInfo {
    tarball: String,
    #[serde(default)]
    shasum: Option<String>,
    #[serde(default)]
    integrity: Option<String>,
}

/// Search endpoint response shape.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    package: SearchPackage,
    #[serde(default)]
    score: SearchScore,
}

#[derive(Debug, Deserialize)]
struct SearchPackage {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchScore {
    #[serde(default, rename = "final")]
    final_score: f64,
}

pub struct NpmAdapter {
    registry: String,
}

impl NpmAdapter {
    pub fn new() -> Self {
        Self {
            registry: NPM_REGISTRY.to_string(),
        }
    }

    pub fn with_registry(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    /// Scoped names keep the `@` but encode the separating slash.
    fn packument_url(&self, name: &str) -> String {
        format!("{}/{}", self.registry, name.replace('/', "%2F"))
    }

    async fn packument(
        &self,
        ctx: &AdapterContext,
        name: &str,
    ) -> miette::Result<Packument> {
        let url = self.packument_url(name);
        let body = ctx
            .cached_index(Ecosystem::Npm, &IndexRequest::get(&url), TTL_MUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("npm registry has no package named {name}"),
            })?;
        serde_json::from_slice(&body).map_err(|e| {
            AirliftError::Parse {
                message: format!("malformed packument for {name}: {e}"),
            }
            .into()
        })
    }
}

impl Default for NpmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let url = format!(
            "{}/-/v1/search?text={}&size={}",
            self.registry,
            urlencoding::encode(query),
            limit.clamp(1, 100)
        );
        let body = ctx
            .cached_index(Ecosystem::Npm, &IndexRequest::get(&url), TTL_MUTABLE)
            .await?
            .unwrap_or_default();
        let response: SearchResponse =
            serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
                message: format!("malformed npm search response: {e}"),
            })?;

        let mut hits: Vec<(u8, f64, SearchHit)> = response
            .objects
            .into_iter()
            .map(|o| {
                let rank = relevance_rank(&o.package.name, query);
                (
                    rank,
                    o.score.final_score,
                    SearchHit {
                        name: o.package.name,
                        version: o.package.version,
                        description: o.package.description,
                        versions: None,
                    },
                )
            })
            .collect();
        // exact > prefix > substring; ties broken by registry score
        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
                .then_with(|| a.2.name.cmp(&b.2.name))
        });
        Ok(hits.into_iter().map(|(_, _, h)| h).take(limit).collect())
    }

    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>> {
        let packument = self.packument(ctx, &request.name).await?;
        let mut versions: Vec<String> = packument.versions.keys().cloned().collect();
        versions.sort_by(|a, b| self.compare_versions(b, a));
        let mut entries: Vec<VersionEntry> =
            versions.into_iter().map(VersionEntry::concrete).collect();
        for tag in packument.dist_tags.keys() {
            entries.push(VersionEntry::aliased(tag.clone()));
        }
        Ok(entries)
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let packument = self.packument(ctx, &request.name).await?;
        // A dist-tag alias pins to its concrete target.
        let concrete = packument
            .dist_tags
            .get(version)
            .cloned()
            .unwrap_or_else(|| version.to_string());
        let info = packument.versions.get(&concrete).ok_or_else(|| {
            AirliftError::IndexUnavailable {
                message: format!("npm has no version {concrete} of {}", request.name),
            }
        })?;

        let checksum = info
            .dist
            .integrity
            .clone()
            .map(Checksum::Integrity)
            .or_else(|| info.dist.shasum.clone().map(Checksum::Sha1));
        let file_name = info
            .dist
            .tarball
            .rsplit('/')
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{concrete}.tgz", request.name));

        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Npm,
            name: request.name.clone(),
            version: concrete,
            architecture: None,
            url: info.dist.tarball.clone(),
            file_name,
            size: None,
            checksum,
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("npm", &self.registry),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let packument = self.packument(ctx, &artifact.name).await?;
        let info = packument.versions.get(&artifact.version).ok_or_else(|| {
            AirliftError::IndexUnavailable {
                message: format!(
                    "npm lost version {} of {} between select and expand",
                    artifact.version, artifact.name
                ),
            }
        })?;

        let mut deps: Vec<DependencySpec> = info
            .dependencies
            .iter()
            .map(|(name, range)| DependencySpec {
                name: name.clone(),
                constraint: VersionSpec::parse(range),
                optional: false,
                scope: "runtime".to_string(),
            })
            .collect();
        for (name, range) in &info.optional_dependencies {
            deps.push(DependencySpec {
                name: name.clone(),
                constraint: VersionSpec::parse(range),
                optional: true,
                scope: "optional".to_string(),
            });
        }
        for (name, range) in &info.peer_dependencies {
            tracing::warn!(
                "{} {} declares peer dependency {name} {range}; not bundled",
                artifact.name,
                artifact.version
            );
        }
        // devDependencies never enter the closure.
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(deps)
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        let Ok(v) = Version::parse(version) else {
            return false;
        };
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => Version::parse(pin).map_or(pin == version, |p| p == v),
            VersionSpec::Range(range) => {
                Range::parse(range).map_or(false, |r| r.satisfies(&v))
            }
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        match (Version::parse(a), Version::parse(b)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.cmp(b),
        }
    }
}

/// Exact match ranks before prefix, prefix before substring, everything
/// else after.
fn relevance_rank(name: &str, query: &str) -> u8 {
    if name == query {
        0
    } else if name.starts_with(query) {
        1
    } else if name.contains(query) {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packument_json(server: &str) -> String {
        serde_json::json!({
            "name": "express",
            "description": "web framework",
            "dist-tags": {"latest": "4.18.2", "next": "5.0.0-beta.1"},
            "versions": {
                "4.18.2": {
                    "version": "4.18.2",
                    "dist": {
                        "tarball": format!("{server}/express/-/express-4.18.2.tgz"),
                        "shasum": "3fabe08296e930c796c19e3c516979386ba9fd59",
                        "integrity": "sha512-abc"
                    },
                    "dependencies": {"body-parser": "1.20.1", "cookie": "0.5.0"},
                    "peerDependencies": {},
                    "optionalDependencies": {}
                },
                "5.0.0-beta.1": {
                    "version": "5.0.0-beta.1",
                    "dist": {
                        "tarball": format!("{server}/express/-/express-5.0.0-beta.1.tgz"),
                        "shasum": "0000000000000000000000000000000000000000"
                    },
                    "dependencies": {},
                    "peerDependencies": {},
                    "optionalDependencies": {}
                }
            }
        })
        .to_string()
    }

    #[test]
    fn semver_ordering_and_ranges() {
        let adapter = NpmAdapter::new();
        assert_eq!(
            adapter.compare_versions("4.18.2", "4.2.0"),
            Ordering::Greater
        );
        assert!(adapter.version_matches(&VersionSpec::Range("^4.17.0".into()), "4.18.2"));
        assert!(!adapter.version_matches(&VersionSpec::Range("^4.17.0".into()), "5.0.0"));
        assert!(adapter.version_matches(&VersionSpec::Range("~1.20.0".into()), "1.20.3"));
    }

    #[test]
    fn relevance_ordering() {
        assert!(relevance_rank("react", "react") < relevance_rank("react-dom", "react"));
        assert!(relevance_rank("react-dom", "react") < relevance_rank("preact", "react"));
    }

    #[tokio::test]
    async fn dist_tag_resolves_to_concrete_version() {
        let mut server = mockito::Server::new_async().await;
        let body = packument_json(&server.url());
        let _m = server
            .mock("GET", "/express")
            .with_body(&body)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = NpmAdapter::with_registry(server.url());
        let request = PackageRequest::new(Ecosystem::Npm, "express", "latest");
        let artifact = adapter
            .select_artifact(&ctx, &request, "latest")
            .await
            .unwrap();
        assert_eq!(artifact.version, "4.18.2");
        assert_eq!(artifact.file_name, "express-4.18.2.tgz");
        assert_eq!(
            artifact.checksum,
            Some(Checksum::Integrity("sha512-abc".into()))
        );
    }

    #[tokio::test]
    async fn aliases_marked_in_version_list() {
        let mut server = mockito::Server::new_async().await;
        let body = packument_json(&server.url());
        let _m = server
            .mock("GET", "/express")
            .with_body(&body)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = NpmAdapter::with_registry(server.url());
        let request = PackageRequest::new(Ecosystem::Npm, "express", "latest");
        let versions = adapter.list_versions(&ctx, &request).await.unwrap();
        let concrete: Vec<&str> = versions
            .iter()
            .filter(|v| !v.alias)
            .map(|v| v.version.as_str())
            .collect();
        assert_eq!(concrete, vec!["5.0.0-beta.1", "4.18.2"]);
        assert!(versions.iter().any(|v| v.alias && v.version == "latest"));
    }

    #[tokio::test]
    async fn dependencies_exclude_peers() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "name": "ui-lib",
            "dist-tags": {"latest": "1.0.0"},
            "versions": {
                "1.0.0": {
                    "version": "1.0.0",
                    "dist": {"tarball": "https://reg/ui-lib/-/ui-lib-1.0.0.tgz"},
                    "dependencies": {"classnames": "^2.3.0"},
                    "peerDependencies": {"react": ">=17"},
                    "optionalDependencies": {"fsevents": "^2.0.0"}
                }
            }
        })
        .to_string();
        let _m = server
            .mock("GET", "/ui-lib")
            .with_body(&body)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = NpmAdapter::with_registry(server.url());
        let request = PackageRequest::new(Ecosystem::Npm, "ui-lib", "1.0.0");
        let artifact = adapter
            .select_artifact(&ctx, &request, "1.0.0")
            .await
            .unwrap();
        let deps = adapter.dependencies(&ctx, &artifact).await.unwrap();
        let names: Vec<(&str, bool)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.optional))
            .collect();
        assert!(names.contains(&("classnames", false)));
        assert!(names.contains(&("fsevents", true)));
        assert!(!names.iter().any(|(n, _)| *n == "react"));
    }

    #[test]
    fn scoped_names_encoded() {
        let adapter = NpmAdapter::new();
        assert_eq!(
            adapter.packument_url("@types/node"),
            "https://registry.npmjs.org/@types%2Fnode"
        );
    }
}
