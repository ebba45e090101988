//! Maven repository adapter: coordinate URLs, metadata version listing,
//! POM-driven dependency extraction with parent and BOM resolution.

pub mod metadata;
pub mod pom;
pub mod version;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Deserialize;

use airlift_core::{
    AuxKind, AuxiliaryFile, Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact,
    VersionSpec,
};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::{extract_sidecar_hash, Checksum};

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};
use pom::Pom;
use version::{MavenRange, MavenVersion};

const MAVEN_CENTRAL: &str = "https://repo.maven.apache.org/maven2";
const SEARCH_ENDPOINT: &str = "https://search.maven.org/solrsearch/select";

/// How far up a `<parent>` chain we will walk before giving up.
const MAX_PARENT_DEPTH: usize = 10;

/// A `groupId:artifactId` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Coordinate {
    group: String,
    artifact: String,
}

impl Coordinate {
    fn parse(name: &str) -> miette::Result<Self> {
        let (group, artifact) = name.split_once(':').ok_or_else(|| {
            AirliftError::InvalidRequest {
                message: format!("maven coordinates must be groupId:artifactId, got {name:?}"),
            }
        })?;
        if group.is_empty() || artifact.is_empty() {
            return Err(AirliftError::InvalidRequest {
                message: format!("incomplete maven coordinate {name:?}"),
            }
            .into());
        }
        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
        })
    }

    /// `org.springframework` becomes `org/springframework`.
    fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }
}

#[derive(Debug, Deserialize)]
struct SolrResponse {
    response: SolrBody,
}

#[derive(Debug, Deserialize)]
struct SolrBody {
    #[serde(default)]
    docs: Vec<SolrDoc>,
}

#[derive(Debug, Deserialize)]
struct SolrDoc {
    id: String,
    #[serde(default, rename = "latestVersion")]
    latest_version: Option<String>,
}

pub struct MavenAdapter {
    repo: String,
    search_base: String,
}

impl MavenAdapter {
    pub fn new() -> Self {
        Self {
            repo: MAVEN_CENTRAL.to_string(),
            search_base: SEARCH_ENDPOINT.to_string(),
        }
    }

    pub fn with_repo(repo: impl Into<String>) -> Self {
        let repo = repo.into();
        Self {
            search_base: format!("{}/solrsearch/select", repo.trim_end_matches('/')),
            repo,
        }
    }

    /// Repository base for a request, honoring a per-request override.
    fn repo_base(&self, request_repo: Option<&str>) -> String {
        request_repo
            .map(|r| r.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.repo.clone())
    }

    fn file_url(&self, base: &str, coord: &Coordinate, version: &str, file: &str) -> String {
        format!(
            "{base}/{}/{}/{version}/{file}",
            coord.group_path(),
            coord.artifact
        )
    }

    async fn fetch_pom(
        &self,
        ctx: &AdapterContext,
        base: &str,
        coord: &Coordinate,
        version: &str,
    ) -> miette::Result<Option<Pom>> {
        let url = self.file_url(
            base,
            coord,
            version,
            &format!("{}-{version}.pom", coord.artifact),
        );
        let body = ctx
            .cached_index(Ecosystem::Maven, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?;
        match body {
            Some(bytes) => {
                let xml = String::from_utf8_lossy(&bytes);
                Ok(Some(pom::parse_pom(&xml)?))
            }
            None => Ok(None),
        }
    }

    /// Build the effective POM: the artifact's own POM with its parent
    /// chain folded in and BOM imports expanded into dependency
    /// management.
    async fn effective_pom(
        &self,
        ctx: &AdapterContext,
        base: &str,
        coord: &Coordinate,
        version: &str,
    ) -> miette::Result<Pom> {
        let mut pom = self
            .fetch_pom(ctx, base, coord, version)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!(
                    "repository has no POM for {}:{} {version}",
                    coord.group, coord.artifact
                ),
            })?;

        // Parent chain
        let mut depth = 0;
        let mut parent_ref = pom.parent.clone();
        while let Some(parent) = parent_ref {
            if depth >= MAX_PARENT_DEPTH {
                tracing::warn!(
                    "parent chain for {}:{} exceeds {MAX_PARENT_DEPTH}, truncating",
                    coord.group,
                    coord.artifact
                );
                break;
            }
            depth += 1;
            let parent_coord = Coordinate {
                group: parent.group_id.clone(),
                artifact: parent.artifact_id.clone(),
            };
            match self
                .fetch_pom(ctx, base, &parent_coord, &parent.version)
                .await?
            {
                Some(parent_pom) => {
                    pom.apply_parent(&parent_pom);
                    parent_ref = parent_pom.parent.clone();
                }
                None => {
                    tracing::warn!(
                        "parent POM {}:{} {} not found",
                        parent.group_id,
                        parent.artifact_id,
                        parent.version
                    );
                    break;
                }
            }
        }

        pom.resolve_properties();

        // BOM imports contribute managed versions
        let imports: Vec<(String, String, Option<String>)> = pom
            .bom_imports()
            .iter()
            .map(|d| (d.group_id.clone(), d.artifact_id.clone(), d.version.clone()))
            .collect();
        for (group, artifact, bom_version) in imports {
            let Some(bom_version) = bom_version else {
                continue;
            };
            let bom_coord = Coordinate { group, artifact };
            if let Some(mut bom) = self
                .fetch_pom(ctx, base, &bom_coord, &bom_version)
                .await?
            {
                bom.resolve_properties();
                for dm in bom.dependency_management {
                    if pom
                        .managed_version(&dm.group_id, &dm.artifact_id)
                        .is_none()
                    {
                        pom.dependency_management.push(dm);
                    }
                }
            }
        }

        pom.resolve_properties();
        Ok(pom)
    }

    /// Read a checksum sidecar, when the repository publishes one.
    async fn sidecar_sha1(
        &self,
        ctx: &AdapterContext,
        url: &str,
    ) -> miette::Result<Option<String>> {
        let body = ctx
            .cached_index(
                Ecosystem::Maven,
                &IndexRequest::get(format!("{url}.sha1")),
                TTL_IMMUTABLE,
            )
            .await?;
        Ok(body.map(|b| extract_sidecar_hash(&String::from_utf8_lossy(&b))))
    }
}

impl Default for MavenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for MavenAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let url = format!(
            "{}?q={}&rows={}&wt=json",
            self.search_base,
            urlencoding::encode(query),
            limit.clamp(1, 50)
        );
        let body = ctx
            .cached_index(
                Ecosystem::Maven,
                &IndexRequest::get(&url),
                airlift_net::store::TTL_MUTABLE,
            )
            .await?
            .unwrap_or_default();
        let solr: SolrResponse =
            serde_json::from_slice(&body).map_err(|e| AirliftError::Parse {
                message: format!("malformed search response: {e}"),
            })?;
        let mut hits: Vec<SearchHit> = solr
            .response
            .docs
            .into_iter()
            .map(|d| SearchHit {
                name: d.id,
                version: d.latest_version.unwrap_or_default(),
                description: None,
                versions: None,
            })
            .collect();
        hits.sort_by_key(|h| {
            let artifact = h.name.split(':').nth(1).unwrap_or(&h.name).to_string();
            (
                if artifact == query {
                    0u8
                } else if artifact.starts_with(query) {
                    1
                } else {
                    2
                },
                h.name.clone(),
            )
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list_versions(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
    ) -> miette::Result<Vec<VersionEntry>> {
        let coord = Coordinate::parse(&request.name)?;
        let base = self.repo_base(request.registry.as_deref());
        let url = format!(
            "{base}/{}/{}/maven-metadata.xml",
            coord.group_path(),
            coord.artifact
        );
        let body = ctx
            .cached_index(Ecosystem::Maven, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("no maven-metadata.xml for {}", request.name),
            })?;
        let meta = metadata::parse_metadata(&String::from_utf8_lossy(&body))?;
        let mut versions = meta.versions;
        versions.sort_by(|a, b| MavenVersion::parse(b).cmp(&MavenVersion::parse(a)));
        Ok(versions.into_iter().map(VersionEntry::concrete).collect())
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let coord = Coordinate::parse(&request.name)?;
        let base = self.repo_base(request.registry.as_deref());
        let jar_name = format!("{}-{version}.jar", coord.artifact);
        let pom_name = format!("{}-{version}.pom", coord.artifact);
        let jar_url = self.file_url(&base, &coord, version, &jar_name);
        let pom_url = self.file_url(&base, &coord, version, &pom_name);

        // Sidecars are advisory; an unreachable one must not fail selection.
        let checksum = match self.sidecar_sha1(ctx, &jar_url).await {
            Ok(sha1) => sha1.map(Checksum::Sha1),
            Err(e) => {
                tracing::warn!("no checksum sidecar for {jar_url}: {e}");
                None
            }
        };

        let auxiliary = vec![
            AuxiliaryFile {
                url: pom_url.clone(),
                file_name: pom_name.clone(),
                kind: AuxKind::Pom,
                checksum: None,
                optional: false,
            },
            AuxiliaryFile {
                url: format!("{jar_url}.sha1"),
                file_name: format!("{jar_name}.sha1"),
                kind: AuxKind::ChecksumSidecar,
                checksum: None,
                optional: true,
            },
            AuxiliaryFile {
                url: format!("{pom_url}.sha1"),
                file_name: format!("{pom_name}.sha1"),
                kind: AuxKind::ChecksumSidecar,
                checksum: None,
                optional: true,
            },
        ];

        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Maven,
            name: request.name.clone(),
            version: version.to_string(),
            architecture: None,
            url: jar_url,
            file_name: jar_name,
            size: None,
            checksum,
            auxiliary,
            repository: RepoDescriptor::new("maven", &base),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let coord = Coordinate::parse(&artifact.name)?;
        let base = artifact.repository.base_url.clone();
        let pom = self
            .effective_pom(ctx, &base, &coord, &artifact.version)
            .await?;

        let mut deps = Vec::new();
        for dep in &pom.dependencies {
            let scope = dep.scope.as_deref().unwrap_or("compile");
            // test/provided/system never enter the runtime closure
            if matches!(scope, "test" | "provided" | "system") {
                continue;
            }
            let version = dep
                .version
                .clone()
                .or_else(|| {
                    pom.managed_version(&dep.group_id, &dep.artifact_id)
                        .map(str::to_string)
                });
            let Some(version) = version else {
                tracing::warn!(
                    "no version for {}:{} in {} {}, skipping",
                    dep.group_id,
                    dep.artifact_id,
                    artifact.name,
                    artifact.version
                );
                continue;
            };
            deps.push(DependencySpec {
                name: format!("{}:{}", dep.group_id, dep.artifact_id),
                constraint: VersionSpec::parse(&version),
                optional: dep.optional,
                scope: scope.to_string(),
            });
        }
        Ok(deps)
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        let v = MavenVersion::parse(version);
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => MavenVersion::parse(pin) == v,
            VersionSpec::Range(spec) => match MavenRange::parse(spec) {
                Some(range) => range.contains(&v),
                None => MavenVersion::parse(spec) == v,
            },
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        MavenVersion::parse(a).cmp(&MavenVersion::parse(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_parsing() {
        let c = Coordinate::parse("org.springframework:spring-core").unwrap();
        assert_eq!(c.group_path(), "org/springframework");
        assert!(Coordinate::parse("spring-core").is_err());
        assert!(Coordinate::parse(":spring-core").is_err());
    }

    #[test]
    fn url_synthesis() {
        let adapter = MavenAdapter::new();
        let coord = Coordinate::parse("org.springframework:spring-core").unwrap();
        let url = adapter.file_url(MAVEN_CENTRAL, &coord, "5.3.0", "spring-core-5.3.0.jar");
        assert_eq!(
            url,
            "https://repo.maven.apache.org/maven2/org/springframework/spring-core/5.3.0/spring-core-5.3.0.jar"
        );
    }

    #[test]
    fn range_and_exact_matching() {
        let adapter = MavenAdapter::new();
        assert!(adapter.version_matches(&VersionSpec::Range("[1.0,2.0)".into()), "1.5"));
        assert!(!adapter.version_matches(&VersionSpec::Range("[1.0,2.0)".into()), "2.0"));
        assert!(adapter.version_matches(&VersionSpec::Exact("1.0".into()), "1.0.0"));
    }

    fn metadata_xml() -> &'static str {
        r#"<metadata>
  <groupId>org.springframework</groupId>
  <artifactId>spring-core</artifactId>
  <versioning>
    <latest>6.1.3</latest>
    <versions>
      <version>5.2.0.RELEASE</version>
      <version>5.3.0</version>
      <version>6.1.3</version>
    </versions>
  </versioning>
</metadata>"#
    }

    #[tokio::test]
    async fn list_versions_newest_first() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock(
                "GET",
                "/org/springframework/spring-core/maven-metadata.xml",
            )
            .with_body(metadata_xml())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = MavenAdapter::with_repo(server.url());
        let request =
            PackageRequest::new(Ecosystem::Maven, "org.springframework:spring-core", "latest");
        let versions = adapter.list_versions(&ctx, &request).await.unwrap();
        assert_eq!(versions[0].version, "6.1.3");
        assert_eq!(versions.last().unwrap().version, "5.2.0.RELEASE");
    }

    #[tokio::test]
    async fn select_registers_pom_and_sha1_auxiliaries() {
        let mut server = mockito::Server::new_async().await;
        let _sha = server
            .mock(
                "GET",
                "/org/springframework/spring-core/5.3.0/spring-core-5.3.0.jar.sha1",
            )
            .with_body("0123456789abcdef0123  spring-core-5.3.0.jar")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = MavenAdapter::with_repo(server.url());
        let request =
            PackageRequest::new(Ecosystem::Maven, "org.springframework:spring-core", "5.3.0");
        let artifact = adapter
            .select_artifact(&ctx, &request, "5.3.0")
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "spring-core-5.3.0.jar");
        assert_eq!(
            artifact.checksum,
            Some(Checksum::Sha1("0123456789abcdef0123".into()))
        );
        let aux_names: Vec<&str> = artifact
            .auxiliary
            .iter()
            .map(|a| a.file_name.as_str())
            .collect();
        assert_eq!(
            aux_names,
            vec![
                "spring-core-5.3.0.pom",
                "spring-core-5.3.0.jar.sha1",
                "spring-core-5.3.0.pom.sha1"
            ]
        );
        let pom_aux = &artifact.auxiliary[0];
        assert!(!pom_aux.optional);
        assert_eq!(pom_aux.kind, AuxKind::Pom);
    }

    #[tokio::test]
    async fn dependencies_resolve_managed_versions_and_scopes() {
        let mut server = mockito::Server::new_async().await;
        let core_pom = r#"<project>
            <groupId>org.springframework</groupId>
            <artifactId>spring-core</artifactId>
            <version>5.3.0</version>
            <parent>
                <groupId>org.springframework</groupId>
                <artifactId>spring-parent</artifactId>
                <version>5.3.0</version>
            </parent>
            <dependencies>
                <dependency>
                    <groupId>org.springframework</groupId>
                    <artifactId>spring-jcl</artifactId>
                </dependency>
                <dependency>
                    <groupId>junit</groupId>
                    <artifactId>junit</artifactId>
                    <version>4.13.2</version>
                    <scope>test</scope>
                </dependency>
            </dependencies>
        </project>"#;
        let parent_pom = r#"<project>
            <groupId>org.springframework</groupId>
            <artifactId>spring-parent</artifactId>
            <version>5.3.0</version>
            <dependencyManagement>
                <dependencies>
                    <dependency>
                        <groupId>org.springframework</groupId>
                        <artifactId>spring-jcl</artifactId>
                        <version>5.3.0</version>
                    </dependency>
                </dependencies>
            </dependencyManagement>
        </project>"#;
        let _core = server
            .mock(
                "GET",
                "/org/springframework/spring-core/5.3.0/spring-core-5.3.0.pom",
            )
            .with_body(core_pom)
            .create_async()
            .await;
        let _parent = server
            .mock(
                "GET",
                "/org/springframework/spring-parent/5.3.0/spring-parent-5.3.0.pom",
            )
            .with_body(parent_pom)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = MavenAdapter::with_repo(server.url());
        let request =
            PackageRequest::new(Ecosystem::Maven, "org.springframework:spring-core", "5.3.0");
        let mut artifact = adapter
            .select_artifact(&ctx, &request, "5.3.0")
            .await
            .unwrap();
        artifact.repository = RepoDescriptor::new("maven", &server.url());
        let deps = adapter.dependencies(&ctx, &artifact).await.unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "org.springframework:spring-jcl");
        assert_eq!(deps[0].constraint, VersionSpec::Exact("5.3.0".into()));
    }
}
