//! yum/RPM repository adapter: repomd.xml discovery, primary.xml.gz
//! package records, and RPM EVR version ordering.

use std::cmp::Ordering;
use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;

use airlift_core::{
    AuxKind, AuxiliaryFile, Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact,
    VersionSpec,
};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

/// Known distribution ids mapped to mirror base URLs. `$basearch` is
/// substituted with the selected architecture; anything containing `://`
/// is taken as a literal base URL.
const DISTRIBUTIONS: &[(&str, &str)] = &[
    ("rocky9", "https://dl.rockylinux.org/pub/rocky/9/BaseOS/$basearch/os"),
    ("rocky8", "https://dl.rockylinux.org/pub/rocky/8/BaseOS/$basearch/os"),
    (
        "almalinux9",
        "https://repo.almalinux.org/almalinux/9/BaseOS/$basearch/os",
    ),
    (
        "centos-stream9",
        "https://mirror.stream.centos.org/9-stream/BaseOS/$basearch/os",
    ),
    (
        "fedora40",
        "https://dl.fedoraproject.org/pub/fedora/linux/releases/40/Everything/$basearch/os",
    ),
];

/// One `<package>` record from primary.xml.
#[derive(Debug, Clone, Default)]
pub struct RpmPackage {
    pub name: String,
    pub arch: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub summary: Option<String>,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    pub location: String,
    pub requires: Vec<RpmRequire>,
}

#[derive(Debug, Clone, Default)]
pub struct RpmRequire {
    pub name: String,
    pub flags: Option<String>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl RpmPackage {
    /// `epoch:version-release`, epoch elided when zero.
    pub fn evr(&self) -> String {
        if self.epoch.is_empty() || self.epoch == "0" {
            format!("{}-{}", self.version, self.release)
        } else {
            format!("{}:{}-{}", self.epoch, self.version, self.release)
        }
    }
}

pub struct YumAdapter;

impl YumAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Repository base URL for a request: per-request override first, then
    /// the configured distribution.
    fn base_url(&self, ctx: &AdapterContext, request_repo: Option<&str>) -> miette::Result<String> {
        let arch = ctx.platform.arch.canonical().unix_name();
        let raw = if let Some(repo) = request_repo {
            repo.to_string()
        } else if let Some(dist) = &ctx.config.yum_distribution {
            if dist.id.contains("://") {
                dist.id.clone()
            } else {
                DISTRIBUTIONS
                    .iter()
                    .find(|(id, _)| *id == dist.id)
                    .map(|(_, url)| url.to_string())
                    .ok_or_else(|| AirliftError::InvalidRequest {
                        message: format!("unknown yum distribution id {:?}", dist.id),
                    })?
            }
        } else {
            return Err(AirliftError::InvalidRequest {
                message: "yum requests need a distribution or repository URL".to_string(),
            }
            .into());
        };
        Ok(raw.replace("$basearch", arch).trim_end_matches('/').to_string())
    }

    /// Load and parse the primary package index for a repository.
    async fn primary(
        &self,
        ctx: &AdapterContext,
        base: &str,
    ) -> miette::Result<Vec<RpmPackage>> {
        let repomd_url = format!("{base}/repodata/repomd.xml");
        let repomd = ctx
            .cached_index(Ecosystem::Yum, &IndexRequest::get(&repomd_url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("no repomd.xml at {base}"),
            })?;
        let primary_href =
            parse_repomd_primary(&String::from_utf8_lossy(&repomd)).ok_or_else(|| {
                AirliftError::Parse {
                    message: format!("repomd.xml at {base} lists no primary index"),
                }
            })?;

        let primary_url = format!("{base}/{primary_href}");
        let gz = ctx
            .cached_index(Ecosystem::Yum, &IndexRequest::get(&primary_url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("primary index missing at {primary_url}"),
            })?;
        let mut xml = String::new();
        GzDecoder::new(gz.as_slice())
            .read_to_string(&mut xml)
            .map_err(|e| AirliftError::Parse {
                message: format!("primary.xml.gz at {base} is not valid gzip: {e}"),
            })?;
        parse_primary(&xml)
    }

    /// Packages for one name, filtered to compatible architectures.
    async fn find_packages(
        &self,
        ctx: &AdapterContext,
        base: &str,
        name: &str,
    ) -> miette::Result<Vec<RpmPackage>> {
        let arch = ctx.platform.arch.canonical().unix_name();
        let mut packages: Vec<RpmPackage> = self
            .primary(ctx, base)
            .await?
            .into_iter()
            .filter(|p| p.name == name && (p.arch == arch || p.arch == "noarch"))
            .collect();
        packages.sort_by(|a, b| compare_evr(&b.evr(), &a.evr()));
        Ok(packages)
    }
}

impl Default for YumAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for YumAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Yum
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let base = self.base_url(ctx, None)?;
        let packages = self.primary(ctx, &base).await?;
        let mut seen = std::collections::HashSet::new();
        let mut hits: Vec<SearchHit> = packages
            .into_iter()
            .filter(|p| p.name.contains(query) && seen.insert(p.name.clone()))
            .map(|p| SearchHit {
                version: p.evr(),
                description: p.summary.clone(),
                name: p.name,
                versions: None,
            })
            .collect();
        hits.sort_by_key(|h| {
            (
                if h.name == query {
                    0u8
                } else if h.name.starts_with(query) {
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
        let base = self.base_url(ctx, request.registry.as_deref())?;
        let packages = self.find_packages(ctx, &base, &request.name).await?;
        if packages.is_empty() {
            return Err(AirliftError::IndexUnavailable {
                message: format!("repository at {base} has no package {}", request.name),
            }
            .into());
        }
        Ok(packages
            .into_iter()
            .map(|p| VersionEntry::concrete(p.evr()))
            .collect())
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let base = self.base_url(ctx, request.registry.as_deref())?;
        let packages = self.find_packages(ctx, &base, &request.name).await?;
        let arch = ctx.platform.arch.canonical().unix_name();
        let package = packages
            .into_iter()
            .find(|p| compare_evr(&p.evr(), version) == Ordering::Equal)
            .ok_or_else(|| AirliftError::PlatformIncompatible {
                message: format!(
                    "no {} build of {} {version} in {base}",
                    arch, request.name
                ),
            })?;

        let file_name = package
            .location
            .rsplit('/')
            .next()
            .unwrap_or(&package.location)
            .to_string();
        let auxiliary = vec![
            AuxiliaryFile {
                url: format!("{base}/repodata/repomd.xml"),
                file_name: "repomd.xml".to_string(),
                kind: AuxKind::IndexFragment,
                checksum: None,
                optional: true,
            },
        ];

        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Yum,
            name: request.name.clone(),
            version: package.evr(),
            architecture: Some(package.arch.clone()),
            url: format!("{base}/{}", package.location),
            file_name,
            size: package.size,
            checksum: package.checksum.clone().map(Checksum::Sha256),
            auxiliary,
            repository: RepoDescriptor::new("yum", &base),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let base = artifact.repository.base_url.clone();
        let packages = self.find_packages(ctx, &base, &artifact.name).await?;
        let package = packages
            .into_iter()
            .find(|p| compare_evr(&p.evr(), &artifact.version) == Ordering::Equal)
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("primary entry for {} disappeared", artifact.name),
            })?;

        let mut deps = Vec::new();
        for require in &package.requires {
            // Capabilities (shared objects, file paths, rpmlib features)
            // are host facts, not fetchable packages.
            if require.name.starts_with('/')
                || require.name.contains('(')
                || require.name.starts_with("rpmlib")
            {
                continue;
            }
            let constraint = match (&require.flags, &require.version) {
                (Some(flags), Some(version)) => {
                    let evr = match &require.release {
                        Some(release) => format!("{version}-{release}"),
                        None => version.clone(),
                    };
                    let op = match flags.as_str() {
                        "EQ" => "==",
                        "GE" => ">=",
                        "GT" => ">",
                        "LE" => "<=",
                        "LT" => "<",
                        _ => "==",
                    };
                    VersionSpec::Range(format!("{op}{evr}"))
                }
                _ => VersionSpec::Latest,
            };
            deps.push(DependencySpec {
                name: require.name.clone(),
                constraint,
                optional: false,
                scope: "runtime".to_string(),
            });
        }
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps.dedup_by(|a, b| a.name == b.name);
        Ok(deps)
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => compare_evr(pin, version) == Ordering::Equal,
            VersionSpec::Range(spec) => match parse_evr_constraint(spec) {
                Some((op, bound)) => {
                    let ord = compare_evr(version, &bound);
                    match op {
                        "==" => ord == Ordering::Equal,
                        ">=" => ord != Ordering::Less,
                        ">" => ord == Ordering::Greater,
                        "<=" => ord != Ordering::Greater,
                        "<" => ord == Ordering::Less,
                        _ => false,
                    }
                }
                None => false,
            },
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        compare_evr(a, b)
    }
}

/// Split a `>=1.2.3-4` style constraint into operator and EVR bound.
fn parse_evr_constraint(spec: &str) -> Option<(&'static str, String)> {
    let s = spec.trim();
    for op in ["==", ">=", "<=", ">", "<"] {
        if let Some(rest) = s.strip_prefix(op) {
            return Some((op, rest.trim().to_string()));
        }
    }
    None
}

/// Compare two `epoch:version-release` strings with rpm semantics.
pub fn compare_evr(a: &str, b: &str) -> Ordering {
    let (ae, av, ar) = split_evr(a);
    let (be, bv, br) = split_evr(b);
    ae.cmp(&be)
        .then_with(|| rpm_vercmp(av, bv))
        .then_with(|| match (ar, br) {
            // A missing release matches any release (constraint style).
            (Some(ar), Some(br)) => rpm_vercmp(ar, br),
            _ => Ordering::Equal,
        })
}

fn split_evr(evr: &str) -> (u64, &str, Option<&str>) {
    let (epoch, rest) = match evr.split_once(':') {
        Some((e, rest)) => (e.parse().unwrap_or(0), rest),
        None => (0, evr),
    };
    match rest.split_once('-') {
        Some((version, release)) => (epoch, version, Some(release)),
        None => (epoch, rest, None),
    }
}

/// The rpmvercmp algorithm: alternating alpha/digit segments, numeric
/// comparison for digits, tilde sorting before everything.
pub fn rpm_vercmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // skip separators
        while !a.is_empty() && !a[0].is_ascii_alphanumeric() && a[0] != b'~' {
            a = &a[1..];
        }
        while !b.is_empty() && !b[0].is_ascii_alphanumeric() && b[0] != b'~' {
            b = &b[1..];
        }

        match (a.first(), b.first()) {
            (Some(b'~'), Some(b'~')) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            _ => {}
        }

        let a_digit = a[0].is_ascii_digit();
        let take = |s: &mut &[u8], digits: bool| -> Vec<u8> {
            let end = s
                .iter()
                .position(|c| {
                    if digits {
                        !c.is_ascii_digit()
                    } else {
                        !c.is_ascii_alphabetic()
                    }
                })
                .unwrap_or(s.len());
            let (seg, rest) = s.split_at(end);
            *s = rest;
            seg.to_vec()
        };
        let seg_a = take(&mut a, a_digit);
        let b_digit = b[0].is_ascii_digit();
        let seg_b = take(&mut b, b_digit);

        if seg_b.is_empty() {
            // types differ at this position: numeric beats alpha
            return if a_digit {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if a_digit != b_digit {
            return if a_digit {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if a_digit {
            let ta: &[u8] = strip_zeros(&seg_a);
            let tb: &[u8] = strip_zeros(&seg_b);
            ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb))
        } else {
            seg_a.cmp(&seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn strip_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Locate the primary index href inside repomd.xml.
fn parse_repomd_primary(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_primary = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"data" => {
                in_primary = e.attributes().flatten().any(|a| {
                    a.key.as_ref() == b"type" && a.value.as_ref() == b"primary"
                });
            }
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_primary && e.name().as_ref() == b"location" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"href" {
                        return Some(String::from_utf8_lossy(&attr.value).to_string());
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

/// Parse primary.xml into package records.
fn parse_primary(xml: &str) -> miette::Result<Vec<RpmPackage>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut packages = Vec::new();
    let mut current: Option<RpmPackage> = None;
    let mut in_requires = false;
    let mut text = String::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event();
        match event {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let is_empty = matches!(event, Ok(Event::Empty(_)));
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = name.rsplit(':').next().unwrap_or(&name).to_string();
                if !is_empty {
                    path.push(local.clone());
                }
                text.clear();

                match local.as_str() {
                    "package" if !is_empty => current = Some(RpmPackage::default()),
                    "version" => {
                        if let Some(pkg) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                let value = String::from_utf8_lossy(&attr.value).to_string();
                                match attr.key.as_ref() {
                                    b"epoch" => pkg.epoch = value,
                                    b"ver" => pkg.version = value,
                                    b"rel" => pkg.release = value,
                                    _ => {}
                                }
                            }
                        }
                    }
                    "size" => {
                        if let Some(pkg) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"package" {
                                    pkg.size =
                                        String::from_utf8_lossy(&attr.value).parse().ok();
                                }
                            }
                        }
                    }
                    "location" => {
                        if let Some(pkg) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"href" {
                                    pkg.location =
                                        String::from_utf8_lossy(&attr.value).to_string();
                                }
                            }
                        }
                    }
                    "requires" => in_requires = !is_empty,
                    "entry" if in_requires => {
                        if let Some(pkg) = current.as_mut() {
                            let mut require = RpmRequire::default();
                            for attr in e.attributes().flatten() {
                                let value = String::from_utf8_lossy(&attr.value).to_string();
                                match attr.key.as_ref() {
                                    b"name" => require.name = value,
                                    b"flags" => require.flags = Some(value),
                                    b"epoch" => require.epoch = Some(value),
                                    b"ver" => require.version = Some(value),
                                    b"rel" => require.release = Some(value),
                                    _ => {}
                                }
                            }
                            pkg.requires.push(require);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                text = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = name.rsplit(':').next().unwrap_or(&name).to_string();
                if let Some(pkg) = current.as_mut() {
                    match local.as_str() {
                        "name" if path.len() == 3 => pkg.name = text.clone(),
                        "arch" if path.len() == 3 => pkg.arch = text.clone(),
                        "summary" if path.len() == 3 => pkg.summary = Some(text.clone()),
                        "checksum" if path.len() == 3 => pkg.checksum = Some(text.clone()),
                        "requires" => in_requires = false,
                        "package" => {
                            if let Some(pkg) = current.take() {
                                packages.push(pkg);
                            }
                        }
                        _ => {}
                    }
                }
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AirliftError::Parse {
                    message: format!("malformed primary.xml: {e}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evr_ordering() {
        assert_eq!(rpm_vercmp("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(rpm_vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(rpm_vercmp("1.02", "1.2"), Ordering::Equal);
        assert_eq!(rpm_vercmp("1.2a", "1.2"), Ordering::Less);
        assert_eq!(rpm_vercmp("1.2~rc1", "1.2"), Ordering::Less);
        assert_eq!(compare_evr("1:1.0-1", "2.0-1"), Ordering::Greater);
        assert_eq!(compare_evr("5.2.15-1.el9", "5.2.15-1.el9"), Ordering::Equal);
        assert_eq!(compare_evr("5.2.15", "5.2.15-1.el9"), Ordering::Equal);
    }

    const REPOMD: &str = r#"<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <location href="repodata/abc123-primary.xml.gz"/>
  </data>
  <data type="filelists">
    <location href="repodata/def456-filelists.xml.gz"/>
  </data>
</repomd>"#;

    #[test]
    fn repomd_primary_href() {
        assert_eq!(
            parse_repomd_primary(REPOMD).as_deref(),
            Some("repodata/abc123-primary.xml.gz")
        );
    }

    const PRIMARY: &str = r#"<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
<package type="rpm">
  <name>bash</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="5.2.15" rel="1.el9"/>
  <checksum type="sha256" pkgid="YES">aabbcc</checksum>
  <summary>The GNU Bourne Again shell</summary>
  <size package="1830920" installed="7555736" archive="7558824"/>
  <location href="Packages/b/bash-5.2.15-1.el9.x86_64.rpm"/>
  <format>
    <rpm:requires>
      <rpm:entry name="glibc" flags="GE" epoch="0" ver="2.34"/>
      <rpm:entry name="libc.so.6(GLIBC_2.34)(64bit)"/>
      <rpm:entry name="/usr/bin/sh"/>
      <rpm:entry name="rpmlib(CompressedFileNames)" flags="LE" epoch="0" ver="3.0.4" rel="1"/>
      <rpm:entry name="ncurses-libs"/>
    </rpm:requires>
  </format>
</package>
<package type="rpm">
  <name>bash</name>
  <arch>aarch64</arch>
  <version epoch="0" ver="5.2.15" rel="1.el9"/>
  <checksum type="sha256" pkgid="YES">ddeeff</checksum>
  <summary>The GNU Bourne Again shell</summary>
  <size package="1700000"/>
  <location href="Packages/b/bash-5.2.15-1.el9.aarch64.rpm"/>
</package>
</metadata>"#;

    #[test]
    fn primary_parsing() {
        let packages = parse_primary(PRIMARY).unwrap();
        assert_eq!(packages.len(), 2);
        let bash = &packages[0];
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.arch, "x86_64");
        assert_eq!(bash.evr(), "5.2.15-1.el9");
        assert_eq!(bash.size, Some(1_830_920));
        assert_eq!(bash.location, "Packages/b/bash-5.2.15-1.el9.x86_64.rpm");
        assert_eq!(bash.requires.len(), 5);
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn select_and_dependencies_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let _repomd = server
            .mock("GET", "/repodata/repomd.xml")
            .with_body(REPOMD)
            .create_async()
            .await;
        let _primary = server
            .mock("GET", "/repodata/abc123-primary.xml.gz")
            .with_body(gzip(PRIMARY.as_bytes()))
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = YumAdapter::new();
        let mut request = PackageRequest::new(Ecosystem::Yum, "bash", "latest");
        request.registry = Some(server.url());

        let versions = adapter.list_versions(&ctx, &request).await.unwrap();
        assert_eq!(versions[0].version, "5.2.15-1.el9");

        let artifact = adapter
            .select_artifact(&ctx, &request, "5.2.15-1.el9")
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "bash-5.2.15-1.el9.x86_64.rpm");
        assert_eq!(artifact.architecture.as_deref(), Some("x86_64"));
        assert!(artifact.url.ends_with("/Packages/b/bash-5.2.15-1.el9.x86_64.rpm"));
        assert_eq!(artifact.checksum, Some(Checksum::Sha256("aabbcc".into())));

        let deps = adapter.dependencies(&ctx, &artifact).await.unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["glibc", "ncurses-libs"]);
        assert_eq!(
            deps[0].constraint,
            VersionSpec::Range(">=2.34".into())
        );
    }

    #[test]
    fn basearch_substitution() {
        let found = DISTRIBUTIONS.iter().find(|(id, _)| *id == "rocky9").unwrap();
        assert!(found.1.contains("$basearch"));
    }
}
