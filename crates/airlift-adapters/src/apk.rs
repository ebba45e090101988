//! Alpine apk adapter: `APKINDEX.tar.gz` parsing and `.apk` URL
//! synthesis for a configured branch and architecture.

use std::cmp::Ordering;
use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;

use airlift_core::{
    Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact, VersionSpec,
};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

const ALPINE_MIRROR: &str = "https://dl-cdn.alpinelinux.org/alpine";

/// One block from an APKINDEX.
#[derive(Debug, Clone, Default)]
pub struct ApkPackage {
    /// `P:` package name.
    pub name: String,
    /// `V:` version.
    pub version: String,
    /// `A:` architecture.
    pub arch: String,
    /// `S:` package size in bytes.
    pub size: Option<u64>,
    /// `T:` description.
    pub description: Option<String>,
    /// `D:` run-time dependencies.
    pub depends: Vec<String>,
}

pub struct ApkAdapter;

impl ApkAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Repository base: `{mirror}/{branch}/{repo}` (e.g.
    /// `.../alpine/v3.19/main`). A request override wins; otherwise the
    /// configured branch id completes the default mirror.
    fn base_url(&self, ctx: &AdapterContext, request_repo: Option<&str>) -> miette::Result<String> {
        if let Some(repo) = request_repo {
            return Ok(repo.trim_end_matches('/').to_string());
        }
        let dist = ctx.config.apk_distribution.as_ref().ok_or_else(|| {
            AirliftError::InvalidRequest {
                message: "apk requests need a branch or repository URL".to_string(),
            }
        })?;
        if dist.id.contains("://") {
            return Ok(dist.id.trim_end_matches('/').to_string());
        }
        Ok(format!("{ALPINE_MIRROR}/{}/main", dist.id))
    }

    async fn index(
        &self,
        ctx: &AdapterContext,
        base: &str,
    ) -> miette::Result<Vec<ApkPackage>> {
        let arch = ctx.platform.arch.canonical().unix_name();
        let url = format!("{base}/{arch}/APKINDEX.tar.gz");
        let body = ctx
            .cached_index(Ecosystem::Apk, &IndexRequest::get(&url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("no APKINDEX at {url}"),
            })?;
        let text = extract_apkindex(&body)?;
        Ok(parse_apkindex(&text))
    }

    async fn find(
        &self,
        ctx: &AdapterContext,
        base: &str,
        name: &str,
    ) -> miette::Result<Vec<ApkPackage>> {
        let mut matches: Vec<ApkPackage> = self
            .index(ctx, base)
            .await?
            .into_iter()
            .filter(|p| p.name == name)
            .collect();
        matches.sort_by(|a, b| apk_vercmp(&b.version, &a.version));
        Ok(matches)
    }
}

impl Default for ApkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for ApkAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Apk
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let base = self.base_url(ctx, None)?;
        let packages = self.index(ctx, &base).await?;
        let mut seen = std::collections::HashSet::new();
        let mut hits: Vec<SearchHit> = packages
            .into_iter()
            .filter(|p| p.name.contains(query) && seen.insert(p.name.clone()))
            .map(|p| SearchHit {
                version: p.version.clone(),
                description: p.description.clone(),
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
        let matches = self.find(ctx, &base, &request.name).await?;
        if matches.is_empty() {
            return Err(AirliftError::IndexUnavailable {
                message: format!("branch at {base} has no package {}", request.name),
            }
            .into());
        }
        Ok(matches
            .into_iter()
            .map(|p| VersionEntry::concrete(p.version))
            .collect())
    }

    async fn select_artifact(
        &self,
        ctx: &AdapterContext,
        request: &PackageRequest,
        version: &str,
    ) -> miette::Result<ResolvedArtifact> {
        let base = self.base_url(ctx, request.registry.as_deref())?;
        let arch = ctx.platform.arch.canonical().unix_name();
        let package = self
            .find(ctx, &base, &request.name)
            .await?
            .into_iter()
            .find(|p| p.version == version)
            .ok_or_else(|| AirliftError::PlatformIncompatible {
                message: format!("no {arch} build of {} {version} at {base}", request.name),
            })?;

        let file_name = format!("{}-{version}.apk", request.name);
        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Apk,
            name: request.name.clone(),
            version: version.to_string(),
            architecture: Some(package.arch.clone()),
            url: format!("{base}/{arch}/{file_name}"),
            file_name,
            size: package.size,
            checksum: None,
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("apk", &base),
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
        let package = self
            .find(ctx, &base, &artifact.name)
            .await?
            .into_iter()
            .find(|p| p.version == artifact.version)
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("APKINDEX block for {} disappeared", artifact.name),
            })?;
        let mut deps: Vec<DependencySpec> = package
            .depends
            .iter()
            .filter_map(|d| parse_apk_depend(d))
            .collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps.dedup_by(|a, b| a.name == b.name);
        Ok(deps)
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => apk_vercmp(pin, version) == Ordering::Equal,
            VersionSpec::Range(spec) => {
                let s = spec.trim();
                for op in [">=", "<=", ">", "<", "=", "~"] {
                    let Some(bound) = s.strip_prefix(op) else {
                        continue;
                    };
                    let ord = apk_vercmp(version, bound.trim());
                    return match op {
                        ">=" => ord != Ordering::Less,
                        "<=" => ord != Ordering::Greater,
                        ">" => ord == Ordering::Greater,
                        "<" => ord == Ordering::Less,
                        // `~` pins a prefix; close enough to equality here
                        _ => ord == Ordering::Equal || version.starts_with(bound.trim()),
                    };
                }
                false
            }
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        apk_vercmp(a, b)
    }
}

/// Pull the APKINDEX member out of the gzipped tar.
fn extract_apkindex(gz: &[u8]) -> miette::Result<String> {
    let decoder = GzDecoder::new(gz);
    let mut archive = tar::Archive::new(decoder);
    let entries = archive.entries().map_err(|e| AirliftError::Parse {
        message: format!("APKINDEX.tar.gz is not a valid archive: {e}"),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| AirliftError::Parse {
            message: format!("corrupt APKINDEX archive entry: {e}"),
        })?;
        let path = entry.path().map_err(AirliftError::Io)?;
        if path.file_name().and_then(|n| n.to_str()) == Some("APKINDEX") {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(AirliftError::Io)?;
            return Ok(text);
        }
    }
    Err(AirliftError::Parse {
        message: "archive contains no APKINDEX member".to_string(),
    }
    .into())
}

/// Parse APKINDEX blocks: single-letter `X:value` lines separated by
/// blank lines.
fn parse_apkindex(text: &str) -> Vec<ApkPackage> {
    let mut packages = Vec::new();
    for block in text.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut package = ApkPackage::default();
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key {
                "P" => package.name = value.to_string(),
                "V" => package.version = value.to_string(),
                "A" => package.arch = value.to_string(),
                "S" => package.size = value.parse().ok(),
                "T" => package.description = Some(value.to_string()),
                "D" => {
                    package.depends =
                        value.split_whitespace().map(str::to_string).collect();
                }
                _ => {}
            }
        }
        if !package.name.is_empty() && !package.version.is_empty() {
            packages.push(package);
        }
    }
    packages
}

/// One `D:` item: `name`, `name>=1.2`, `so:libc.musl-x86_64.so.1`,
/// `!conflict`, `cmd:sh`. Only plain package references become edges.
fn parse_apk_depend(raw: &str) -> Option<DependencySpec> {
    if raw.starts_with('!') || raw.contains(':') {
        return None;
    }
    let op_at = raw.find(['<', '>', '=', '~']);
    let (name, constraint) = match op_at {
        Some(i) => (&raw[..i], VersionSpec::parse(&raw[i..])),
        None => (raw, VersionSpec::Latest),
    };
    if name.is_empty() {
        return None;
    }
    Some(DependencySpec {
        name: name.to_string(),
        constraint,
        optional: false,
        scope: "runtime".to_string(),
    })
}

/// Alpine version comparison: digit/letter segments with `_alpha`-style
/// pre-release suffixes below release and `_p` patches above, then the
/// `-rN` build revision.
pub fn apk_vercmp(a: &str, b: &str) -> Ordering {
    let (av, ar) = split_rev(a);
    let (bv, br) = split_rev(b);
    version_core_cmp(av, bv).then_with(|| ar.cmp(&br))
}

fn split_rev(v: &str) -> (&str, u64) {
    match v.rsplit_once("-r") {
        Some((core, rev)) if rev.chars().all(|c| c.is_ascii_digit()) => {
            (core, rev.parse().unwrap_or(0))
        }
        _ => (v, 0),
    }
}

fn suffix_rank(s: &str) -> i32 {
    match s {
        "alpha" => -4,
        "beta" => -3,
        "pre" => -2,
        "rc" => -1,
        "p" => 1,
        _ => 0,
    }
}

fn version_core_cmp(a: &str, b: &str) -> Ordering {
    let (a_main, a_suffix) = a.split_once('_').unwrap_or((a, ""));
    let (b_main, b_suffix) = b.split_once('_').unwrap_or((b, ""));

    let mut a_parts = a_main.split('.');
    let mut b_parts = b_main.split('.');
    loop {
        match (a_parts.next(), b_parts.next()) {
            (None, None) => break,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = segment_cmp(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }

    let rank = |s: &str| {
        let word_end = s
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(s.len());
        let (word, num) = s.split_at(word_end);
        (
            suffix_rank(word),
            num.parse::<u64>().unwrap_or(0),
        )
    };
    rank(a_suffix).cmp(&rank(b_suffix))
}

/// One dotted segment: leading digits numerically, then any letter tail
/// lexically (`1a` > `1`).
fn segment_cmp(a: &str, b: &str) -> Ordering {
    fn digits(s: &str) -> (u64, &str) {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        (s[..end].parse::<u64>().unwrap_or(0), &s[end..])
    }
    let (an, atail) = digits(a);
    let (bn, btail) = digits(b);
    an.cmp(&bn).then_with(|| atail.cmp(btail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpine_version_ordering() {
        assert_eq!(apk_vercmp("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(apk_vercmp("1.2.10", "1.2.9"), Ordering::Greater);
        assert_eq!(apk_vercmp("8.5.0-r0", "8.4.0-r2"), Ordering::Greater);
        assert_eq!(apk_vercmp("8.5.0-r1", "8.5.0-r0"), Ordering::Greater);
        assert_eq!(apk_vercmp("1.2_rc1", "1.2"), Ordering::Less);
        assert_eq!(apk_vercmp("1.2_p1", "1.2"), Ordering::Greater);
        assert_eq!(apk_vercmp("1.2a", "1.2"), Ordering::Greater);
    }

    const APKINDEX: &str = "C:Q1abc\nP:curl\nV:8.5.0-r0\nA:x86_64\nS:265129\nI:573440\nT:URL retrieval utility and library\nU:https://curl.se/\nL:curl\nD:ca-certificates so:libc.musl-x86_64.so.1 libcurl>=8\n\nC:Q1def\nP:libcurl\nV:8.5.0-r0\nA:x86_64\nS:310000\nT:The multiprotocol file transfer library\nD:so:libc.musl-x86_64.so.1\n";

    #[test]
    fn apkindex_block_parsing() {
        let packages = parse_apkindex(APKINDEX);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "curl");
        assert_eq!(packages[0].version, "8.5.0-r0");
        assert_eq!(packages[0].size, Some(265_129));
        assert_eq!(packages[0].depends.len(), 3);
    }

    #[test]
    fn depend_items() {
        assert!(parse_apk_depend("so:libc.musl-x86_64.so.1").is_none());
        assert!(parse_apk_depend("!conflicting").is_none());
        let plain = parse_apk_depend("ca-certificates").unwrap();
        assert_eq!(plain.constraint, VersionSpec::Latest);
        let bounded = parse_apk_depend("libcurl>=8").unwrap();
        assert_eq!(bounded.name, "libcurl");
        assert_eq!(bounded.constraint, VersionSpec::Range(">=8".into()));
    }

    fn apkindex_tar_gz() -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("APKINDEX").unwrap();
        header.set_size(APKINDEX.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, APKINDEX.as_bytes()).unwrap();
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn resolve_from_apkindex() {
        let mut server = mockito::Server::new_async().await;
        let _index = server
            .mock("GET", "/x86_64/APKINDEX.tar.gz")
            .with_body(apkindex_tar_gz())
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = crate::adapter::test_context(tmp.path());
        let adapter = ApkAdapter::new();
        let mut request = PackageRequest::new(Ecosystem::Apk, "curl", "latest");
        request.registry = Some(server.url());

        let versions = adapter.list_versions(&ctx, &request).await.unwrap();
        assert_eq!(versions[0].version, "8.5.0-r0");

        let artifact = adapter
            .select_artifact(&ctx, &request, "8.5.0-r0")
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "curl-8.5.0-r0.apk");
        assert!(artifact.url.ends_with("/x86_64/curl-8.5.0-r0.apk"));

        let deps = adapter.dependencies(&ctx, &artifact).await.unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ca-certificates", "libcurl"]);
    }
}
