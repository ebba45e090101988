//! apt/DEB repository adapter: `Release` + `Packages.gz` record parsing,
//! Debian version ordering, and Depends/Pre-Depends/Recommends policy.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;

use airlift_core::{
    Ecosystem, PackageRequest, RepoDescriptor, ResolvedArtifact, VersionSpec,
};
use airlift_net::store::TTL_IMMUTABLE;
use airlift_net::IndexRequest;
use airlift_util::error::AirliftError;
use airlift_util::hash::Checksum;

use crate::adapter::{
    AdapterContext, DependencySpec, EcosystemAdapter, SearchHit, VersionEntry,
};

/// Known distribution ids: `(id, base_url, suite, component)`.
const DISTRIBUTIONS: &[(&str, &str, &str, &str)] = &[
    ("debian-bookworm", "https://deb.debian.org/debian", "bookworm", "main"),
    ("debian-bullseye", "https://deb.debian.org/debian", "bullseye", "main"),
    ("ubuntu-jammy", "http://archive.ubuntu.com/ubuntu", "jammy", "main"),
    ("ubuntu-noble", "http://archive.ubuntu.com/ubuntu", "noble", "main"),
];

/// One record from a Packages index.
#[derive(Debug, Clone, Default)]
pub struct DebPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub filename: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub description: Option<String>,
    pub depends: Vec<String>,
    pub pre_depends: Vec<String>,
    pub recommends: Vec<String>,
}

/// A concrete repository location: base URL, suite, component.
#[derive(Debug, Clone)]
struct AptRepo {
    base: String,
    suite: String,
    component: String,
}

pub struct AptAdapter;

impl AptAdapter {
    pub fn new() -> Self {
        Self
    }

    fn repo_for(&self, ctx: &AdapterContext, request_repo: Option<&str>) -> miette::Result<AptRepo> {
        if let Some(raw) = request_repo {
            // `https://host/debian bookworm main` or a bare base URL
            let mut parts = raw.split_whitespace();
            let base = parts.next().unwrap_or(raw).trim_end_matches('/').to_string();
            return Ok(AptRepo {
                base,
                suite: parts.next().unwrap_or("stable").to_string(),
                component: parts.next().unwrap_or("main").to_string(),
            });
        }
        let dist = ctx.config.apt_distribution.as_ref().ok_or_else(|| {
            AirliftError::InvalidRequest {
                message: "apt requests need a distribution or repository URL".to_string(),
            }
        })?;
        let (_, base, suite, component) = DISTRIBUTIONS
            .iter()
            .find(|(id, _, _, _)| *id == dist.id)
            .ok_or_else(|| AirliftError::InvalidRequest {
                message: format!("unknown apt distribution id {:?}", dist.id),
            })?;
        Ok(AptRepo {
            base: (*base).to_string(),
            suite: (*suite).to_string(),
            component: (*component).to_string(),
        })
    }

    /// Fetch and parse the Packages index for the selected architecture.
    /// The suite `Release` file is fetched first; a missing one means the
    /// suite itself is wrong, which beats a confusing Packages 404.
    async fn packages(
        &self,
        ctx: &AdapterContext,
        repo: &AptRepo,
    ) -> miette::Result<Vec<DebPackage>> {
        let release_url = format!("{}/dists/{}/Release", repo.base, repo.suite);
        let release = ctx
            .cached_index(Ecosystem::Apt, &IndexRequest::get(&release_url), TTL_IMMUTABLE)
            .await?;
        if release.is_none() {
            return Err(AirliftError::IndexUnavailable {
                message: format!("no Release file for suite {} at {}", repo.suite, repo.base),
            }
            .into());
        }

        let arch = ctx.platform.arch.debian_name();
        let packages_url = format!(
            "{}/dists/{}/{}/binary-{arch}/Packages.gz",
            repo.base, repo.suite, repo.component
        );
        let gz = ctx
            .cached_index(Ecosystem::Apt, &IndexRequest::get(&packages_url), TTL_IMMUTABLE)
            .await?
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("no Packages.gz for {arch} at {packages_url}"),
            })?;
        let mut text = String::new();
        GzDecoder::new(gz.as_slice())
            .read_to_string(&mut text)
            .map_err(|e| AirliftError::Parse {
                message: format!("Packages.gz at {packages_url} is not valid gzip: {e}"),
            })?;
        Ok(parse_packages(&text))
    }

    async fn find(
        &self,
        ctx: &AdapterContext,
        repo: &AptRepo,
        name: &str,
    ) -> miette::Result<Vec<DebPackage>> {
        let mut matches: Vec<DebPackage> = self
            .packages(ctx, repo)
            .await?
            .into_iter()
            .filter(|p| p.name == name)
            .collect();
        matches.sort_by(|a, b| deb_vercmp(&b.version, &a.version));
        Ok(matches)
    }
}

impl Default for AptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAdapter for AptAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Apt
    }

    async fn search(
        &self,
        ctx: &AdapterContext,
        query: &str,
        limit: usize,
    ) -> miette::Result<Vec<SearchHit>> {
        let repo = self.repo_for(ctx, None)?;
        let packages = self.packages(ctx, &repo).await?;
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
        let repo = self.repo_for(ctx, request.registry.as_deref())?;
        let matches = self.find(ctx, &repo, &request.name).await?;
        if matches.is_empty() {
            return Err(AirliftError::IndexUnavailable {
                message: format!(
                    "suite {} has no package {} for {}",
                    repo.suite,
                    request.name,
                    ctx.platform.arch.debian_name()
                ),
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
        let repo = self.repo_for(ctx, request.registry.as_deref())?;
        let package = self
            .find(ctx, &repo, &request.name)
            .await?
            .into_iter()
            .find(|p| p.version == version)
            .ok_or_else(|| AirliftError::PlatformIncompatible {
                message: format!(
                    "no {} build of {} {version} in {}/{}",
                    ctx.platform.arch.debian_name(),
                    request.name,
                    repo.suite,
                    repo.component
                ),
            })?;

        let file_name = package
            .filename
            .rsplit('/')
            .next()
            .unwrap_or(&package.filename)
            .to_string();
        Ok(ResolvedArtifact {
            ecosystem: Ecosystem::Apt,
            name: request.name.clone(),
            version: package.version.clone(),
            architecture: Some(package.architecture.clone()),
            url: format!("{}/{}", repo.base, package.filename),
            file_name,
            size: package.size,
            checksum: package.sha256.clone().map(Checksum::Sha256),
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new(
                "apt",
                &format!("{} {} {}", repo.base, repo.suite, repo.component),
            ),
            is_root: false,
            requested_by: None,
        })
    }

    async fn dependencies(
        &self,
        ctx: &AdapterContext,
        artifact: &ResolvedArtifact,
    ) -> miette::Result<Vec<DependencySpec>> {
        let repo = self.repo_for(ctx, Some(&artifact.repository.base_url))?;
        let package = self
            .find(ctx, &repo, &artifact.name)
            .await?
            .into_iter()
            .find(|p| p.version == artifact.version)
            .ok_or_else(|| AirliftError::IndexUnavailable {
                message: format!("Packages record for {} disappeared", artifact.name),
            })?;

        let mut deps = Vec::new();
        for raw in package.depends.iter().chain(&package.pre_depends) {
            if let Some(dep) = parse_depends_entry(raw, false) {
                deps.push(dep);
            }
        }
        // Recommends are optional edges; policy decides whether to follow.
        for raw in &package.recommends {
            if let Some(dep) = parse_depends_entry(raw, true) {
                deps.push(dep);
            }
        }
        // Suggests are never followed.
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps.dedup_by(|a, b| a.name == b.name);
        Ok(deps)
    }

    fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
        match constraint {
            VersionSpec::Latest => true,
            VersionSpec::Exact(pin) => deb_vercmp(pin, version) == Ordering::Equal,
            VersionSpec::Range(spec) => {
                let s = spec.trim();
                // two-character operators first so `>` never shadows `>=`
                for op in [">=", "<=", ">>", "<<", ">", "<", "="] {
                    let Some(bound) = s.strip_prefix(op) else {
                        continue;
                    };
                    let ord = deb_vercmp(version, bound.trim());
                    return match op {
                        ">=" => ord != Ordering::Less,
                        "<=" => ord != Ordering::Greater,
                        ">>" | ">" => ord == Ordering::Greater,
                        "<<" | "<" => ord == Ordering::Less,
                        _ => ord == Ordering::Equal,
                    };
                }
                false
            }
        }
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        deb_vercmp(a, b)
    }
}

/// Parse one alternative group from a Depends field.
///
/// `foo (>= 1.2) | bar` keeps the first alternative; `:any` and other
/// architecture qualifiers are stripped.
fn parse_depends_entry(raw: &str, optional: bool) -> Option<DependencySpec> {
    let first = raw.split('|').next()?.trim();
    if first.is_empty() {
        return None;
    }
    let (name_part, constraint) = match first.split_once('(') {
        Some((name, rest)) => {
            let inner = rest.trim_end_matches(')').trim();
            let spec = inner.replace(">>", ">").replace("<<", "<");
            let spec = if spec.starts_with('=') && !spec.starts_with("==") {
                format!("={}", spec)
            } else {
                spec
            };
            (name.trim(), VersionSpec::parse(&spec))
        }
        None => (first, VersionSpec::Latest),
    };
    let name = name_part.split(':').next().unwrap_or(name_part).trim();
    if name.is_empty() {
        return None;
    }
    Some(DependencySpec {
        name: name.to_string(),
        constraint,
        optional,
        scope: if optional { "recommends" } else { "depends" }.to_string(),
    })
}

/// Parse the flat `Key: value` + blank-line record format.
fn parse_packages(text: &str) -> Vec<DebPackage> {
    let mut packages = Vec::new();
    for block in text.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let fields = parse_record(block);
        let Some(name) = fields.get("Package") else {
            continue;
        };
        let Some(version) = fields.get("Version") else {
            continue;
        };
        let split_list = |key: &str| -> Vec<String> {
            fields
                .get(key)
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default()
        };
        packages.push(DebPackage {
            name: name.clone(),
            version: version.clone(),
            architecture: fields.get("Architecture").cloned().unwrap_or_default(),
            filename: fields.get("Filename").cloned().unwrap_or_default(),
            size: fields.get("Size").and_then(|s| s.parse().ok()),
            sha256: fields.get("SHA256").cloned(),
            description: fields.get("Description").cloned(),
            depends: split_list("Depends"),
            pre_depends: split_list("Pre-Depends"),
            recommends: split_list("Recommends"),
        });
    }
    packages
}

/// One record: `Key: value` lines, continuations indented with a space.
fn parse_record(block: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut last_key: Option<String> = None;
    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(key) = &last_key {
                let entry: &mut String = fields.entry(key.clone()).or_default();
                entry.push('\n');
                entry.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
            last_key = Some(key.trim().to_string());
        }
    }
    fields
}

/// Debian version comparison: `[epoch:]upstream[-revision]`.
pub fn deb_vercmp(a: &str, b: &str) -> Ordering {
    let (ae, au, ar) = split_deb(a);
    let (be, bu, br) = split_deb(b);
    ae.cmp(&be)
        .then_with(|| deb_part_cmp(au, bu))
        .then_with(|| deb_part_cmp(ar, br))
}

fn split_deb(v: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match v.split_once(':') {
        Some((e, rest)) if e.chars().all(|c| c.is_ascii_digit()) => {
            (e.parse().unwrap_or(0), rest)
        }
        _ => (0, v),
    };
    match rest.rsplit_once('-') {
        Some((upstream, revision)) => (epoch, upstream, revision),
        None => (epoch, rest, ""),
    }
}

/// The dpkg algorithm: alternate non-digit and digit spans; `~` sorts
/// before the empty string, letters before other non-alphanumerics.
fn deb_part_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();
    loop {
        // non-digit span
        let a_end = a.iter().position(|c| c.is_ascii_digit()).unwrap_or(a.len());
        let b_end = b.iter().position(|c| c.is_ascii_digit()).unwrap_or(b.len());
        let ord = lex_cmp(&a[..a_end], &b[..b_end]);
        if ord != Ordering::Equal {
            return ord;
        }
        a = &a[a_end..];
        b = &b[b_end..];

        // digit span
        let a_end = a.iter().position(|c| !c.is_ascii_digit()).unwrap_or(a.len());
        let b_end = b.iter().position(|c| !c.is_ascii_digit()).unwrap_or(b.len());
        let an: u64 = std::str::from_utf8(&a[..a_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let bn: u64 = std::str::from_utf8(&b[..b_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let ord = an.cmp(&bn);
        if ord != Ordering::Equal {
            return ord;
        }
        a = &a[a_end..];
        b = &b[b_end..];

        if a.is_empty() && b.is_empty() {
            return Ordering::Equal;
        }
    }
}

fn lex_char_order(c: u8) -> i32 {
    match c {
        b'~' => -1,
        c if c.is_ascii_alphabetic() => i32::from(c),
        0 => 0,
        c => i32::from(c) + 256,
    }
}

fn lex_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let ca = lex_char_order(*a.get(i).unwrap_or(&0));
        let cb = lex_char_order(*b.get(i).unwrap_or(&0));
        let ord = ca.cmp(&cb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
