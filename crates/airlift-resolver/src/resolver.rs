//! Breadth-first graph expansion with memoization, first-seen-wins
//! conflict policy, cycle detection, and per-ecosystem index throttling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use airlift_adapters::{AdapterContext, AdapterSet, EcosystemAdapter, VersionEntry};
use airlift_core::{
    Conflict, DependencyTree, Ecosystem, FailedPackage, PackageRequest, ResolvedArtifact,
    VersionSpec,
};
use airlift_util::error::AirliftError;

use crate::graph::{ArtifactGraph, DepEdge};

/// Concurrent index queries allowed against any one registry.
const PER_ECOSYSTEM_QUERIES: usize = 4;

/// The output of a resolve session.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub trees: Vec<DependencyTree>,
    pub flat_list: Vec<ResolvedArtifact>,
    pub conflicts: Vec<Conflict>,
    pub failed: Vec<FailedPackage>,
}

/// One pending expansion.
#[derive(Debug, Clone)]
struct QueueEntry {
    request: PackageRequest,
    optional: bool,
    is_root: bool,
    /// Artifact key of the parent node, with a display form for
    /// provenance and conflict records.
    parent: Option<String>,
    /// `ecosystem:name` keys on the path from the root to here.
    ancestors: HashSet<String>,
}

impl QueueEntry {
    fn name_key(&self) -> String {
        format!("{}:{}", self.request.ecosystem, self.request.name)
    }
}

/// What one expansion task learned about a package.
struct Expanded {
    version: String,
    artifact: ResolvedArtifact,
    deps: Vec<airlift_adapters::DependencySpec>,
}

/// Resolve the transitive closure of `requests` under the context's
/// platform profile.
///
/// Failures on user roots abort with an error; failures on transitive
/// dependencies are recorded and skipped. Version disagreements keep the
/// first-seen pin (deterministic in BFS order) and record the loser.
pub async fn resolve(
    adapters: &AdapterSet,
    ctx: &AdapterContext,
    requests: &[PackageRequest],
) -> miette::Result<Resolution> {
    for request in requests {
        adapters.validate(request)?;
    }

    let mut graph = ArtifactGraph::new();
    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut failed: Vec<FailedPackage> = Vec::new();
    // name_key -> pinned version (first seen wins)
    let mut pinned: HashMap<String, String> = HashMap::new();
    // name_key -> artifact key, to attach edges to the winning node
    let mut pinned_node: HashMap<String, String> = HashMap::new();

    let semaphores: Arc<HashMap<Ecosystem, Arc<Semaphore>>> = Arc::new(
        Ecosystem::all()
            .into_iter()
            .map(|e| (e, Arc::new(Semaphore::new(PER_ECOSYSTEM_QUERIES))))
            .collect(),
    );

    let mut level: Vec<QueueEntry> = requests
        .iter()
        .map(|request| QueueEntry {
            request: request.clone(),
            optional: false,
            is_root: true,
            parent: None,
            ancestors: HashSet::new(),
        })
        .collect();

    while !level.is_empty() {
        if ctx.cancel.is_cancelled() {
            return Err(AirliftError::Cancelled.into());
        }

        // First pass: decide which names need a network expansion.
        let mut to_expand: Vec<(String, QueueEntry)> = Vec::new();
        let mut expanding: HashSet<String> = HashSet::new();
        for entry in &level {
            let name_key = entry.name_key();
            if pinned.contains_key(&name_key)
                || entry.ancestors.contains(&name_key)
                || expanding.contains(&name_key)
            {
                continue;
            }
            expanding.insert(name_key.clone());
            to_expand.push((name_key, entry.clone()));
        }

        // Expand concurrently; the per-ecosystem semaphore keeps any one
        // registry from being hammered.
        let mut join_set = JoinSet::new();
        for (name_key, entry) in to_expand {
            let adapter = adapters.get(entry.request.ecosystem)?;
            let ctx = ctx.clone();
            let semaphores = semaphores.clone();
            join_set.spawn(async move {
                let semaphore = semaphores[&entry.request.ecosystem].clone();
                let _permit = semaphore.acquire_owned().await;
                let outcome = expand_one(adapter.as_ref(), &ctx, &entry).await;
                (name_key, outcome)
            });
        }
        let mut results: HashMap<String, miette::Result<Expanded>> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (name_key, outcome) = joined.map_err(|e| AirliftError::Network {
                message: format!("resolver task panicked: {e}"),
            })?;
            results.insert(name_key, outcome);
        }

        // Second pass: apply results in BFS entry order so first-seen
        // stays deterministic.
        let mut next_level: Vec<QueueEntry> = Vec::new();
        for entry in level {
            let name_key = entry.name_key();

            // A dependency edge that re-enters its own ancestry closes a
            // cycle; record it and stop the branch.
            if entry.ancestors.contains(&name_key) {
                let version = pinned.get(&name_key).cloned().unwrap_or_default();
                conflicts.push(Conflict::Circular {
                    ecosystem: entry.request.ecosystem,
                    name: entry.request.name.clone(),
                    version,
                    via: entry.parent.clone().unwrap_or_default(),
                });
                if let (Some(parent_key), Some(node_key)) =
                    (&entry.parent, pinned_node.get(&name_key))
                {
                    if let (Some(from), Some(to)) =
                        (graph.find(parent_key), graph.find(node_key))
                    {
                        graph.add_edge(
                            from,
                            to,
                            DepEdge {
                                optional: entry.optional,
                            },
                        );
                    }
                }
                continue;
            }

            // Already pinned: attach an edge, flag a mismatch when this
            // path wanted a different concrete version.
            if let Some(kept) = pinned.get(&name_key).cloned() {
                if let VersionSpec::Exact(wanted) = &entry.request.version {
                    let adapter = adapters.get(entry.request.ecosystem)?;
                    if adapter.compare_versions(wanted, &kept) != std::cmp::Ordering::Equal {
                        conflicts.push(Conflict::VersionMismatch {
                            ecosystem: entry.request.ecosystem,
                            name: entry.request.name.clone(),
                            kept: kept.clone(),
                            rejected: wanted.clone(),
                            requested_by: entry.parent.clone().unwrap_or_default(),
                        });
                    }
                }
                if let Some(node_key) = pinned_node.get(&name_key) {
                    if let Some(to) = graph.find(node_key) {
                        if let Some(from) =
                            entry.parent.as_ref().and_then(|p| graph.find(p))
                        {
                            graph.add_edge(
                                from,
                                to,
                                DepEdge {
                                    optional: entry.optional,
                                },
                            );
                        }
                        if entry.is_root {
                            graph.add_root(to);
                        }
                    }
                }
                continue;
            }

            let outcome = match results.remove(&name_key) {
                Some(outcome) => outcome,
                // a same-level sibling already consumed the result
                None => {
                    // handled above via pinned; nothing left to do
                    continue;
                }
            };

            match outcome {
                Ok(expanded) => {
                    let mut artifact = expanded.artifact;
                    artifact.is_root = entry.is_root;
                    artifact.requested_by = entry.parent.clone();
                    let artifact_key = artifact.key();
                    let idx = graph.add_artifact(artifact);
                    if entry.is_root {
                        graph.add_root(idx);
                    }
                    if let Some(from) =
                        entry.parent.as_ref().and_then(|p| graph.find(p))
                    {
                        graph.add_edge(
                            from,
                            idx,
                            DepEdge {
                                optional: entry.optional,
                            },
                        );
                    }
                    pinned.insert(name_key.clone(), expanded.version.clone());
                    pinned_node.insert(name_key.clone(), artifact_key.clone());

                    if !ctx.config.include_dependencies {
                        continue;
                    }
                    let mut ancestors = entry.ancestors.clone();
                    ancestors.insert(name_key.clone());
                    for dep in expanded.deps {
                        if dep.optional && !ctx.config.include_optional {
                            tracing::debug!(
                                "skipping optional dependency {} of {}",
                                dep.name,
                                entry.request.name
                            );
                            continue;
                        }
                        let mut child = entry.request.clone();
                        child.name = dep.name;
                        child.version = dep.constraint;
                        next_level.push(QueueEntry {
                            request: child,
                            optional: dep.optional,
                            is_root: false,
                            parent: Some(artifact_key.clone()),
                            ancestors: ancestors.clone(),
                        });
                    }
                }
                Err(e) => {
                    if e.downcast_ref::<AirliftError>()
                        .map(AirliftError::is_cancelled)
                        .unwrap_or(false)
                    {
                        return Err(e);
                    }
                    if entry.is_root {
                        // Roots abort the whole resolve.
                        return Err(e);
                    }
                    tracing::warn!(
                        "dependency {} failed to resolve: {e}",
                        entry.request.name
                    );
                    let record = FailedPackage {
                        ecosystem: entry.request.ecosystem,
                        name: entry.request.name.clone(),
                        requested_version: entry.request.version.display(),
                        reason: e.to_string(),
                        requested_by: entry.parent.clone(),
                    };
                    if !failed.iter().any(|f| {
                        f.ecosystem == record.ecosystem && f.name == record.name
                    }) {
                        failed.push(record);
                    }
                }
            }
        }

        level = next_level;
    }

    Ok(Resolution {
        trees: graph.trees(),
        flat_list: graph.flat_list(),
        conflicts,
        failed,
    })
}

/// Pin a concrete version and pull the node's manifest data.
async fn expand_one(
    adapter: &dyn EcosystemAdapter,
    ctx: &AdapterContext,
    entry: &QueueEntry,
) -> miette::Result<Expanded> {
    let request = &entry.request;
    let version = match &request.version {
        VersionSpec::Exact(v) => v.clone(),
        spec => {
            let versions = adapter.list_versions(ctx, request).await?;
            pick_version(adapter, spec, &versions).ok_or_else(|| {
                AirliftError::PlatformIncompatible {
                    message: format!(
                        "no version of {} satisfies {}",
                        request.name,
                        spec.display()
                    ),
                }
            })?
        }
    };

    let artifact = adapter.select_artifact(ctx, request, &version).await?;
    let deps = if ctx.config.include_dependencies {
        adapter.dependencies(ctx, &artifact).await?
    } else {
        Vec::new()
    };
    Ok(Expanded {
        version,
        artifact,
        deps,
    })
}

/// Newest concrete version satisfying the spec. `list_versions` is
/// newest-first, so the first match wins; aliases never count.
fn pick_version(
    adapter: &dyn EcosystemAdapter,
    spec: &VersionSpec,
    versions: &[VersionEntry],
) -> Option<String> {
    versions
        .iter()
        .filter(|v| !v.alias)
        .find(|v| adapter.version_matches(spec, &v.version))
        .map(|v| v.version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_adapters::{DependencySpec, FetchOutcome, ProgressFn, SearchHit};
    use airlift_core::{BundleConfig, PauseGate, RepoDescriptor};
    use airlift_net::{CacheStore, Transport};
    use async_trait::async_trait;
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// In-memory adapter: name -> [(version, [(dep-name, dep-version)])],
    /// newest version first.
    struct StubAdapter {
        packages: HashMap<String, Vec<(String, Vec<(String, String)>)>>,
        index_calls: AtomicUsize,
    }

    impl StubAdapter {
        fn new(spec: &[(&str, &str, &[(&str, &str)])]) -> Self {
            let mut packages: HashMap<String, Vec<(String, Vec<(String, String)>)>> =
                HashMap::new();
            for (name, version, deps) in spec {
                packages.entry(name.to_string()).or_default().push((
                    version.to_string(),
                    deps.iter()
                        .map(|(n, v)| (n.to_string(), v.to_string()))
                        .collect(),
                ));
            }
            Self {
                packages,
                index_calls: AtomicUsize::new(0),
            }
        }

        fn entry(&self, name: &str, version: &str) -> Option<&(String, Vec<(String, String)>)> {
            self.packages
                .get(name)?
                .iter()
                .find(|(v, _)| v == version)
        }
    }

    #[async_trait]
    impl EcosystemAdapter for StubAdapter {
        fn ecosystem(&self) -> Ecosystem {
            Ecosystem::Npm
        }

        async fn search(
            &self,
            _ctx: &AdapterContext,
            _query: &str,
            _limit: usize,
        ) -> miette::Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn list_versions(
            &self,
            _ctx: &AdapterContext,
            request: &PackageRequest,
        ) -> miette::Result<Vec<VersionEntry>> {
            self.index_calls.fetch_add(1, AtomicOrdering::SeqCst);
            let versions = self.packages.get(&request.name).ok_or_else(|| {
                AirliftError::IndexUnavailable {
                    message: format!("no package {}", request.name),
                }
            })?;
            Ok(versions
                .iter()
                .map(|(v, _)| VersionEntry::concrete(v.clone()))
                .collect())
        }

        async fn select_artifact(
            &self,
            _ctx: &AdapterContext,
            request: &PackageRequest,
            version: &str,
        ) -> miette::Result<ResolvedArtifact> {
            self.index_calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.entry(&request.name, version).ok_or_else(|| {
                AirliftError::PlatformIncompatible {
                    message: format!("no artifact {} {version}", request.name),
                }
            })?;
            Ok(ResolvedArtifact {
                ecosystem: Ecosystem::Npm,
                name: request.name.clone(),
                version: version.to_string(),
                architecture: None,
                url: format!("https://stub/{}-{version}.tgz", request.name),
                file_name: format!("{}-{version}.tgz", request.name),
                size: None,
                checksum: None,
                auxiliary: Vec::new(),
                repository: RepoDescriptor::new("stub", "https://stub"),
                is_root: false,
                requested_by: None,
            })
        }

        async fn dependencies(
            &self,
            _ctx: &AdapterContext,
            artifact: &ResolvedArtifact,
        ) -> miette::Result<Vec<DependencySpec>> {
            let (_, deps) = self
                .entry(&artifact.name, &artifact.version)
                .ok_or_else(|| AirliftError::IndexUnavailable {
                    message: format!("lost {}", artifact.name),
                })?;
            Ok(deps
                .iter()
                .map(|(name, version)| {
                    DependencySpec::mandatory(name, VersionSpec::Exact(version.clone()))
                })
                .collect())
        }

        fn version_matches(&self, constraint: &VersionSpec, version: &str) -> bool {
            match constraint {
                VersionSpec::Latest => true,
                VersionSpec::Exact(pin) => pin == version,
                VersionSpec::Range(_) => true,
            }
        }

        fn compare_versions(&self, a: &str, b: &str) -> Ordering {
            a.cmp(b)
        }

        async fn fetch(
            &self,
            _ctx: &AdapterContext,
            _artifact: &ResolvedArtifact,
            _pause: &PauseGate,
            _progress: ProgressFn<'_>,
        ) -> miette::Result<FetchOutcome> {
            Ok(FetchOutcome::default())
        }
    }

    fn harness(
        spec: &[(&str, &str, &[(&str, &str)])],
    ) -> (tempfile::TempDir, AdapterContext, AdapterSet) {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AdapterContext::new(
            Transport::new().unwrap(),
            CacheStore::new(tmp.path()),
            BundleConfig::default(),
        );
        let set = AdapterSet::from_adapters(vec![Arc::new(StubAdapter::new(spec))]);
        (tmp, ctx, set)
    }

    fn request(name: &str, version: &str) -> PackageRequest {
        PackageRequest::new(Ecosystem::Npm, name, version)
    }

    #[tokio::test]
    async fn single_root_with_transitive_closure() {
        let (_tmp, ctx, set) = harness(&[
            ("app", "1.0", &[("lib", "2.0"), ("util", "3.0")]),
            ("lib", "2.0", &[("util", "3.0")]),
            ("util", "3.0", &[]),
        ]);
        let resolution = resolve(&set, &ctx, &[request("app", "1.0")]).await.unwrap();

        assert_eq!(resolution.trees.len(), 1);
        let names: Vec<&str> = resolution
            .flat_list
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["app", "lib", "util"]);
        assert!(resolution.conflicts.is_empty());
        assert!(resolution.failed.is_empty());
        assert!(resolution.flat_list[0].is_root);
        assert!(!resolution.flat_list[1].is_root);
        // closure closedness: every tree key is in the flat list
        let flat_keys: HashSet<String> =
            resolution.flat_list.iter().map(|a| a.key()).collect();
        for tree in &resolution.trees {
            for key in tree.keys() {
                assert!(flat_keys.contains(&key));
            }
        }
    }

    #[tokio::test]
    async fn cycle_terminates_and_is_recorded() {
        let (_tmp, ctx, set) = harness(&[
            ("a", "1.0", &[("b", "1.0")]),
            ("b", "1.0", &[("a", "1.0")]),
        ]);
        let resolution = resolve(&set, &ctx, &[request("a", "1.0")]).await.unwrap();

        // both present exactly once
        let names: Vec<&str> = resolution
            .flat_list
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        let circular: Vec<&Conflict> = resolution
            .conflicts
            .iter()
            .filter(|c| matches!(c, Conflict::Circular { .. }))
            .collect();
        assert_eq!(circular.len(), 1);
        match circular[0] {
            Conflict::Circular { name, via, .. } => {
                assert_eq!(name, "a");
                assert!(via.contains("b"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn version_mismatch_keeps_first_seen() {
        let (_tmp, ctx, set) = harness(&[
            ("root1", "1.0", &[("c", "1.0")]),
            ("root2", "1.0", &[("c", "2.0")]),
            ("c", "1.0", &[]),
            ("c", "2.0", &[]),
        ]);
        let resolution = resolve(
            &set,
            &ctx,
            &[request("root1", "1.0"), request("root2", "1.0")],
        )
        .await
        .unwrap();

        let c: Vec<&ResolvedArtifact> = resolution
            .flat_list
            .iter()
            .filter(|a| a.name == "c")
            .collect();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].version, "1.0");

        let mismatches: Vec<&Conflict> = resolution
            .conflicts
            .iter()
            .filter(|c| matches!(c, Conflict::VersionMismatch { .. }))
            .collect();
        assert_eq!(mismatches.len(), 1);
        match mismatches[0] {
            Conflict::VersionMismatch { kept, rejected, .. } => {
                assert_eq!(kept, "1.0");
                assert_eq!(rejected, "2.0");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn latest_resolves_to_newest() {
        let (_tmp, ctx, set) = harness(&[
            ("tool", "2.0", &[]),
            ("tool", "1.0", &[]),
        ]);
        let resolution = resolve(&set, &ctx, &[request("tool", "latest")])
            .await
            .unwrap();
        assert_eq!(resolution.flat_list[0].version, "2.0");
    }

    #[tokio::test]
    async fn root_failure_aborts() {
        let (_tmp, ctx, set) = harness(&[("known", "1.0", &[])]);
        let err = resolve(&set, &ctx, &[request("missing", "1.0")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No compatible artifact") || !err.to_string().is_empty());
    }

    #[tokio::test]
    async fn dependency_failure_is_recorded_not_fatal() {
        let (_tmp, ctx, set) = harness(&[
            ("app", "1.0", &[("ghost", "1.0")]),
        ]);
        let resolution = resolve(&set, &ctx, &[request("app", "1.0")]).await.unwrap();
        assert_eq!(resolution.flat_list.len(), 1);
        assert_eq!(resolution.failed.len(), 1);
        assert_eq!(resolution.failed[0].name, "ghost");
        assert_eq!(resolution.failed[0].requested_by.as_deref(), Some("npm:app:1.0:any"));
    }

    #[tokio::test]
    async fn cancelled_session_stops_resolving() {
        let (_tmp, ctx, set) = harness(&[("app", "1.0", &[])]);
        ctx.cancel.cancel();
        let err = resolve(&set, &ctx, &[request("app", "1.0")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn diamond_is_not_a_conflict() {
        let (_tmp, ctx, set) = harness(&[
            ("top", "1.0", &[("left", "1.0"), ("right", "1.0")]),
            ("left", "1.0", &[("base", "1.0")]),
            ("right", "1.0", &[("base", "1.0")]),
            ("base", "1.0", &[]),
        ]);
        let resolution = resolve(&set, &ctx, &[request("top", "1.0")]).await.unwrap();
        assert!(resolution.conflicts.is_empty());
        assert_eq!(resolution.flat_list.len(), 4);
        // both paths reach base in the tree
        let tree = &resolution.trees[0];
        let rendered = tree.render();
        assert_eq!(rendered.matches("base 1.0").count(), 2);
    }
}
