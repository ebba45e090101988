use serde::{Deserialize, Serialize};

use airlift_util::hash::Checksum;

use crate::ecosystem::Ecosystem;

/// The repository that served an artifact, recorded for reproducibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDescriptor {
    pub name: String,
    pub base_url: String,
}

impl RepoDescriptor {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// What an auxiliary file is for; drives overlay placement in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuxKind {
    /// Maven `.pom` next to the jar.
    Pom,
    /// Checksum sidecar (`.sha1`, `.md5`).
    ChecksumSidecar,
    /// OCI layer blob.
    Layer,
    /// OCI image config JSON.
    ImageConfig,
    /// Repository index fragment reproduced into the bundle (repomd parents).
    IndexFragment,
}

/// A secondary file fetched alongside an artifact and stored with it.
///
/// Auxiliary files never become graph nodes; a failed mandatory auxiliary
/// fails its owning artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryFile {
    pub url: String,
    pub file_name: String,
    pub kind: AuxKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    /// Sidecars and layer blobs that may be absent upstream are optional;
    /// their absence is logged, not fatal.
    #[serde(default)]
    pub optional: bool,
}

/// A fully-pinned, fetchable item produced by `select_artifact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArtifact {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    pub url: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxiliary: Vec<AuxiliaryFile>,
    pub repository: RepoDescriptor,
    /// Whether the user asked for this package directly.
    pub is_root: bool,
    /// Identity key of the package that pulled this one in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl ResolvedArtifact {
    /// Bundle-wide identity: `(ecosystem, name, version, architecture)`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.ecosystem,
            self.name,
            self.version,
            self.architecture.as_deref().unwrap_or("any")
        )
    }

    /// Identity without the version, used for version-conflict detection.
    pub fn name_key(&self) -> String {
        format!("{}:{}", self.ecosystem, self.name)
    }

    /// Total expected byte count including auxiliaries, when known.
    pub fn total_files(&self) -> usize {
        1 + self.auxiliary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, version: &str, arch: Option<&str>) -> ResolvedArtifact {
        ResolvedArtifact {
            ecosystem: Ecosystem::Pip,
            name: name.to_string(),
            version: version.to_string(),
            architecture: arch.map(str::to_string),
            url: format!("https://files.pythonhosted.org/{name}-{version}.whl"),
            file_name: format!("{name}-{version}.whl"),
            size: Some(1024),
            checksum: None,
            auxiliary: Vec::new(),
            repository: RepoDescriptor::new("pypi", "https://pypi.org"),
            is_root: true,
            requested_by: None,
        }
    }

    #[test]
    fn key_includes_arch() {
        let a = artifact("requests", "2.31.0", None);
        assert_eq!(a.key(), "pip:requests:2.31.0:any");
        let b = artifact("numpy", "1.26.0", Some("x86_64"));
        assert_eq!(b.key(), "pip:numpy:1.26.0:x86_64");
    }

    #[test]
    fn repo_descriptor_trims_slash() {
        let repo = RepoDescriptor::new("central", "https://repo.maven.apache.org/maven2/");
        assert_eq!(repo.base_url, "https://repo.maven.apache.org/maven2");
    }

    #[test]
    fn file_counting_includes_auxiliaries() {
        let mut a = artifact("spring-core", "5.3.0", None);
        a.auxiliary.push(AuxiliaryFile {
            url: "https://repo/x.pom".into(),
            file_name: "x.pom".into(),
            kind: AuxKind::Pom,
            checksum: None,
            optional: false,
        });
        assert_eq!(a.total_files(), 2);
    }
}
