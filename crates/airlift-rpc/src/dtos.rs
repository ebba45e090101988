//! Wire DTOs for every endpoint. The wire format is explicit: every
//! boundary type is a serde struct, never an untyped map.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use airlift_core::config::CondaChannel;
use airlift_core::{
    Arch, BundleConfig, Conflict, DependencyTree, DistRef, DockerRegistry, Ecosystem,
    FailedPackage, OutputFormat, PackageRequest, ResolvedArtifact, TargetOs,
};

/// Field-by-field configuration override carried by a request. Every
/// field is optional; unset fields keep the engine's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub output_dir: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub include_scripts: Option<bool>,
    pub include_dependencies: Option<bool>,
    pub include_optional: Option<bool>,
    pub target_os: Option<TargetOs>,
    pub architecture: Option<Arch>,
    pub python_version: Option<String>,
    pub java_version: Option<String>,
    pub node_version: Option<String>,
    pub concurrency: Option<usize>,
    pub conda_channel: Option<CondaChannel>,
    pub yum_distribution: Option<DistRef>,
    pub apt_distribution: Option<DistRef>,
    pub apk_distribution: Option<DistRef>,
    pub docker_registry: Option<DockerRegistry>,
    pub docker_custom_registry: Option<String>,
    pub docker_architecture: Option<String>,
    pub cache_path: Option<PathBuf>,
}

impl ConfigPatch {
    /// Apply this patch over a base configuration.
    pub fn apply(&self, base: &BundleConfig) -> BundleConfig {
        let mut config = base.clone();
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    config.$field = value.clone();
                })*
            };
        }
        take!(
            output_dir,
            output_format,
            include_scripts,
            include_dependencies,
            include_optional,
            target_os,
            architecture,
            concurrency,
            conda_channel,
            docker_registry,
            cache_path,
        );
        if self.python_version.is_some() {
            config.python_version = self.python_version.clone();
        }
        if self.java_version.is_some() {
            config.java_version = self.java_version.clone();
        }
        if self.node_version.is_some() {
            config.node_version = self.node_version.clone();
        }
        if self.yum_distribution.is_some() {
            config.yum_distribution = self.yum_distribution.clone();
        }
        if self.apt_distribution.is_some() {
            config.apt_distribution = self.apt_distribution.clone();
        }
        if self.apk_distribution.is_some() {
            config.apk_distribution = self.apk_distribution.clone();
        }
        if self.docker_custom_registry.is_some() {
            config.docker_custom_registry = self.docker_custom_registry.clone();
        }
        if self.docker_architecture.is_some() {
            config.docker_architecture = self.docker_architecture.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub packages: Vec<PackageRequest>,
    #[serde(default)]
    pub options: ConfigPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub original_packages: Vec<PackageRequest>,
    pub all_packages: Vec<ResolvedArtifact>,
    pub dependency_trees: Vec<DependencyTree>,
    pub conflicts: Vec<Conflict>,
    pub failed_packages: Vec<FailedPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub packages: Vec<PackageRequest>,
    #[serde(default)]
    pub options: ConfigPatch,
    pub client_id: String,
    /// Confirm writing into a non-empty output directory.
    #[serde(default)]
    pub allow_existing_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPathRequest {
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPathResponse {
    pub exists: bool,
    pub file_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearPathRequest {
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearPathResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub ecosystem: Ecosystem,
    pub query: String,
    #[serde(default)]
    pub options: ConfigPatch,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<airlift_adapters::SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVersionsRequest {
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default)]
    pub options: ConfigPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVersionsResponse {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearResponse {
    pub success: bool,
}
