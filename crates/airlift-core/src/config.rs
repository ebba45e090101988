use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::{Arch, PlatformProfile, TargetOs};

/// How the finished bundle is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Zip,
    TarGz,
    #[default]
    Directory,
}

/// Conda channel selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CondaChannel {
    #[default]
    CondaForge,
    Anaconda,
    Bioconda,
    Pytorch,
}

impl CondaChannel {
    pub fn base_url(&self) -> &'static str {
        match self {
            CondaChannel::CondaForge => "https://conda.anaconda.org/conda-forge",
            CondaChannel::Anaconda => "https://repo.anaconda.com/pkgs/main",
            CondaChannel::Bioconda => "https://conda.anaconda.org/bioconda",
            CondaChannel::Pytorch => "https://conda.anaconda.org/pytorch",
        }
    }
}

/// Well-known container registries, plus a custom escape hatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DockerRegistry {
    #[default]
    #[serde(rename = "docker.io")]
    DockerIo,
    #[serde(rename = "ghcr.io")]
    Ghcr,
    #[serde(rename = "ecr")]
    Ecr,
    #[serde(rename = "quay.io")]
    Quay,
    #[serde(rename = "custom")]
    Custom,
}

impl DockerRegistry {
    /// Registry host; custom registries read `docker_custom_registry`.
    pub fn host(&self) -> Option<&'static str> {
        match self {
            DockerRegistry::DockerIo => Some("registry-1.docker.io"),
            DockerRegistry::Ghcr => Some("ghcr.io"),
            DockerRegistry::Ecr => Some("public.ecr.aws"),
            DockerRegistry::Quay => Some("quay.io"),
            DockerRegistry::Custom => None,
        }
    }
}

/// A Linux distribution repository selection for yum/apt/apk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistRef {
    /// Distribution identifier, e.g. `rocky9`, `debian-bookworm`, `v3.19`.
    pub id: String,
    pub architecture: String,
}

/// The full configuration struct recognized by the engine.
///
/// Field-by-field defaults let embedders ship a partial `airlift.toml`
/// and let each RPC request override only what it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleConfig {
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub include_scripts: bool,
    pub include_dependencies: bool,
    /// Follow optional/recommended edges (apt `Recommends:`, pip extras).
    pub include_optional: bool,
    pub target_os: TargetOs,
    pub architecture: Arch,
    pub python_version: Option<String>,
    pub java_version: Option<String>,
    pub node_version: Option<String>,
    /// Parallel artifact downloads, clamped to 1..=10.
    pub concurrency: usize,
    pub conda_channel: CondaChannel,
    pub yum_distribution: Option<DistRef>,
    pub apt_distribution: Option<DistRef>,
    pub apk_distribution: Option<DistRef>,
    pub docker_registry: DockerRegistry,
    pub docker_custom_registry: Option<String>,
    pub docker_architecture: Option<String>,
    pub cache_path: PathBuf,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("bundle"),
            output_format: OutputFormat::Directory,
            include_scripts: true,
            include_dependencies: true,
            include_optional: false,
            target_os: TargetOs::Linux,
            architecture: Arch::X86_64,
            python_version: Some("3.11".to_string()),
            java_version: Some("17".to_string()),
            node_version: Some("20".to_string()),
            concurrency: 3,
            conda_channel: CondaChannel::CondaForge,
            yum_distribution: None,
            apt_distribution: None,
            apk_distribution: None,
            docker_registry: DockerRegistry::DockerIo,
            docker_custom_registry: None,
            docker_architecture: None,
            cache_path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".airlift").join("cache")
}

impl BundleConfig {
    /// Load embedder defaults from a toml file, or return defaults if the
    /// file does not exist.
    pub fn load(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| airlift_util::error::AirliftError::Io(e))?;
        toml::from_str(&content).map_err(|e| {
            airlift_util::error::AirliftError::Parse {
                message: format!("invalid config file {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Effective download concurrency, clamped to the supported window.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, 10)
    }

    /// Derive the platform profile that governs artifact selection.
    pub fn platform_profile(&self) -> PlatformProfile {
        PlatformProfile {
            os: self.target_os,
            arch: self.architecture,
            python_version: self.python_version.clone(),
            java_version: self.java_version.clone(),
            node_version: self.node_version.clone(),
        }
    }

    /// Registry host for docker requests, honoring the custom override.
    pub fn docker_host(&self) -> String {
        match self.docker_registry {
            DockerRegistry::Custom => self
                .docker_custom_registry
                .clone()
                .unwrap_or_else(|| "registry-1.docker.io".to_string()),
            other => other.host().unwrap_or("registry-1.docker.io").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = BundleConfig::default();
        assert_eq!(cfg.effective_concurrency(), 3);
        assert_eq!(cfg.output_format, OutputFormat::Directory);
        assert!(cfg.include_dependencies);
        assert!(!cfg.include_optional);
    }

    #[test]
    fn concurrency_clamped() {
        let mut cfg = BundleConfig::default();
        cfg.concurrency = 64;
        assert_eq!(cfg.effective_concurrency(), 10);
        cfg.concurrency = 0;
        assert_eq!(cfg.effective_concurrency(), 1);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("airlift.toml");
        std::fs::write(
            &path,
            "concurrency = 5\ntargetOs = \"macos\"\narchitecture = \"arm64\"\n",
        )
        .unwrap();
        let cfg = BundleConfig::load(&path).unwrap();
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.target_os, TargetOs::Macos);
        assert_eq!(cfg.architecture, Arch::Arm64);
        // untouched fields keep defaults
        assert_eq!(cfg.conda_channel, CondaChannel::CondaForge);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = BundleConfig::load(Path::new("/nonexistent/airlift.toml")).unwrap();
        assert_eq!(cfg.effective_concurrency(), 3);
    }

    #[test]
    fn docker_host_selection() {
        let mut cfg = BundleConfig::default();
        assert_eq!(cfg.docker_host(), "registry-1.docker.io");
        cfg.docker_registry = DockerRegistry::Custom;
        cfg.docker_custom_registry = Some("registry.corp.internal:5000".to_string());
        assert_eq!(cfg.docker_host(), "registry.corp.internal:5000");
    }

    #[test]
    fn profile_mirrors_config() {
        let mut cfg = BundleConfig::default();
        cfg.python_version = Some("3.12".to_string());
        let profile = cfg.platform_profile();
        assert_eq!(profile.python_tag().as_deref(), Some("cp312"));
    }
}
