use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target operating system for the bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Windows,
    Macos,
    #[default]
    Linux,
    /// Platform-independent (pure wheels, noarch conda, jars).
    Any,
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetOs::Windows => "windows",
            TargetOs::Macos => "macos",
            TargetOs::Linux => "linux",
            TargetOs::Any => "any",
        };
        f.write_str(s)
    }
}

/// Target CPU architecture.
///
/// `amd64`/`x86_64` and `arm64`/`aarch64` are distinct spellings used by
/// different ecosystems; comparison goes through [`Arch::canonical`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    Amd64,
    Arm64,
    Aarch64,
    I386,
    Noarch,
}

impl Arch {
    /// Canonical spelling: `amd64` folds into `x86_64`, `arm64` into
    /// `aarch64`.
    pub fn canonical(&self) -> Arch {
        match self {
            Arch::Amd64 => Arch::X86_64,
            Arch::Arm64 => Arch::Aarch64,
            other => *other,
        }
    }

    /// Whether two architectures are interchangeable.
    pub fn matches(&self, other: Arch) -> bool {
        self.canonical() == other.canonical() || matches!(other, Arch::Noarch)
    }

    /// Spelling used by Debian, Docker and Go toolchains.
    pub fn debian_name(&self) -> &'static str {
        match self.canonical() {
            Arch::X86_64 => "amd64",
            Arch::Aarch64 => "arm64",
            Arch::I386 => "i386",
            Arch::Noarch => "all",
            // canonical() never returns the folded variants
            Arch::Amd64 | Arch::Arm64 => unreachable!(),
        }
    }

    /// Spelling used by RPM, Alpine and wheel platform tags.
    pub fn unix_name(&self) -> &'static str {
        match self.canonical() {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::I386 => "i386",
            Arch::Noarch => "noarch",
            Arch::Amd64 | Arch::Arm64 => unreachable!(),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::X86_64 => "x86_64",
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Aarch64 => "aarch64",
            Arch::I386 => "i386",
            Arch::Noarch => "noarch",
        };
        f.write_str(s)
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "x64" => Ok(Arch::X86_64),
            "amd64" => Ok(Arch::Amd64),
            "arm64" => Ok(Arch::Arm64),
            "aarch64" => Ok(Arch::Aarch64),
            "i386" | "i686" | "386" | "x86" => Ok(Arch::I386),
            "noarch" | "all" | "any" => Ok(Arch::Noarch),
            other => Err(format!("unknown architecture: {other}")),
        }
    }
}

/// The target platform governing artifact selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformProfile {
    pub os: TargetOs,
    pub arch: Arch,
    /// `major.minor`, e.g. `3.11`. Drives wheel tags and conda build strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
}

impl PlatformProfile {
    pub fn new(os: TargetOs, arch: Arch) -> Self {
        Self {
            os,
            arch,
            ..Default::default()
        }
    }

    /// CPython interpreter tag, e.g. `cp311` for Python 3.11.
    pub fn python_tag(&self) -> Option<String> {
        let v = self.python_version.as_deref()?;
        let mut parts = v.split('.');
        let major = parts.next()?;
        let minor = parts.next()?;
        Some(format!("cp{major}{minor}"))
    }

    /// Conda build-string fragment, e.g. `py311`.
    pub fn conda_py_tag(&self) -> Option<String> {
        let v = self.python_version.as_deref()?;
        let mut parts = v.split('.');
        let major = parts.next()?;
        let minor = parts.next()?;
        Some(format!("py{major}{minor}"))
    }

    /// Conda subdir for this platform, e.g. `linux-64`, `osx-arm64`.
    pub fn conda_subdir(&self) -> String {
        let os = match self.os {
            TargetOs::Linux => "linux",
            TargetOs::Macos => "osx",
            TargetOs::Windows => "win",
            TargetOs::Any => return "noarch".to_string(),
        };
        let arch = match self.arch.canonical() {
            Arch::X86_64 => "64",
            Arch::Aarch64 => {
                if self.os == TargetOs::Macos {
                    "arm64"
                } else {
                    "aarch64"
                }
            }
            Arch::I386 => "32",
            _ => "64",
        };
        format!("{os}-{arch}")
    }

    /// Docker platform pair `(os, architecture)` for manifest-list matching.
    pub fn docker_platform(&self) -> (&'static str, &'static str) {
        let os = match self.os {
            TargetOs::Windows => "windows",
            TargetOs::Macos | TargetOs::Linux | TargetOs::Any => "linux",
        };
        let arch = match self.arch.canonical() {
            Arch::Aarch64 => "arm64",
            Arch::I386 => "386",
            _ => "amd64",
        };
        (os, arch)
    }

    /// Stable fingerprint folded into index cache keys so that responses
    /// selected under one platform never leak into another.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}/{}/py{}/java{}/node{}",
            self.os,
            self.arch.canonical(),
            self.python_version.as_deref().unwrap_or("-"),
            self.java_version.as_deref().unwrap_or("-"),
            self.node_version.as_deref().unwrap_or("-"),
        )
    }
}
