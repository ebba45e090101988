use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The eight supported package ecosystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pip,
    Conda,
    Maven,
    Npm,
    Yum,
    Apt,
    Apk,
    Docker,
}

impl Ecosystem {
    /// All ecosystems, in a stable order.
    pub fn all() -> [Ecosystem; 8] {
        [
            Ecosystem::Pip,
            Ecosystem::Conda,
            Ecosystem::Maven,
            Ecosystem::Npm,
            Ecosystem::Yum,
            Ecosystem::Apt,
            Ecosystem::Apk,
            Ecosystem::Docker,
        ]
    }

    /// Lowercase identifier used in wire formats and cache keys.
    pub fn id(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Conda => "conda",
            Ecosystem::Maven => "maven",
            Ecosystem::Npm => "npm",
            Ecosystem::Yum => "yum",
            Ecosystem::Apt => "apt",
            Ecosystem::Apk => "apk",
            Ecosystem::Docker => "docker",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pip" | "pypi" => Ok(Ecosystem::Pip),
            "conda" => Ok(Ecosystem::Conda),
            "maven" => Ok(Ecosystem::Maven),
            "npm" => Ok(Ecosystem::Npm),
            "yum" | "rpm" => Ok(Ecosystem::Yum),
            "apt" | "deb" => Ok(Ecosystem::Apt),
            "apk" => Ok(Ecosystem::Apk),
            "docker" | "oci" => Ok(Ecosystem::Docker),
            other => Err(format!("unknown ecosystem: {other}")),
        }
    }
}
