use serde::{Deserialize, Serialize};

use crate::ecosystem::Ecosystem;

/// A version request: an exact pin, an ecosystem-native range expression,
/// or the newest available version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum VersionSpec {
    Exact(String),
    /// Range grammar is ecosystem-native: PEP 440 specifiers, npm semver
    /// ranges, Maven brackets. The adapter interprets it.
    Range(String),
    Latest,
}

impl VersionSpec {
    /// Classify a raw version string.
    ///
    /// `latest`, `*` and the empty string mean newest; strings containing
    /// range punctuation are ranges; everything else is an exact pin.
    pub fn parse(raw: &str) -> VersionSpec {
        let s = raw.trim();
        if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("latest") {
            return VersionSpec::Latest;
        }
        let range_markers: &[char] = &['>', '<', '^', '~', '=', '[', '(', ',', '|', '!'];
        if s.contains(range_markers) && !s.starts_with("==") {
            return VersionSpec::Range(s.to_string());
        }
        if let Some(pin) = s.strip_prefix("==") {
            return VersionSpec::Exact(pin.trim().to_string());
        }
        VersionSpec::Exact(s.to_string())
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, VersionSpec::Latest)
    }

    /// The raw string for display and conflict reporting.
    pub fn display(&self) -> String {
        match self {
            VersionSpec::Exact(v) | VersionSpec::Range(v) => v.clone(),
            VersionSpec::Latest => "latest".to_string(),
        }
    }
}

/// The neutral input unit: one requested package in one ecosystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequest {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: VersionSpec,
    /// Architecture override for this package only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Language-runtime version override (e.g. a different Python).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    /// Registry override for docker, repository base URL for yum/apt/apk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl PackageRequest {
    pub fn new(ecosystem: Ecosystem, name: &str, version: &str) -> Self {
        Self {
            ecosystem,
            name: name.to_string(),
            version: VersionSpec::parse(version),
            architecture: None,
            runtime_version: None,
            registry: None,
        }
    }

    /// Request identity: `(ecosystem, name, version)`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.ecosystem, self.name, self.version.display())
    }

    /// Validate the request shape before any network traffic.
    ///
    /// Names must be non-empty and free of path traversal; Maven names must
    /// be `groupId:artifactId` coordinates.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("package name is empty".to_string());
        }
        if self.name.contains("..") || self.name.contains(char::is_whitespace) {
            return Err(format!("malformed package name: {:?}", self.name));
        }
        if self.ecosystem == Ecosystem::Maven && !self.name.contains(':') {
            return Err(format!(
                "maven coordinates must be groupId:artifactId, got {:?}",
                self.name
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_spellings() {
        assert!(VersionSpec::parse("latest").is_latest());
        assert!(VersionSpec::parse("LATEST").is_latest());
        assert!(VersionSpec::parse("*").is_latest());
        assert!(VersionSpec::parse("").is_latest());
    }

    #[test]
    fn exact_and_double_equals() {
        assert_eq!(
            VersionSpec::parse("2.31.0"),
            VersionSpec::Exact("2.31.0".into())
        );
        assert_eq!(
            VersionSpec::parse("==2.31.0"),
            VersionSpec::Exact("2.31.0".into())
        );
    }

    #[test]
    fn ranges_detected() {
        assert_eq!(
            VersionSpec::parse(">=1.0,<2.0"),
            VersionSpec::Range(">=1.0,<2.0".into())
        );
        assert_eq!(
            VersionSpec::parse("^4.17.21"),
            VersionSpec::Range("^4.17.21".into())
        );
        assert_eq!(
            VersionSpec::parse("[1.0,2.0)"),
            VersionSpec::Range("[1.0,2.0)".into())
        );
    }

    #[test]
    fn maven_requires_coordinate() {
        let bad = PackageRequest::new(Ecosystem::Maven, "spring-core", "5.3.0");
        assert!(bad.validate().is_err());
        let good = PackageRequest::new(Ecosystem::Maven, "org.springframework:spring-core", "5.3.0");
        assert!(good.validate().is_ok());
    }

    #[test]
    fn traversal_rejected() {
        let req = PackageRequest::new(Ecosystem::Pip, "../etc/passwd", "1.0");
        assert!(req.validate().is_err());
    }

    #[test]
    fn key_includes_version() {
        let req = PackageRequest::new(Ecosystem::Pip, "requests", "2.31.0");
        assert_eq!(req.key(), "pip:requests:2.31.0");
    }
}
