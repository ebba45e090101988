use airlift_core::{Ecosystem, PlatformProfile};
use airlift_util::hash::sha256_bytes;

/// A stable cache key: a sha256 digest over the identifying tuple.
///
/// Index keys fold in the platform fingerprint so that responses selected
/// under one profile never serve another; artifact keys do not carry the
/// endpoint so that mirrors share cached bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an index response: `(ecosystem, endpoint, query, profile)`.
    pub fn index(
        ecosystem: Ecosystem,
        endpoint: &str,
        query: &str,
        profile: &PlatformProfile,
    ) -> Self {
        let material = format!(
            "index\x1f{}\x1f{endpoint}\x1f{query}\x1f{}",
            ecosystem,
            profile.fingerprint()
        );
        CacheKey(sha256_bytes(material.as_bytes()))
    }

    /// Key for an artifact body: `(ecosystem, name, version, architecture)`.
    pub fn artifact(ecosystem: Ecosystem, name: &str, version: &str, arch: Option<&str>) -> Self {
        let material = format!(
            "artifact\x1f{}\x1f{name}\x1f{version}\x1f{}",
            ecosystem,
            arch.unwrap_or("any")
        );
        CacheKey(sha256_bytes(material.as_bytes()))
    }

    /// The hex digest.
    pub fn hex(&self) -> &str {
        &self.0
    }

    /// Two-character fan-out prefix for the on-disk layout.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_core::{Arch, TargetOs};

    #[test]
    fn platform_is_part_of_index_identity() {
        let a = PlatformProfile::new(TargetOs::Linux, Arch::X86_64);
        let b = PlatformProfile::new(TargetOs::Linux, Arch::Aarch64);
        let ka = CacheKey::index(Ecosystem::Pip, "https://pypi.org/pypi/numpy/json", "", &a);
        let kb = CacheKey::index(Ecosystem::Pip, "https://pypi.org/pypi/numpy/json", "", &b);
        assert_ne!(ka, kb);
    }

    #[test]
    fn artifact_key_ignores_endpoint() {
        let k1 = CacheKey::artifact(Ecosystem::Npm, "express", "4.18.2", None);
        let k2 = CacheKey::artifact(Ecosystem::Npm, "express", "4.18.2", None);
        assert_eq!(k1, k2);
        let k3 = CacheKey::artifact(Ecosystem::Npm, "express", "4.18.2", Some("x86_64"));
        assert_ne!(k1, k3);
    }

    #[test]
    fn prefix_is_two_hex_chars() {
        let k = CacheKey::artifact(Ecosystem::Apt, "curl", "8.5.0-2", Some("amd64"));
        assert_eq!(k.prefix().len(), 2);
        assert!(k.hex().starts_with(k.prefix()));
    }
}
