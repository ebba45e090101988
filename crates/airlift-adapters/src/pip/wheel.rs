//! Wheel filename parsing and platform tag ranking.
//!
//! A wheel is named `{dist}-{version}(-{build})?-{python}-{abi}-{platform}.whl`;
//! each tag position may hold several values joined by `.`. Selection
//! scores every file against the target profile and keeps the best.

use airlift_core::{Arch, PlatformProfile, TargetOs};

/// The compressed tag triple from a wheel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelTags {
    pub python: Vec<String>,
    pub abi: Vec<String>,
    pub platform: Vec<String>,
}

/// Split a wheel filename into `(distribution, version, tags)`.
pub fn parse_wheel_filename(filename: &str) -> Option<(String, String, WheelTags)> {
    let stem = filename.strip_suffix(".whl")?;
    let parts: Vec<&str> = stem.split('-').collect();
    // dist-version-python-abi-platform, optionally with a build tag
    if parts.len() < 5 || parts.len() > 6 {
        return None;
    }
    let (python, abi, platform) = (
        parts[parts.len() - 3],
        parts[parts.len() - 2],
        parts[parts.len() - 1],
    );
    let dist = parts[0].to_string();
    let version = parts[1].to_string();
    Some((
        dist,
        version,
        WheelTags {
            python: python.split('.').map(str::to_string).collect(),
            abi: abi.split('.').map(str::to_string).collect(),
            platform: platform.split('.').map(str::to_string).collect(),
        },
    ))
}

/// Score a wheel against the profile. `None` means incompatible; higher
/// is better. Platform dominates, then interpreter, then ABI.
pub fn score(tags: &WheelTags, profile: &PlatformProfile) -> Option<u32> {
    let platform = tags
        .platform
        .iter()
        .filter_map(|t| platform_score(t, profile))
        .max()?;
    let python = tags
        .python
        .iter()
        .filter_map(|t| python_score(t, profile))
        .max()?;
    let abi = tags.abi.iter().map(|t| abi_score(t, profile)).max().unwrap_or(1);
    Some(platform * 100 + python * 10 + abi)
}

fn python_score(tag: &str, profile: &PlatformProfile) -> Option<u32> {
    let wanted = profile.python_tag();
    match (tag, wanted.as_deref()) {
        (t, Some(w)) if t == w => Some(9),
        // PyPy builds only match a PyPy profile; not requested here.
        (t, Some(w)) if t.starts_with("cp") => {
            // An older CPython tag works when paired with abi3.
            let t_minor: u32 = t.strip_prefix("cp3").and_then(|m| m.parse().ok())?;
            let w_minor: u32 = w.strip_prefix("cp3").and_then(|m| m.parse().ok())?;
            (t_minor <= w_minor).then_some(5)
        }
        ("py3", _) | ("py2.py3", _) => Some(7),
        (t, _) if t.starts_with("py3") => Some(6),
        _ => None,
    }
}

fn abi_score(tag: &str, profile: &PlatformProfile) -> u32 {
    match tag {
        t if Some(t) == profile.python_tag().as_deref() => 3,
        "abi3" => 2,
        "none" => 1,
        _ => 0,
    }
}

/// Rank a single platform tag. Mirrors pip's preference for newer
/// manylinux images: `manylinux2014` over the PEP 600 alias
/// `manylinux_2_17`, both over `manylinux1`.
fn platform_score(tag: &str, profile: &PlatformProfile) -> Option<u32> {
    if tag == "any" {
        return Some(1);
    }
    let arch = profile.arch.canonical();
    match profile.os {
        TargetOs::Linux => {
            let suffix = arch.unix_name();
            if !tag.ends_with(suffix) {
                return None;
            }
            if tag.starts_with("manylinux2014") {
                Some(9)
            } else if tag.starts_with("manylinux_2_17") {
                Some(8)
            } else if tag.starts_with("manylinux_2_") {
                Some(7)
            } else if tag.starts_with("manylinux2010") {
                Some(6)
            } else if tag.starts_with("manylinux1") {
                Some(5)
            } else if tag.starts_with("musllinux") {
                // glibc profile; musl wheels only as a last resort
                Some(2)
            } else if tag.starts_with("linux_") {
                Some(3)
            } else {
                None
            }
        }
        TargetOs::Macos => {
            if !tag.starts_with("macosx_") {
                return None;
            }
            let arch_ok = match arch {
                Arch::Aarch64 => tag.ends_with("arm64") || tag.ends_with("universal2"),
                _ => tag.ends_with("x86_64") || tag.ends_with("universal2") || tag.ends_with("intel"),
            };
            if !arch_ok {
                return None;
            }
            if tag.ends_with("universal2") {
                Some(7)
            } else {
                Some(9)
            }
        }
        TargetOs::Windows => match (tag, arch) {
            ("win_amd64", Arch::X86_64) => Some(9),
            ("win_arm64", Arch::Aarch64) => Some(9),
            ("win32", Arch::I386) => Some(9),
            ("win32", Arch::X86_64) => Some(4),
            _ => None,
        },
        TargetOs::Any => (tag == "any").then_some(1),
    }
}
