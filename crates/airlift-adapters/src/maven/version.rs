//! Maven version ordering and range matching.
//!
//! Maven ordering differs from semver: segments split on `.` and `-`,
//! numerics compare as numbers, and string qualifiers have a defined
//! order (`alpha` < `beta` < `milestone` < `rc` < `snapshot` < release
//! < `sp`). Trailing zero segments are insignificant.

use std::cmp::Ordering;
use std::fmt;

/// A parsed Maven version with comparable segments.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    pub original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Segment {
    Numeric(u64),
    Qualifier(Qualifier),
    Text(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum Qualifier {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
}

impl MavenVersion {
    pub fn parse(version: &str) -> Self {
        Self {
            original: version.to_string(),
            segments: split_segments(version),
        }
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let ord = match (self.segments.get(i), other.segments.get(i)) {
                (None, None) => Ordering::Equal,
                (Some(s), None) => against_empty(s),
                (None, Some(s)) => against_empty(s).reverse(),
                (Some(a), Some(b)) => compare(a, b),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How a segment compares to a missing (empty) counterpart: `1.0` equals
/// `1.0.0`, `1.0-sp` exceeds `1.0`, `1.0-rc` precedes it.
fn against_empty(seg: &Segment) -> Ordering {
    match seg {
        Segment::Numeric(0) => Ordering::Equal,
        Segment::Numeric(_) => Ordering::Greater,
        Segment::Qualifier(q) => q.cmp(&Qualifier::Release),
        Segment::Text(t) if t.is_empty() => Ordering::Equal,
        Segment::Text(_) => Ordering::Less,
    }
}

fn compare(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Qualifier(a), Segment::Qualifier(b)) => a.cmp(b),
        (Segment::Numeric(_), Segment::Qualifier(_) | Segment::Text(_)) => Ordering::Greater,
        (Segment::Qualifier(_) | Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
        (Segment::Text(a), Segment::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Segment::Qualifier(q), Segment::Text(_)) => {
            if *q >= Qualifier::Release {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Segment::Text(_), Segment::Qualifier(q)) => {
            if *q >= Qualifier::Release {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

fn split_segments(version: &str) -> Vec<Segment> {
    version
        .split(['.', '-'])
        .filter(|t| !t.is_empty())
        .map(classify)
        .collect()
}

fn classify(token: &str) -> Segment {
    if let Ok(n) = token.parse::<u64>() {
        return Segment::Numeric(n);
    }
    match token.to_lowercase().as_str() {
        "alpha" | "a" => Segment::Qualifier(Qualifier::Alpha),
        "beta" | "b" => Segment::Qualifier(Qualifier::Beta),
        "milestone" | "m" => Segment::Qualifier(Qualifier::Milestone),
        "rc" | "cr" => Segment::Qualifier(Qualifier::Rc),
        "snapshot" => Segment::Qualifier(Qualifier::Snapshot),
        "ga" | "final" | "release" => Segment::Qualifier(Qualifier::Release),
        "sp" => Segment::Qualifier(Qualifier::Sp),
        _ => Segment::Text(token.to_string()),
    }
}

/// A Maven version range: `[1.0,2.0)`, `[1.0,]`, `(,2.0)`, `[1.0]`.
#[derive(Debug, Clone)]
pub struct MavenRange {
    lower: Option<(MavenVersion, bool)>,
    upper: Option<(MavenVersion, bool)>,
}

impl MavenRange {
    /// Parse a bracketed range. Bare versions are not ranges.
    pub fn parse(spec: &str) -> Option<Self> {
        let s = spec.trim();
        if !(s.starts_with('[') || s.starts_with('(')) {
            return None;
        }
        let lower_inclusive = s.starts_with('[');
        let upper_inclusive = s.ends_with(']');
        let inner = &s[1..s.len().checked_sub(1)?];

        if let Some((lo, hi)) = inner.split_once(',') {
            let bound = |raw: &str, inclusive: bool| {
                let raw = raw.trim();
                (!raw.is_empty()).then(|| (MavenVersion::parse(raw), inclusive))
            };
            Some(Self {
                lower: bound(lo, lower_inclusive),
                upper: bound(hi, upper_inclusive),
            })
        } else {
            let v = MavenVersion::parse(inner.trim());
            Some(Self {
                lower: Some((v.clone(), true)),
                upper: Some((v, true)),
            })
        }
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        if let Some((lower, inclusive)) = &self.lower {
            match version.cmp(lower) {
                Ordering::Less => return false,
                Ordering::Equal if !inclusive => return false,
                _ => {}
            }
        }
        if let Some((upper, inclusive)) = &self.upper {
            match version.cmp(upper) {
                Ordering::Greater => return false,
                Ordering::Equal if !inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ordering() {
        assert!(MavenVersion::parse("1.0") < MavenVersion::parse("2.0"));
        assert!(MavenVersion::parse("1.0.1") < MavenVersion::parse("1.1.0"));
        assert!(MavenVersion::parse("5.3.0") < MavenVersion::parse("5.3.10"));
    }

    #[test]
    fn qualifier_ordering() {
        assert!(MavenVersion::parse("1.0-alpha") < MavenVersion::parse("1.0-beta"));
        assert!(MavenVersion::parse("1.0-rc") < MavenVersion::parse("1.0"));
        assert!(MavenVersion::parse("1.0") < MavenVersion::parse("1.0-sp"));
        assert!(MavenVersion::parse("1.0-SNAPSHOT") < MavenVersion::parse("1.0"));
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(MavenVersion::parse("1.0"), MavenVersion::parse("1.0.0"));
    }

    #[test]
    fn jre_classifier_sorts_below_plain() {
        assert!(MavenVersion::parse("32.0.0-jre") < MavenVersion::parse("32.0.0"));
        assert!(MavenVersion::parse("31.0-jre") < MavenVersion::parse("32.0-jre"));
    }

    #[test]
    fn ranges() {
        let r = MavenRange::parse("[1.0,2.0)").unwrap();
        assert!(r.contains(&MavenVersion::parse("1.0")));
        assert!(r.contains(&MavenVersion::parse("1.9.9")));
        assert!(!r.contains(&MavenVersion::parse("2.0")));

        let open = MavenRange::parse("(,2.0)").unwrap();
        assert!(open.contains(&MavenVersion::parse("0.1")));

        let exact = MavenRange::parse("[5.3.0]").unwrap();
        assert!(exact.contains(&MavenVersion::parse("5.3.0")));
        assert!(!exact.contains(&MavenVersion::parse("5.3.1")));

        assert!(MavenRange::parse("5.3.0").is_none());
    }
}
