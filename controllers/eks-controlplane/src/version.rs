//! Kubernetes and add-on version handling.
//!
//! Versions in specs are loose: `v1.29`, `1.29`, `1.29.3` and add-on builds such
//! as `v1.15.1-eksbuild.1` all appear. Everything is parsed into
//! `semver::Version` so comparisons are numeric.

use semver::Version;

/// Parse a version with an optional `v` prefix and one to three numeric components.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let s = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    let (core, rest) = match s.find(['-', '+']) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{padded}{rest}")).ok()
}

/// Canonical `v<major>.<minor>` form stored in the spec.
pub fn normalize(raw: &str) -> Option<String> {
    parse_lenient(raw).map(|v| format!("v{}.{}", v.major, v.minor))
}

/// `<major>.<minor>` as sent to the EKS API.
pub fn api_version(v: &Version) -> String {
    format!("{}.{}", v.major, v.minor)
}

/// Compare on major and minor only.
pub fn minor_cmp(a: &Version, b: &Version) -> std::cmp::Ordering {
    (a.major, a.minor).cmp(&(b.major, b.minor))
}

/// The next minor version to request when `observed` is behind `desired`.
///
/// EKS upgrades one minor version at a time, so a jump from 1.27 to 1.29 is
/// returned as 1.28 first.
pub fn next_upgrade_step(observed: &Version, desired: &Version) -> Option<String> {
    if minor_cmp(desired, observed).is_gt() {
        Some(format!("{}.{}", observed.major, observed.minor + 1))
    } else {
        None
    }
}

/// Whether `v` is at least `major.minor.patch`.
pub fn at_least(v: &Version, major: u64, minor: u64, patch: u64) -> bool {
    (v.major, v.minor, v.patch) >= (major, minor, patch)
}
