use semver::Version;
use std::cmp::Ordering;

/// Total order over version strings.
///
/// Versions that parse as semver (missing minor/patch components are
/// treated as `0`) compare by semver precedence and sort above anything that
/// does not parse. Remaining ties, including semver-equal spellings such as
/// `1.82` and `1.82.0`, fall back to plain string comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let by_semver = match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp_precedence(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    by_semver.then_with(|| a.cmp(b))
}

fn parse_lenient(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let (core, rest) = match raw.find(['-', '+']) {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };
    let parts = core.split('.').count();
    let padded = match parts {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_precedence() {
        assert_eq!(compare_versions("1.82.0", "1.81.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn prerelease_sorts_below_release() {
        assert_eq!(compare_versions("1.84.0-nightly", "1.84.0"), Ordering::Less);
        assert_eq!(
            compare_versions("1.84.0-nightly.2024-10-21", "1.84.0-nightly.2024-10-20"),
            Ordering::Greater
        );
    }

    #[test]
    fn short_versions_are_padded() {
        assert_eq!(compare_versions("0.13", "0.12.1"), Ordering::Greater);
        assert_eq!(compare_versions("17", "16.0.6"), Ordering::Greater);
    }

    #[test]
    fn equal_precedence_falls_back_to_text() {
        assert_eq!(compare_versions("1.82", "1.82.0"), Ordering::Less);
        assert_eq!(compare_versions("1.82.0", "1.82"), Ordering::Greater);
    }

    #[test]
    fn unparsable_versions_sort_low_and_lexically() {
        assert_eq!(compare_versions("snapshot", "0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("beta", "alpha"), Ordering::Greater);
    }

    #[test]
    fn leading_v_is_accepted() {
        assert_eq!(compare_versions("v1.2.3", "1.2.2"), Ordering::Greater);
    }
}
