/*!
 * Version Matcher
 * Decides hook applicability from a resolved module version and a set of
 * accepted semver ranges
 *
 * Fail-open: with no ranges, or no discoverable version, prefer
 * instrumenting over silently not instrumenting.
 */

use crate::core::errors::HookError;
use crate::core::types::HookResult;
use semver::{Version, VersionReq};

/// Parse accepted ranges at registration time
pub fn parse_ranges(ranges: &[String]) -> HookResult<Vec<VersionReq>> {
    ranges
        .iter()
        .map(|raw| VersionReq::parse(raw).map_err(|_| HookError::InvalidRange(raw.clone())))
        .collect()
}

/// True iff the module qualifies under the accepted ranges
pub fn matches(version: Option<&str>, ranges: &[VersionReq]) -> bool {
    if ranges.is_empty() {
        return true;
    }
    let Some(raw) = version else {
        return true;
    };
    // An unparseable version is treated the same as an absent one.
    let Some(version) = coerce(raw) else {
        return true;
    };
    ranges.iter().any(|range| range.matches(&version))
}

/// Coerce a loosely-formed version ("v1.4", "2.3.1-rc.1", "1.2.3.4") into
/// a comparable semver version
pub fn coerce(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);

    let mut parts = [0u64; 3];
    let mut filled = 0;
    for piece in trimmed.split('.') {
        if filled == 3 {
            break;
        }
        let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        parts[filled] = digits.parse().ok()?;
        filled += 1;
        // A piece like "3-rc" terminates the numeric portion.
        if digits.len() != piece.len() {
            break;
        }
    }

    if filled == 0 {
        return None;
    }
    Some(Version::new(parts[0], parts[1], parts[2]))
}
