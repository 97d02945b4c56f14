//! Dotted version comparison
//!
//! Versions are dot-separated non-negative integers. Missing trailing
//! components count as zero, so `"2.0"` equals `"2.0.0"`, and components
//! compare numerically, so `"1.10.0"` is greater than `"1.9.0"`.

use crate::{Error, Result};
use std::cmp::Ordering;

/// Parse a dotted version into its numeric components
fn parse_components(version: &str) -> Result<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|component| {
            component
                .parse::<u64>()
                .map_err(|_| Error::MalformedVersion {
                    version: version.to_string(),
                    component: component.to_string(),
                })
        })
        .collect()
}

/// Compare two dotted version strings component by component.
///
/// # Errors
///
/// Returns [`Error::MalformedVersion`] if either string contains a
/// component that is not a non-negative integer (including empty
/// components such as `"1..2"`).
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use fsgen_common::compare_versions;
///
/// assert_eq!(compare_versions("1.10.0", "1.9.0").unwrap(), Ordering::Greater);
/// assert_eq!(compare_versions("2.0", "2.0.0").unwrap(), Ordering::Equal);
/// assert!(compare_versions("1.x", "1.0").is_err());
/// ```
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let left = parse_components(a)?;
    let right = parse_components(b)?;

    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }

    Ok(Ordering::Equal)
}

/// True when `a` is strictly older than `b`.
pub fn version_is_less_than(a: &str, b: &str) -> Result<bool> {
    Ok(compare_versions(a, b)? == Ordering::Less)
}
