//! Product version string handling.
//!
//! Versions are dotted numeric strings (`"2.31.5712"`). Comparison treats
//! each dot-separated component as a number, so `"1.10"` sorts after
//! `"1.9"`; missing components count as zero, making `"2.0"` equal to
//! `"2.0.0"`.

use std::cmp::Ordering;

/// This build's product version.
#[must_use]
pub fn product_version() -> &'static str {
	env!("CARGO_PKG_VERSION")
}

/// Compare two dotted numeric version strings component-wise.
///
/// A component that fails to parse as a number counts as zero; pre-release
/// suffixes are therefore ignored rather than ordered.
#[must_use]
pub fn compare_versions(lhs: &str, rhs: &str) -> Ordering {
	let mut left = lhs.split('.').map(parse_component);
	let mut right = rhs.split('.').map(parse_component);
	loop {
		match (left.next(), right.next()) {
			(None, None) => return Ordering::Equal,
			(l, r) => {
				let order = l.unwrap_or(0).cmp(&r.unwrap_or(0));
				if order != Ordering::Equal {
					return order;
				}
			}
		}
	}
}

fn parse_component(component: &str) -> u64 {
	component.parse().unwrap_or(0)
}
