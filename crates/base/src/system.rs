//! Desktop-session identity.
//!
//! IPC rendezvous names are scoped per desktop session so that two logins on
//! the same machine get independent renderer instances. On Wayland the
//! compositor socket name identifies the session; X11 falls back to the
//! display string.

/// The current desktop session's name, if one can be determined.
///
/// Reads `WAYLAND_DISPLAY` then `DISPLAY`, sanitized to characters that are
/// safe inside a socket file name. Returns `None` outside a graphical
/// session.
#[must_use]
pub fn desktop_name() -> Option<String> {
	for var in ["WAYLAND_DISPLAY", "DISPLAY"] {
		if let Ok(value) = std::env::var(var)
			&& !value.is_empty()
		{
			return Some(sanitize(&value));
		}
	}
	tracing::debug!("no desktop session detected");
	None
}

fn sanitize(raw: &str) -> String {
	raw.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitize_replaces_separators() {
		assert_eq!(sanitize(":0"), "_0");
		assert_eq!(sanitize("wayland-1"), "wayland-1");
		assert_eq!(sanitize("host:10.0"), "host_10_0");
	}
}
