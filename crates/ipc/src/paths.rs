//! Filesystem locations for IPC rendezvous objects.

use std::path::PathBuf;

/// Directory holding all of yomi's sockets and event objects.
///
/// The user's runtime dir when the platform provides one, the temp dir
/// otherwise.
#[must_use]
pub fn runtime_dir() -> PathBuf {
	dirs::runtime_dir().unwrap_or_else(std::env::temp_dir).join("yomi")
}

/// The command socket for `service`.
#[must_use]
pub fn socket_path(service: &str) -> PathBuf {
	runtime_dir().join(format!("{service}.sock"))
}

/// The readiness event socket for `service`.
#[must_use]
pub fn event_path(service: &str) -> PathBuf {
	runtime_dir().join(format!("{service}.event"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn paths_are_distinct_per_service() {
		assert_ne!(socket_path("renderer"), socket_path("renderer.wayland-1"));
		assert_ne!(socket_path("renderer"), event_path("renderer"));
	}
}
