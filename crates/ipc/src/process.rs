//! Renderer process spawning.
//!
//! The spawn capability is a one-method trait so the launch worker can run
//! against a fake child in tests. The returned [`ChildHandle`] is awaitable:
//! the rendezvous wait selects over it to notice a renderer that died before
//! signaling readiness.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::sync::oneshot;

/// Spawns the renderer binary.
pub trait RendererSpawner: Send + Sync + 'static {
	/// Start `path` detached, with an optional extra argument
	/// (`--restricted` when the parent runs inside a job object).
	///
	/// # Errors
	///
	/// Returns the spawn syscall failure.
	fn spawn(&self, path: &Path, arg: Option<&str>) -> io::Result<ChildHandle>;
}

/// Handle to a spawned renderer, real or mocked for tests.
#[derive(Debug)]
pub enum ChildHandle {
	/// A real spawned process.
	Real(tokio::process::Child),
	/// Mock handle; exits when the held sender side fires or drops, never
	/// when `None`.
	#[doc(hidden)]
	Mock(Option<oneshot::Receiver<()>>),
}

impl ChildHandle {
	/// OS pid, when one exists.
	#[must_use]
	pub fn id(&self) -> Option<u32> {
		match self {
			Self::Real(child) => child.id(),
			Self::Mock(_) => None,
		}
	}

	/// Resolve when the process exits.
	///
	/// A wait error counts as an exit: the child can no longer be observed.
	pub async fn wait_exit(&mut self) {
		match self {
			Self::Real(child) => {
				let status = child.wait().await;
				tracing::debug!(?status, "renderer process exited");
			}
			Self::Mock(Some(rx)) => {
				let _ = (&mut *rx).await;
			}
			Self::Mock(None) => std::future::pending().await,
		}
	}

	/// A mock child that stays alive until `ExitSignal` fires or drops.
	#[doc(hidden)]
	#[must_use]
	pub fn mock() -> (Self, oneshot::Sender<()>) {
		let (tx, rx) = oneshot::channel();
		(Self::Mock(Some(rx)), tx)
	}

	/// A mock child that never exits.
	#[doc(hidden)]
	#[must_use]
	pub fn mock_immortal() -> Self {
		Self::Mock(None)
	}
}

/// Production spawner: a detached process with suppressed stdio.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner;

impl ProcessSpawner {
	/// Create the production spawner.
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

impl RendererSpawner for ProcessSpawner {
	fn spawn(&self, path: &Path, arg: Option<&str>) -> io::Result<ChildHandle> {
		let mut command = tokio::process::Command::new(path);
		if let Some(arg) = arg {
			command.arg(arg);
		}
		let child = command
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()?;
		tracing::info!(path = %path.display(), pid = ?child.id(), "spawned renderer");
		Ok(ChildHandle::Real(child))
	}
}

/// Resolve a companion binary next to the current executable.
///
/// Order: the `env_var` override, a sibling of the running binary, then the
/// bare name for `$PATH` lookup.
#[must_use]
pub fn resolve_sibling_bin(bin_name: &str, env_var: &str) -> PathBuf {
	if let Ok(value) = std::env::var(env_var)
		&& !value.is_empty()
	{
		return PathBuf::from(value);
	}

	if let Ok(exe) = std::env::current_exe()
		&& let Some(dir) = exe.parent()
	{
		let candidate = dir.join(bin_name);
		if candidate.exists() {
			return candidate;
		}
	}

	PathBuf::from(bin_name)
}

/// Fire-and-forget user-facing error dialog via `yomi-tool`.
///
/// Best-effort: a missing tool binary is logged and otherwise ignored.
pub fn launch_error_message_dialog(kind: &str) {
	let bin = resolve_sibling_bin("yomi-tool", "YOMI_TOOL_BIN");
	match tokio::process::Command::new(&bin)
		.arg("--error-dialog")
		.arg(kind)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.spawn()
	{
		Ok(mut child) => {
			tokio::spawn(async move {
				let _ = child.wait().await;
			});
		}
		Err(e) => {
			tracing::error!(bin = %bin.display(), error = %e, "cannot launch error dialog");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn mock_child_exits_when_signal_drops() {
		let (mut child, exit) = ChildHandle::mock();
		drop(exit);
		tokio::time::timeout(Duration::from_secs(1), child.wait_exit())
			.await
			.expect("dropped signal should read as an exit");
	}

	#[tokio::test]
	async fn immortal_mock_child_outlives_the_deadline() {
		let mut child = ChildHandle::mock_immortal();
		let waited =
			tokio::time::timeout(Duration::from_millis(50), child.wait_exit()).await;
		assert!(waited.is_err());
	}

	#[test]
	fn env_override_wins_binary_resolution() {
		// Each test process owns its env var to avoid cross-test races.
		unsafe { std::env::set_var("YOMI_TEST_BIN_OVERRIDE", "/opt/custom/renderer") };
		let resolved = resolve_sibling_bin("yomi-renderer", "YOMI_TEST_BIN_OVERRIDE");
		assert_eq!(resolved, PathBuf::from("/opt/custom/renderer"));
		unsafe { std::env::remove_var("YOMI_TEST_BIN_OVERRIDE") };
	}
}
