//! Named rendezvous event between the engine and a freshly launched
//! renderer.
//!
//! The event is a Unix-domain socket at a well-known per-service path: the
//! parent binds it before spawning, the child connects once when its server
//! loop is up. A plain connect is the signal; no bytes are exchanged. The
//! supervisor's teardown path uses the same notifier to unblock a launch
//! worker that is still waiting.

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use crate::paths;
use crate::process::ChildHandle;

/// Outcome of waiting for renderer readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	/// The child signaled the event: it is serving.
	EventSignaled,
	/// The child exited before signaling.
	ProcessSignaled,
	/// Neither happened within the deadline.
	Timeout,
	/// The listener itself failed.
	Failed,
}

/// The parent's half: bound before spawn, awaited after.
#[derive(Debug)]
pub struct NamedEventListener {
	listener: Option<UnixListener>,
	path: PathBuf,
}

impl NamedEventListener {
	/// Bind the event socket for `service`.
	///
	/// Binding can fail (no runtime dir, stale permissions); the listener is
	/// then unavailable and the launch worker falls back to a fixed sleep.
	#[must_use]
	pub fn new(service: &str) -> Self {
		let path = paths::event_path(service);
		let listener = bind(&path);
		if listener.is_none() {
			tracing::warn!(path = %path.display(), "cannot bind rendezvous event");
		}
		Self { listener, path }
	}

	/// Whether the event socket was bound.
	#[must_use]
	pub fn is_available(&self) -> bool {
		self.listener.is_some()
	}

	/// Wait until the event is signaled, `child` exits, or `deadline`
	/// passes.
	pub async fn wait_event_or_process(
		&self,
		deadline: Duration,
		child: &mut ChildHandle,
	) -> WaitOutcome {
		let Some(listener) = &self.listener else {
			return WaitOutcome::Failed;
		};
		tokio::select! {
			accepted = listener.accept() => match accepted {
				Ok(_) => WaitOutcome::EventSignaled,
				Err(e) => {
					tracing::error!(error = %e, "rendezvous accept failed");
					WaitOutcome::Failed
				}
			},
			() = child.wait_exit() => WaitOutcome::ProcessSignaled,
			() = tokio::time::sleep(deadline) => WaitOutcome::Timeout,
		}
	}
}

impl Drop for NamedEventListener {
	fn drop(&mut self) {
		if self.listener.is_some() {
			let _ = std::fs::remove_file(&self.path);
		}
	}
}

fn bind(path: &std::path::Path) -> Option<UnixListener> {
	if let Some(parent) = path.parent()
		&& std::fs::create_dir_all(parent).is_err()
	{
		return None;
	}
	let _ = std::fs::remove_file(path);
	UnixListener::bind(path).ok()
}

/// The child's half (also used by supervisor teardown).
#[derive(Debug)]
pub struct NamedEventNotifier {
	path: PathBuf,
}

impl NamedEventNotifier {
	/// Notifier for `service`'s event.
	#[must_use]
	pub fn new(service: &str) -> Self {
		Self {
			path: paths::event_path(service),
		}
	}

	/// Signal the event. Returns whether a listener was reached.
	pub async fn notify(&self) -> bool {
		match UnixStream::connect(&self.path).await {
			Ok(_) => true,
			Err(e) => {
				tracing::debug!(path = %self.path.display(), error = %e, "nobody is waiting on the event");
				false
			}
		}
	}
}
