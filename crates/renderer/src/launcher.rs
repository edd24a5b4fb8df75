//! Renderer launch state machine.
//!
//! One launch at a time: `start_renderer` spawns a one-shot worker task
//! that starts the child, waits on the rendezvous event, and settles the
//! status. The pending command and the status share a single mutex, so the
//! worker's flush-then-ready transition is atomic with respect to
//! concurrent `set_pending_command` calls; the client re-reads
//! `can_connect` after pending for exactly that reason.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use yomi_ipc::process::launch_error_message_dialog;
use yomi_ipc::{
	IpcClientFactory, NamedEventListener, NamedEventNotifier, RendererSpawner, WaitOutcome,
};
use yomi_proto::{CommandKind, RendererCommand};

use crate::client::call_command;

/// Renderer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererStatus {
	/// Never launched in this session.
	#[default]
	Unknown,
	/// A launch worker is running.
	Launching,
	/// The renderer signaled readiness.
	Ready,
	/// The renderer did not signal within the rendezvous deadline.
	Timeout,
	/// The renderer exited before signaling.
	Terminated,
	/// Launching is pointless until something changes.
	Fatal,
}

/// Fatal condition reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererErrorKind {
	/// The renderer could not be started at all.
	Fatal,
	/// The renderer speaks a newer protocol than this client.
	VersionMismatch,
}

impl RendererErrorKind {
	fn dialog_name(self) -> &'static str {
		match self {
			Self::Fatal => "renderer_fatal",
			Self::VersionMismatch => "renderer_version_mismatch",
		}
	}
}

/// Timing and retry knobs for the launch state machine.
///
/// Tests shrink the durations; production uses the defaults.
#[derive(Debug, Clone)]
pub struct LaunchTuning {
	/// How long to wait for the readiness event.
	pub rendezvous_timeout: Duration,
	/// Sleep before assuming readiness when no event listener could be
	/// bound.
	pub fallback_sleep: Duration,
	/// Minimum gap between launch attempts after a failure.
	pub retry_cooldown: Duration,
	/// Consecutive failed launches tolerated before giving up.
	pub max_error_streak: u32,
}

impl Default for LaunchTuning {
	fn default() -> Self {
		Self {
			rendezvous_timeout: Duration::from_secs(30),
			fallback_sleep: Duration::from_secs(10),
			retry_cooldown: Duration::from_secs(30),
			max_error_streak: 5,
		}
	}
}

/// The injectable launcher boundary.
///
/// Production uses [`ProcessLauncher`]; tests drive the client with mock
/// implementations.
#[async_trait]
pub trait RendererLauncher: Send + Sync + 'static {
	/// Whether a command may be sent (or a launch attempted) right now.
	async fn can_connect(&self) -> bool;

	/// Whether the renderer is up and serving.
	async fn is_available(&self) -> bool;

	/// Begin launching the renderer; a no-op while a launch is in flight.
	async fn start_renderer(
		&self,
		service: &str,
		renderer_path: &Path,
		disable_path_check: bool,
		factory: Arc<dyn IpcClientFactory>,
	);

	/// Report a terminal condition to the user.
	fn on_fatal(&self, kind: RendererErrorKind);

	/// Buffer `command` for delivery on first readiness.
	///
	/// Only `Update` commands are buffered; later calls overwrite earlier
	/// ones.
	async fn set_pending_command(&self, command: &RendererCommand);

	/// Suppress the user-facing error dialog on fatal conditions.
	fn set_suppress_error_dialog(&self, suppress: bool);
}

#[derive(Debug, Default)]
struct LaunchState {
	status: RendererStatus,
	error_streak: u32,
	last_launch: Option<Instant>,
	pending: Option<RendererCommand>,
}

struct Inner {
	state: Mutex<LaunchState>,
	spawner: Arc<dyn RendererSpawner>,
	tuning: LaunchTuning,
	suppress_error_dialog: AtomicBool,
}

impl Inner {
	fn report_fatal(&self, kind: RendererErrorKind) {
		tracing::error!(?kind, "renderer entered a fatal state");
		if !self.suppress_error_dialog.load(Ordering::SeqCst) {
			launch_error_message_dialog(kind.dialog_name());
		}
	}

	/// Deliver the pending command (best-effort) and mark the renderer
	/// ready.
	///
	/// Runs entirely under the state mutex: a concurrent
	/// `set_pending_command` either lands before the flush reads the slot,
	/// or after the flush cleared it and becomes the next pending command,
	/// or observes `Ready` afterwards and sends directly.
	async fn flush_pending_and_mark_ready(
		&self,
		service: &str,
		renderer_path: &Path,
		disable_path_check: bool,
		factory: &Arc<dyn IpcClientFactory>,
	) {
		let mut state = self.state.lock().await;
		if let Some(command) = state.pending.as_ref() {
			let expected_path = if disable_path_check {
				String::new()
			} else {
				renderer_path.display().to_string()
			};
			if let Some(mut client) = factory.new_client(service, &expected_path).await {
				call_command(client.as_mut(), command).await;
			} else {
				tracing::error!("cannot build a client to flush the pending command");
			}
		}
		state.pending = None;
		state.status = RendererStatus::Ready;
		state.error_streak = 0;
	}
}

/// Production launcher: spawns the renderer binary and supervises the
/// rendezvous.
pub struct ProcessLauncher {
	inner: Arc<Inner>,
	/// Service name of the most recent launch, for teardown notification.
	service: std::sync::Mutex<Option<String>>,
	worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ProcessLauncher {
	/// Launcher over `spawner` with explicit tuning.
	#[must_use]
	pub fn new(spawner: Arc<dyn RendererSpawner>, tuning: LaunchTuning) -> Arc<Self> {
		Arc::new(Self {
			inner: Arc::new(Inner {
				state: Mutex::new(LaunchState::default()),
				spawner,
				tuning,
				suppress_error_dialog: AtomicBool::new(false),
			}),
			service: std::sync::Mutex::new(None),
			worker: std::sync::Mutex::new(None),
		})
	}

	/// Unblock and join a worker that is still waiting, then settle.
	///
	/// Called at supervisor teardown. The notification reads to the worker
	/// as the readiness event, so a waiting launch resolves instead of
	/// running out its full rendezvous deadline.
	pub async fn dispose(&self) {
		let handle = self.worker.lock().unwrap().take();
		let Some(handle) = handle else {
			return;
		};
		if !handle.is_finished() {
			let service = self.service.lock().unwrap().clone();
			if let Some(service) = service {
				// The worker may not have bound the listener yet; keep
				// knocking until someone answers or the worker settles.
				let notifier = NamedEventNotifier::new(&service);
				for _ in 0..100 {
					if handle.is_finished() || notifier.notify().await {
						break;
					}
					tokio::time::sleep(Duration::from_millis(10)).await;
				}
			}
		}
		if let Err(e) = handle.await {
			tracing::error!(error = %e, "launch worker panicked");
		}
	}

	/// Current status snapshot.
	#[doc(hidden)]
	pub async fn status(&self) -> RendererStatus {
		self.inner.state.lock().await.status
	}

	/// Current pending-slot snapshot.
	#[doc(hidden)]
	pub async fn pending_command(&self) -> Option<RendererCommand> {
		self.inner.state.lock().await.pending.clone()
	}
}

#[async_trait]
impl RendererLauncher for ProcessLauncher {
	async fn can_connect(&self) -> bool {
		let state = self.inner.state.lock().await;
		match state.status {
			RendererStatus::Unknown | RendererStatus::Ready => true,
			RendererStatus::Launching => {
				tracing::debug!("renderer launch in flight");
				false
			}
			RendererStatus::Timeout | RendererStatus::Terminated => {
				let cooled_down = state
					.last_launch
					.is_some_and(|at| at.elapsed() >= self.inner.tuning.retry_cooldown);
				if state.error_streak <= self.inner.tuning.max_error_streak && cooled_down {
					true
				} else {
					tracing::debug!(
						streak = state.error_streak,
						"holding off renderer relaunch"
					);
					false
				}
			}
			RendererStatus::Fatal => {
				tracing::debug!("renderer is fatal; never relaunching");
				false
			}
		}
	}

	async fn is_available(&self) -> bool {
		self.inner.state.lock().await.status == RendererStatus::Ready
	}

	async fn start_renderer(
		&self,
		service: &str,
		renderer_path: &Path,
		disable_path_check: bool,
		factory: Arc<dyn IpcClientFactory>,
	) {
		{
			let mut state = self.inner.state.lock().await;
			if state.status == RendererStatus::Launching {
				return;
			}
			state.status = RendererStatus::Launching;
		}
		*self.service.lock().unwrap() = Some(service.to_string());

		let handle = tokio::spawn(run_launch(
			self.inner.clone(),
			service.to_string(),
			renderer_path.to_path_buf(),
			disable_path_check,
			factory,
		));
		*self.worker.lock().unwrap() = Some(handle);
	}

	fn on_fatal(&self, kind: RendererErrorKind) {
		self.inner.report_fatal(kind);
	}

	async fn set_pending_command(&self, command: &RendererCommand) {
		if command.kind != CommandKind::Update {
			return;
		}
		let mut state = self.inner.state.lock().await;
		state.pending = Some(command.clone());
	}

	fn set_suppress_error_dialog(&self, suppress: bool) {
		self.inner
			.suppress_error_dialog
			.store(suppress, Ordering::SeqCst);
	}
}

/// One launch attempt, from spawn to settled status.
async fn run_launch(
	inner: Arc<Inner>,
	service: String,
	renderer_path: PathBuf,
	disable_path_check: bool,
	factory: Arc<dyn IpcClientFactory>,
) {
	{
		let mut state = inner.state.lock().await;
		state.last_launch = Some(Instant::now());
	}

	let listener = NamedEventListener::new(&service);
	let listener_available = listener.is_available();

	let mut child = match inner.spawner.spawn(&renderer_path, None) {
		Ok(child) => child,
		Err(e) => {
			tracing::error!(path = %renderer_path.display(), error = %e, "cannot start renderer process");
			inner.state.lock().await.status = RendererStatus::Fatal;
			inner.report_fatal(RendererErrorKind::Fatal);
			return;
		}
	};

	if listener_available {
		let outcome = listener
			.wait_event_or_process(inner.tuning.rendezvous_timeout, &mut child)
			.await;
		match outcome {
			WaitOutcome::EventSignaled => {
				tracing::debug!(service, "renderer signaled readiness");
				inner
					.flush_pending_and_mark_ready(&service, &renderer_path, disable_path_check, &factory)
					.await;
			}
			WaitOutcome::Timeout => {
				tracing::error!(
					service,
					timeout_ms = inner.tuning.rendezvous_timeout.as_millis() as u64,
					"renderer is not ready within the rendezvous deadline"
				);
				let mut state = inner.state.lock().await;
				state.status = RendererStatus::Timeout;
				state.error_streak += 1;
			}
			WaitOutcome::ProcessSignaled => {
				tracing::error!(service, "renderer terminated before signaling");
				let mut state = inner.state.lock().await;
				state.status = RendererStatus::Terminated;
				state.error_streak += 1;
			}
			WaitOutcome::Failed => {
				tracing::error!(service, "rendezvous wait failed");
				let mut state = inner.state.lock().await;
				state.status = RendererStatus::Fatal;
				state.error_streak += 1;
				drop(state);
				inner.report_fatal(RendererErrorKind::Fatal);
			}
		}
	} else {
		// No listener; give the renderer a fixed grace period instead.
		tracing::error!(service, "no rendezvous listener; falling back to a fixed sleep");
		tokio::time::sleep(inner.tuning.fallback_sleep).await;
		inner
			.flush_pending_and_mark_ready(&service, &renderer_path, disable_path_check, &factory)
			.await;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex as StdMutex;

	use yomi_ipc::testing::StubRendererServer;
	use yomi_ipc::{ChildHandle, UdsClientFactory};

	use super::*;

	/// Spawner double: hands out immortal mock children, optionally fails.
	struct FakeSpawner {
		fail: bool,
		spawned: StdMutex<Vec<PathBuf>>,
	}

	impl FakeSpawner {
		fn ok() -> Arc<Self> {
			Arc::new(Self {
				fail: false,
				spawned: StdMutex::new(Vec::new()),
			})
		}

		fn failing() -> Arc<Self> {
			Arc::new(Self {
				fail: true,
				spawned: StdMutex::new(Vec::new()),
			})
		}

		fn spawn_count(&self) -> usize {
			self.spawned.lock().unwrap().len()
		}
	}

	impl RendererSpawner for FakeSpawner {
		fn spawn(&self, path: &Path, _arg: Option<&str>) -> std::io::Result<ChildHandle> {
			if self.fail {
				return Err(std::io::Error::other("spawn refused"));
			}
			self.spawned.lock().unwrap().push(path.to_path_buf());
			Ok(ChildHandle::mock_immortal())
		}
	}

	/// Spawner double whose children exit immediately.
	struct DyingSpawner;

	impl RendererSpawner for DyingSpawner {
		fn spawn(&self, _path: &Path, _arg: Option<&str>) -> std::io::Result<ChildHandle> {
			let (child, exit) = ChildHandle::mock();
			drop(exit);
			Ok(child)
		}
	}

	fn fast_tuning() -> LaunchTuning {
		LaunchTuning {
			rendezvous_timeout: Duration::from_millis(40),
			fallback_sleep: Duration::from_millis(10),
			retry_cooldown: Duration::from_millis(50),
			max_error_streak: 2,
		}
	}

	fn service(tag: &str) -> String {
		format!("renderer-launcher-test-{}-{tag}", std::process::id())
	}

	fn factory() -> Arc<dyn IpcClientFactory> {
		Arc::new(UdsClientFactory::new())
	}

	async fn wait_until(mut probe: impl AsyncFnMut() -> bool) {
		for _ in 0..200 {
			if probe().await {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("condition not reached in time");
	}

	#[tokio::test]
	async fn fresh_launcher_accepts_connections() {
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), fast_tuning());
		assert!(launcher.can_connect().await);
		assert!(!launcher.is_available().await);
	}

	#[tokio::test]
	async fn spawn_failure_is_fatal_forever() {
		let launcher = ProcessLauncher::new(FakeSpawner::failing(), fast_tuning());
		launcher.set_suppress_error_dialog(true);
		launcher
			.start_renderer(&service("spawn-fail"), Path::new("/nonexistent"), true, factory())
			.await;

		wait_until(async || launcher.status().await == RendererStatus::Fatal).await;
		assert!(!launcher.can_connect().await);

		// Cooldowns never resurrect a fatal launcher.
		tokio::time::sleep(Duration::from_millis(80)).await;
		assert!(!launcher.can_connect().await);
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn rendezvous_timeout_throttles_relaunches() {
		let spawner = FakeSpawner::ok();
		let launcher = ProcessLauncher::new(spawner.clone(), fast_tuning());
		launcher.set_suppress_error_dialog(true);
		let name = service("timeout");

		launcher
			.start_renderer(&name, Path::new("/renderer"), true, factory())
			.await;
		assert!(!launcher.can_connect().await);

		wait_until(async || launcher.status().await == RendererStatus::Timeout).await;
		// Inside the cooldown window: still throttled.
		assert!(!launcher.can_connect().await);

		// After the cooldown the gate opens again.
		wait_until(async || launcher.can_connect().await).await;
		assert_eq!(spawner.spawn_count(), 1);
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn error_streak_exhausts_the_retry_budget() {
		let tuning = LaunchTuning {
			retry_cooldown: Duration::from_millis(1),
			..fast_tuning()
		};
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), tuning.clone());
		launcher.set_suppress_error_dialog(true);
		let name = service("streak");

		for _ in 0..=tuning.max_error_streak {
			launcher
				.start_renderer(&name, Path::new("/renderer"), true, factory())
				.await;
			wait_until(async || launcher.status().await == RendererStatus::Timeout).await;
		}

		// Streak exceeded: the cooldown no longer helps.
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!launcher.can_connect().await);
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn early_child_exit_reads_as_terminated() {
		let launcher = ProcessLauncher::new(Arc::new(DyingSpawner), fast_tuning());
		launcher.set_suppress_error_dialog(true);
		launcher
			.start_renderer(&service("dies"), Path::new("/renderer"), true, factory())
			.await;

		wait_until(async || launcher.status().await == RendererStatus::Terminated).await;
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn second_start_while_launching_is_a_no_op() {
		let spawner = FakeSpawner::ok();
		let launcher = ProcessLauncher::new(spawner.clone(), fast_tuning());
		launcher.set_suppress_error_dialog(true);
		let name = service("single-flight");

		launcher
			.start_renderer(&name, Path::new("/renderer"), true, factory())
			.await;
		launcher
			.start_renderer(&name, Path::new("/renderer"), true, factory())
			.await;

		wait_until(async || launcher.status().await == RendererStatus::Timeout).await;
		assert_eq!(spawner.spawn_count(), 1);
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn pending_slot_rejects_non_update_commands() {
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), fast_tuning());

		launcher.set_pending_command(&RendererCommand::noop()).await;
		assert_eq!(launcher.pending_command().await, None);

		launcher.set_pending_command(&RendererCommand::shutdown()).await;
		assert_eq!(launcher.pending_command().await, None);

		let update = RendererCommand::update(true, Some(vec![1]));
		launcher.set_pending_command(&update).await;
		assert_eq!(launcher.pending_command().await, Some(update.clone()));

		// A later shutdown still leaves the buffered update in place.
		launcher.set_pending_command(&RendererCommand::shutdown()).await;
		assert_eq!(launcher.pending_command().await, Some(update));
	}

	#[tokio::test]
	async fn updates_coalesce_to_the_last_one() {
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), fast_tuning());

		launcher
			.set_pending_command(&RendererCommand::update(true, Some(vec![1])))
			.await;
		let last = RendererCommand::update(true, Some(vec![2]));
		launcher.set_pending_command(&last).await;

		assert_eq!(launcher.pending_command().await, Some(last));
	}

	#[tokio::test]
	async fn readiness_flushes_the_pending_command_once() {
		let tuning = LaunchTuning {
			rendezvous_timeout: Duration::from_secs(5),
			..fast_tuning()
		};
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), tuning);
		let name = service("flush");
		let server = StubRendererServer::spawn(&name).await.unwrap();

		let command = RendererCommand::update(true, Some(b"payload".to_vec()));
		launcher.set_pending_command(&command).await;
		launcher
			.start_renderer(&name, Path::new("/renderer"), true, factory())
			.await;

		assert!(server.signal_ready().await);
		wait_until(async || launcher.is_available().await).await;

		let received = server.received();
		assert_eq!(received.len(), 1);
		assert_eq!(
			yomi_proto::RendererCommand::from_bytes(&received[0]).unwrap(),
			command
		);
		assert_eq!(launcher.pending_command().await, None);
		launcher.dispose().await;
	}

	#[tokio::test]
	async fn dispose_unblocks_a_waiting_worker() {
		let tuning = LaunchTuning {
			rendezvous_timeout: Duration::from_secs(60),
			..fast_tuning()
		};
		let launcher = ProcessLauncher::new(FakeSpawner::ok(), tuning);
		let name = service("dispose");

		launcher
			.start_renderer(&name, Path::new("/renderer"), true, factory())
			.await;
		// Give the worker a beat to enter the rendezvous wait.
		tokio::time::sleep(Duration::from_millis(30)).await;

		tokio::time::timeout(Duration::from_secs(5), launcher.dispose())
			.await
			.expect("dispose must not wait out the full rendezvous deadline");
	}
}
