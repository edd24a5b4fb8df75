//! High-level renderer client.
//!
//! [`RendererClient`] is what the conversion session talks to: it accepts
//! renderer commands and decides, per the renderer's current lifecycle
//! state, whether to send now, buffer and launch, or drop. Version skew
//! between the engine and an already-running renderer is detected on every
//! send via the transport's hello handshake and resolved here: an older
//! server is restarted, a newer one is fatal.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::time::Duration;

use yomi_base::version::{compare_versions, product_version};
use yomi_ipc::process::resolve_sibling_bin;
use yomi_ipc::{IPC_PROTOCOL_VERSION, IpcClient, IpcClientFactory, IpcError, UdsClientFactory};
use yomi_proto::{CommandKind, RendererCommand};

use crate::launcher::{LaunchTuning, ProcessLauncher, RendererErrorKind, RendererLauncher};

/// Deadline for a single command send; the renderer either keeps up with
/// the typist or gets skipped.
pub(crate) const IPC_TIMEOUT: Duration = Duration::from_millis(100);

/// Version mismatch events tolerated before commands are dropped for good.
const MAX_VERSION_MISMATCHES: u32 = 3;

/// Base rendezvous name; a desktop suffix isolates concurrent sessions.
const SERVICE_BASE_NAME: &str = "renderer";

/// Renderer binary name, resolved next to the engine binary.
const RENDERER_BIN: &str = "yomi-renderer";

/// Send `command` to `client`, ignoring the response body.
pub(crate) async fn call_command(client: &mut dyn IpcClient, command: &RendererCommand) {
	let request = match command.to_bytes() {
		Ok(request) => request,
		Err(e) => {
			tracing::error!(error = %e, "cannot serialize renderer command");
			return;
		}
	};
	// The response carries nothing the client needs.
	if let Err(e) = client.call(&request, IPC_TIMEOUT).await {
		tracing::error!(error = %e, "cannot send the request");
	}
}

/// The rendezvous name for this desktop session.
pub(crate) fn service_name_for_desktop(desktop: Option<&str>) -> String {
	match desktop {
		Some(desktop) => format!("{SERVICE_BASE_NAME}.{desktop}"),
		None => SERVICE_BASE_NAME.to_string(),
	}
}

/// Supervised client for the renderer process.
pub struct RendererClient {
	service: String,
	renderer_path: PathBuf,
	window_visible: AtomicBool,
	disable_path_check: AtomicBool,
	version_mismatch_count: AtomicU32,
	factory: Arc<dyn IpcClientFactory>,
	launcher: Arc<dyn RendererLauncher>,
	process_launcher: Option<Arc<ProcessLauncher>>,
}

impl RendererClient {
	/// Client with production wiring: UDS transport and a process-spawning
	/// launcher, rendezvous name derived from the desktop session.
	#[must_use]
	pub fn new() -> Self {
		Self::with_service(
			service_name_for_desktop(yomi_base::desktop_name().as_deref()),
			resolve_sibling_bin(RENDERER_BIN, "YOMI_RENDERER_BIN"),
		)
	}

	/// Production wiring with an explicit service name and renderer path.
	#[must_use]
	pub fn with_service(service: String, renderer_path: PathBuf) -> Self {
		let launcher = ProcessLauncher::new(
			Arc::new(yomi_ipc::ProcessSpawner::new()),
			LaunchTuning::default(),
		);
		Self {
			service,
			renderer_path,
			window_visible: AtomicBool::new(false),
			disable_path_check: AtomicBool::new(false),
			version_mismatch_count: AtomicU32::new(0),
			factory: Arc::new(UdsClientFactory::new()),
			launcher: launcher.clone(),
			process_launcher: Some(launcher),
		}
	}

	/// Replace the IPC factory (tests, alternative transports).
	pub fn set_ipc_client_factory(&mut self, factory: Arc<dyn IpcClientFactory>) {
		self.factory = factory;
	}

	/// Replace the launcher (tests).
	///
	/// The production launcher, if any, stays owned for teardown but is no
	/// longer consulted.
	pub fn set_renderer_launcher(&mut self, launcher: Arc<dyn RendererLauncher>) {
		self.launcher = launcher;
	}

	/// The rendezvous name this client launches and dials.
	#[must_use]
	pub fn service_name(&self) -> &str {
		&self.service
	}

	/// Whether the renderer is up and serving.
	pub async fn is_available(&self) -> bool {
		self.launcher.is_available().await
	}

	/// Make sure a renderer is running, starting one when necessary.
	pub async fn activate(&self) -> bool {
		if self.is_available().await {
			return true;
		}
		self.exec_command(&RendererCommand::noop()).await
	}

	/// Stop the renderer: forcefully by killing the server, or gracefully
	/// with a `Shutdown` command.
	pub async fn shutdown(&self, force: bool) -> bool {
		let Some(client) = self.create_ipc_client().await else {
			tracing::error!("cannot make client object");
			return false;
		};
		if !client.connected() {
			tracing::debug!("renderer is not running");
			return true;
		}
		if force {
			if !self.factory.terminate_server(&self.service).await {
				tracing::error!("force-terminating the renderer failed");
				return false;
			}
			return true;
		}
		self.exec_command(&RendererCommand::shutdown()).await
	}

	/// Skip server binary path verification on subsequent connections.
	pub fn disable_renderer_path_check(&self) {
		self.disable_path_check.store(true, AtomicOrdering::SeqCst);
	}

	/// Suppress the user-facing error dialog on fatal conditions.
	pub fn set_suppress_error_dialog(&self, suppress: bool) {
		self.launcher.set_suppress_error_dialog(suppress);
	}

	/// Relay `command` to the renderer.
	///
	/// Returns `false` only for conditions worth retrying at a higher
	/// level (no factory client, connect-phase timeout); every deliberate
	/// drop or deferral is success.
	pub async fn exec_command(&self, command: &RendererCommand) -> bool {
		if !self.launcher.can_connect().await {
			self.launcher.set_pending_command(command).await;
			// The launch worker may have flipped to ready between the check
			// and the pend; without this re-read the command would sit in
			// the slot until some later launch.
			if !self.launcher.can_connect().await {
				tracing::debug!("renderer not connectable; command buffered");
				return true;
			}
		}

		if self.version_mismatch_count.load(AtomicOrdering::SeqCst) >= MAX_VERSION_MISMATCHES {
			return true;
		}

		let Some(mut client) = self.create_ipc_client().await else {
			tracing::error!("cannot make client object");
			return false;
		};

		// A connect that timed out (rather than finding no server) is a
		// transient condition; report it so the caller may retry.
		if client.last_error() == Some(IpcError::Timeout) {
			return false;
		}

		self.window_visible
			.store(command.visible, AtomicOrdering::SeqCst);

		if !client.connected() {
			// A hide for a renderer that is not running hides nothing.
			if command.kind == CommandKind::Update && (!command.visible || !command.has_output()) {
				tracing::warn!("discarding a hide command: renderer is not running");
				return true;
			}
			tracing::warn!("cannot connect to renderer; restarting it");
			self.launcher.set_pending_command(command).await;
			self.launcher
				.start_renderer(
					&self.service,
					&self.renderer_path,
					self.disable_path_check.load(AtomicOrdering::SeqCst),
					self.factory.clone(),
				)
				.await;
			return true;
		}

		let server_protocol = client.server_protocol_version();
		if IPC_PROTOCOL_VERSION > server_protocol {
			tracing::warn!(
				client = IPC_PROTOCOL_VERSION,
				server = server_protocol,
				"protocol version mismatch; restarting the stale renderer"
			);
			if !self.factory.terminate_server(&self.service).await {
				tracing::error!("force-terminating the renderer failed");
			}
			self.version_mismatch_count
				.fetch_add(1, AtomicOrdering::SeqCst);
			self.launcher.set_pending_command(command).await;
			return true;
		} else if IPC_PROTOCOL_VERSION < server_protocol {
			self.version_mismatch_count
				.store(u32::MAX, AtomicOrdering::SeqCst);
			self.launcher.on_fatal(RendererErrorKind::VersionMismatch);
			tracing::error!(
				client = IPC_PROTOCOL_VERSION,
				server = server_protocol,
				"client protocol version is older than the renderer's"
			);
			return true;
		}

		let server_product = client.server_product_version();
		if compare_versions(server_product, product_version()) == Ordering::Less {
			tracing::warn!(
				server = server_product,
				client = product_version(),
				"product version mismatch; asking the renderer to exit"
			);
			self.launcher.set_pending_command(command).await;
			call_command(client.as_mut(), &RendererCommand::shutdown()).await;
			self.version_mismatch_count
				.fetch_add(1, AtomicOrdering::SeqCst);
			return true;
		}

		call_command(client.as_mut(), command).await;
		true
	}

	/// Tear the client down: hide a still-visible window, then stop the
	/// launch worker.
	///
	/// Call before drop; async teardown cannot run in `Drop`.
	pub async fn close(&self) {
		if self.is_available().await && self.window_visible.load(AtomicOrdering::SeqCst) {
			let _ = self.exec_command(&RendererCommand::hide()).await;
		}
		if let Some(process_launcher) = &self.process_launcher {
			process_launcher.dispose().await;
		}
	}

	async fn create_ipc_client(&self) -> Option<Box<dyn IpcClient>> {
		let expected_path = if self.disable_path_check.load(AtomicOrdering::SeqCst) {
			String::new()
		} else {
			self.renderer_path.display().to_string()
		};
		self.factory.new_client(&self.service, &expected_path).await
	}
}

impl Default for RendererClient {
	fn default() -> Self {
		Self::new()
	}
}
