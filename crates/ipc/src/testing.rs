//! In-process fakes for exercising the transport and the supervisor.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use crate::IPC_PROTOCOL_VERSION;
use crate::named_event::NamedEventNotifier;
use crate::paths;
use crate::wire::{ClientFrame, ServerFrame, read_frame, write_frame};

/// Behavior knobs for [`StubRendererServer`].
#[derive(Debug, Clone)]
pub struct StubServerConfig {
	/// Protocol version advertised in the hello frame.
	pub protocol_version: u32,
	/// Product version advertised in the hello frame.
	pub product_version: String,
	/// Whether to send the hello at all (off to simulate a hung server).
	pub send_hello: bool,
	/// Whether to answer calls (off to simulate a stuck renderer).
	pub reply: bool,
}

impl Default for StubServerConfig {
	fn default() -> Self {
		Self {
			protocol_version: IPC_PROTOCOL_VERSION,
			product_version: env!("CARGO_PKG_VERSION").to_string(),
			send_hello: true,
			reply: true,
		}
	}
}

/// A renderer server good enough for tests: accepts connections on the
/// service socket, speaks the hello handshake, records every received
/// command, and honors `Terminate`.
#[derive(Debug)]
pub struct StubRendererServer {
	service: String,
	socket_path: PathBuf,
	received: Arc<Mutex<Vec<Vec<u8>>>>,
	terminated: Arc<AtomicBool>,
	task: JoinHandle<()>,
}

impl StubRendererServer {
	/// Spawn a stub with default behavior.
	///
	/// # Errors
	///
	/// Returns the bind failure.
	pub async fn spawn(service: &str) -> std::io::Result<Self> {
		Self::spawn_with(service, StubServerConfig::default()).await
	}

	/// Spawn a stub with explicit behavior.
	///
	/// The socket is bound before this returns, so a client may connect
	/// immediately.
	///
	/// # Errors
	///
	/// Returns the bind failure.
	pub async fn spawn_with(service: &str, config: StubServerConfig) -> std::io::Result<Self> {
		let socket_path = paths::socket_path(service);
		if let Some(parent) = socket_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let _ = std::fs::remove_file(&socket_path);
		let listener = UnixListener::bind(&socket_path)?;

		let received = Arc::new(Mutex::new(Vec::new()));
		let terminated = Arc::new(AtomicBool::new(false));
		let task = tokio::spawn(serve(
			listener,
			socket_path.clone(),
			config,
			received.clone(),
			terminated.clone(),
		));

		Ok(Self {
			service: service.to_string(),
			socket_path,
			received,
			terminated,
			task,
		})
	}

	/// The service name the stub is bound to.
	#[must_use]
	pub fn service(&self) -> &str {
		&self.service
	}

	/// Every command body received so far, in arrival order.
	#[must_use]
	pub fn received(&self) -> Vec<Vec<u8>> {
		self.received.lock().unwrap().clone()
	}

	/// Whether a `Terminate` frame arrived.
	#[must_use]
	pub fn was_terminated(&self) -> bool {
		self.terminated.load(Ordering::SeqCst)
	}

	/// Signal the service's readiness event, as a real renderer would.
	pub async fn signal_ready(&self) -> bool {
		NamedEventNotifier::new(&self.service).notify().await
	}
}

impl Drop for StubRendererServer {
	fn drop(&mut self) {
		self.task.abort();
		let _ = std::fs::remove_file(&self.socket_path);
	}
}

async fn serve(
	listener: UnixListener,
	socket_path: PathBuf,
	config: StubServerConfig,
	received: Arc<Mutex<Vec<Vec<u8>>>>,
	terminated: Arc<AtomicBool>,
) {
	loop {
		let Ok((stream, _)) = listener.accept().await else {
			break;
		};
		if !handle_connection(stream, &config, &received, &terminated).await {
			break;
		}
	}
	let _ = std::fs::remove_file(&socket_path);
}

/// Returns `false` when the server should stop accepting.
async fn handle_connection(
	mut stream: UnixStream,
	config: &StubServerConfig,
	received: &Mutex<Vec<Vec<u8>>>,
	terminated: &AtomicBool,
) -> bool {
	if config.send_hello {
		let hello = ServerFrame::Hello {
			protocol_version: config.protocol_version,
			product_version: config.product_version.clone(),
		};
		if write_frame(&mut stream, &hello).await.is_err() {
			return true;
		}
	}

	loop {
		match read_frame::<_, ClientFrame>(&mut stream).await {
			Ok(ClientFrame::Call(body)) => {
				received.lock().unwrap().push(body);
				if config.reply && write_frame(&mut stream, &ServerFrame::Reply(Vec::new())).await.is_err() {
					return true;
				}
			}
			Ok(ClientFrame::Terminate) => {
				terminated.store(true, Ordering::SeqCst);
				return false;
			}
			Err(_) => return true,
		}
	}
}
