//! The request/response IPC client and its injectable factory.
//!
//! [`UdsClientFactory`] is the production [`IpcClientFactory`]: it connects
//! to the service socket, optionally verifies the server binary behind it,
//! and completes the version handshake. Construction never fails outright;
//! a client that could not connect is still returned so callers can inspect
//! [`IpcClient::last_error`], which is how a connect-phase timeout is told
//! apart from plain "server not running".

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::error::IpcError;
use crate::paths;
use crate::wire::{ClientFrame, ServerFrame, read_frame, write_frame};

/// Deadline for connect and handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A connected (or failed) request/response channel to a renderer server.
#[async_trait]
pub trait IpcClient: Send {
	/// Whether the underlying transport reached a server.
	fn connected(&self) -> bool;

	/// The most recent failure, if any.
	fn last_error(&self) -> Option<IpcError>;

	/// The server's IPC envelope version, learned during the handshake.
	fn server_protocol_version(&self) -> u32;

	/// The server's product version string, learned during the handshake.
	fn server_product_version(&self) -> &str;

	/// Send `request` and await the response body.
	///
	/// # Errors
	///
	/// Returns the transport failure; the client also records it for
	/// [`last_error`](Self::last_error).
	async fn call(&mut self, request: &[u8], deadline: Duration) -> Result<Vec<u8>, IpcError>;
}

/// Creates [`IpcClient`]s and terminates servers by service name.
///
/// Injectable so the supervisor can be tested with in-process fakes.
#[async_trait]
pub trait IpcClientFactory: Send + Sync {
	/// Build a client for `service`.
	///
	/// A non-empty `server_path` demands that the peer behind the socket is
	/// that binary; an empty one skips verification. `None` means no client
	/// could be constructed at all.
	async fn new_client(&self, service: &str, server_path: &str) -> Option<Box<dyn IpcClient>>;

	/// Best-effort synchronous kill of the server behind `service`.
	async fn terminate_server(&self, service: &str) -> bool;
}

/// Production factory over Unix-domain sockets.
#[derive(Debug, Clone)]
pub struct UdsClientFactory {
	connect_timeout: Duration,
}

impl UdsClientFactory {
	/// Factory with the default connect deadline.
	#[must_use]
	pub fn new() -> Self {
		Self {
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
		}
	}

	/// Override the connect/handshake deadline.
	#[must_use]
	pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}
}

impl Default for UdsClientFactory {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl IpcClientFactory for UdsClientFactory {
	async fn new_client(&self, service: &str, server_path: &str) -> Option<Box<dyn IpcClient>> {
		Some(Box::new(UdsClient::connect(service, server_path, self.connect_timeout).await))
	}

	async fn terminate_server(&self, service: &str) -> bool {
		let path = paths::socket_path(service);
		let connected = timeout(self.connect_timeout, UnixStream::connect(&path)).await;
		match connected {
			Ok(Ok(mut stream)) => {
				let sent = timeout(self.connect_timeout, write_frame(&mut stream, &ClientFrame::Terminate)).await;
				matches!(sent, Ok(Ok(())))
			}
			Ok(Err(e)) => {
				tracing::debug!(service, error = %e, "terminate: no server to kill");
				false
			}
			Err(_) => false,
		}
	}
}

/// The production [`IpcClient`] over a Unix-domain socket.
pub struct UdsClient {
	stream: Option<UnixStream>,
	last_error: Option<IpcError>,
	protocol_version: u32,
	product_version: String,
}

impl UdsClient {
	/// Connect to `service`, verify the peer when `server_path` is
	/// non-empty, and read the server's hello.
	pub async fn connect(service: &str, server_path: &str, deadline: Duration) -> Self {
		let path = paths::socket_path(service);

		let mut stream = match timeout(deadline, UnixStream::connect(&path)).await {
			Err(_) => return Self::failed(IpcError::Timeout),
			Ok(Err(e)) => {
				tracing::debug!(service, error = %e, "renderer server is not reachable");
				return Self::failed(IpcError::NotConnected);
			}
			Ok(Ok(stream)) => stream,
		};

		if !server_path.is_empty() && !peer_is_binary(&stream, Path::new(server_path)) {
			tracing::warn!(service, expected = server_path, "peer failed server path verification");
			return Self::failed(IpcError::ServerPathMismatch);
		}

		match timeout(deadline, read_frame::<_, ServerFrame>(&mut stream)).await {
			Err(_) => Self::failed(IpcError::Timeout),
			Ok(Err(e)) => {
				tracing::warn!(service, error = %e, "handshake failed");
				Self::failed(IpcError::Codec)
			}
			Ok(Ok(ServerFrame::Hello {
				protocol_version,
				product_version,
			})) => Self {
				stream: Some(stream),
				last_error: None,
				protocol_version,
				product_version,
			},
			Ok(Ok(_)) => Self::failed(IpcError::Codec),
		}
	}

	fn failed(error: IpcError) -> Self {
		Self {
			stream: None,
			last_error: Some(error),
			protocol_version: 0,
			product_version: String::new(),
		}
	}
}

#[async_trait]
impl IpcClient for UdsClient {
	fn connected(&self) -> bool {
		self.stream.is_some()
	}

	fn last_error(&self) -> Option<IpcError> {
		self.last_error
	}

	fn server_protocol_version(&self) -> u32 {
		self.protocol_version
	}

	fn server_product_version(&self) -> &str {
		&self.product_version
	}

	async fn call(&mut self, request: &[u8], deadline: Duration) -> Result<Vec<u8>, IpcError> {
		let Some(stream) = self.stream.as_mut() else {
			self.last_error = Some(IpcError::NotConnected);
			return Err(IpcError::NotConnected);
		};

		let result = timeout(deadline, async {
			write_frame(stream, &ClientFrame::Call(request.to_vec())).await?;
			read_frame::<_, ServerFrame>(stream).await
		})
		.await;

		match result {
			Err(_) => {
				self.last_error = Some(IpcError::Timeout);
				Err(IpcError::Timeout)
			}
			Ok(Err(e)) => {
				let error = if e.kind() == std::io::ErrorKind::InvalidData {
					IpcError::Codec
				} else {
					IpcError::Io
				};
				tracing::debug!(error = %e, "IPC call failed");
				self.stream = None;
				self.last_error = Some(error);
				Err(error)
			}
			Ok(Ok(ServerFrame::Reply(body))) => Ok(body),
			Ok(Ok(_)) => {
				self.last_error = Some(IpcError::Codec);
				Err(IpcError::Codec)
			}
		}
	}
}

/// Check that the process on the far end of `stream` runs `expected`.
///
/// Uses the socket's peer credentials and the pid's `/proc` entry; on
/// platforms without either, verification passes so the transport stays
/// usable.
fn peer_is_binary(stream: &UnixStream, expected: &Path) -> bool {
	#[cfg(target_os = "linux")]
	{
		let Ok(cred) = stream.peer_cred() else {
			return false;
		};
		let Some(pid) = cred.pid() else {
			return false;
		};
		match std::fs::read_link(format!("/proc/{pid}/exe")) {
			Ok(exe) => exe == expected,
			Err(e) => {
				tracing::warn!(pid, error = %e, "cannot resolve peer executable");
				false
			}
		}
	}
	#[cfg(not(target_os = "linux"))]
	{
		let _ = (stream, expected);
		true
	}
}
