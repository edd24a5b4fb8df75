//! Introspectable IPC error kinds.

use thiserror::Error;

/// Why an IPC operation failed.
///
/// Kept `Copy` so a client can retain its last error for callers that
/// inspect it after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IpcError {
	/// The operation did not complete within its deadline.
	#[error("IPC operation timed out")]
	Timeout,

	/// No server is listening on the service socket.
	#[error("not connected to a renderer server")]
	NotConnected,

	/// The peer behind the socket is not the expected server binary.
	#[error("server binary path verification failed")]
	ServerPathMismatch,

	/// A frame could not be encoded or decoded.
	#[error("malformed IPC frame")]
	Codec,

	/// The underlying transport failed.
	#[error("IPC transport error")]
	Io,
}
