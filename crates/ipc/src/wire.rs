//! Frame layer shared by the client and the test server.
//!
//! Every frame is a u32-le length prefix followed by a postcard-encoded
//! body. The server speaks first: a [`ServerFrame::Hello`] carrying its
//! protocol and product versions, read by the client during construction.

use std::io::{Error as IoError, ErrorKind};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame body; a candidate window payload is small.
const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

/// Frames sent by the engine side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum ClientFrame {
	/// A serialized renderer command; the body is opaque at this layer.
	Call(Vec<u8>),
	/// Ask the server process to exit immediately.
	Terminate,
}

/// Frames sent by the renderer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum ServerFrame {
	/// Handshake sent once, immediately after accept.
	Hello {
		/// The server's IPC envelope version.
		protocol_version: u32,
		/// The server's product version string.
		product_version: String,
	},
	/// Response to a [`ClientFrame::Call`]; ignored by the supervisor.
	Reply(Vec<u8>),
}

pub(crate) async fn write_frame<W, T>(writer: &mut W, frame: &T) -> std::io::Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let body = postcard::to_allocvec(frame)
		.map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
	writer.write_u32_le(body.len() as u32).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

pub(crate) async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<T>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let len = reader.read_u32_le().await?;
	if len > MAX_FRAME_LEN {
		return Err(IoError::new(ErrorKind::InvalidData, "oversized IPC frame"));
	}
	let mut body = vec![0u8; len as usize];
	reader.read_exact(&mut body).await?;
	postcard::from_bytes(&body).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
}
