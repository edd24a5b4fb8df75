//! Wire types exchanged between the engine and the candidate-window
//! renderer process.
//!
//! A [`RendererCommand`] is the one message the engine sends: show or update
//! the window, do nothing (used as a liveness probe), or shut the renderer
//! down. The candidate payload itself is opaque at this layer; the renderer
//! decodes it with its own schema.

use serde::{Deserialize, Serialize};

/// What the renderer should do with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
	/// No state change; used to probe or warm up the renderer.
	Noop,
	/// Replace the candidate window state.
	Update,
	/// Ask the renderer process to exit.
	Shutdown,
}

/// A command for the renderer process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererCommand {
	/// The requested action.
	pub kind: CommandKind,
	/// Whether the candidate window should be visible afterwards.
	pub visible: bool,
	/// Serialized candidate-window payload, opaque to the client side.
	pub output: Option<Vec<u8>>,
}

impl RendererCommand {
	/// A liveness probe; carries no payload and leaves visibility alone.
	#[must_use]
	pub fn noop() -> Self {
		Self {
			kind: CommandKind::Noop,
			visible: false,
			output: None,
		}
	}

	/// A window update carrying `output` as the new content.
	#[must_use]
	pub fn update(visible: bool, output: Option<Vec<u8>>) -> Self {
		Self {
			kind: CommandKind::Update,
			visible,
			output,
		}
	}

	/// An update that hides the window without new content.
	#[must_use]
	pub fn hide() -> Self {
		Self::update(false, None)
	}

	/// A shutdown request.
	#[must_use]
	pub fn shutdown() -> Self {
		Self {
			kind: CommandKind::Shutdown,
			visible: false,
			output: None,
		}
	}

	/// Whether the command carries a candidate payload.
	#[must_use]
	pub fn has_output(&self) -> bool {
		self.output.is_some()
	}

	/// Encode for transmission.
	///
	/// # Errors
	///
	/// Returns the codec error when serialization fails.
	pub fn to_bytes(&self) -> postcard::Result<Vec<u8>> {
		postcard::to_allocvec(self)
	}

	/// Decode a received command.
	///
	/// # Errors
	///
	/// Returns the codec error when `bytes` is not a valid encoding.
	pub fn from_bytes(bytes: &[u8]) -> postcard::Result<Self> {
		postcard::from_bytes(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hide_is_an_update_without_output() {
		let cmd = RendererCommand::hide();
		assert_eq!(cmd.kind, CommandKind::Update);
		assert!(!cmd.visible);
		assert!(!cmd.has_output());
	}

	#[test]
	fn decode_rejects_garbage() {
		assert!(RendererCommand::from_bytes(&[0xff, 0xff, 0xff]).is_err());
	}
}
