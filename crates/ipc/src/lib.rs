//! IPC plumbing between the engine and the renderer process.
//!
//! Three capabilities live here, each behind a small injectable seam so the
//! supervisor can be driven with in-process fakes:
//!
//! * [`client`] is the request/response transport: a Unix-domain socket
//!   carrying length-prefixed postcard frames, with a version handshake on
//!   connect and optional server-binary path verification.
//! * [`named_event`] is the rendezvous primitive a freshly launched renderer
//!   uses to signal readiness to its parent.
//! * [`process`] is the platform spawn capability and the awaitable child
//!   handle the launch worker selects on.

pub mod client;
pub mod error;
pub mod named_event;
pub mod paths;
pub mod process;
#[doc(hidden)]
pub mod testing;
mod wire;

pub use client::{IpcClient, IpcClientFactory, UdsClient, UdsClientFactory};
pub use error::IpcError;
pub use named_event::{NamedEventListener, NamedEventNotifier, WaitOutcome};
pub use process::{ChildHandle, ProcessSpawner, RendererSpawner};

/// Version of the IPC envelope itself.
///
/// Bumped whenever the frame layout or handshake changes; compared against
/// the server's advertised version before any command is relayed.
pub const IPC_PROTOCOL_VERSION: u32 = 3;
