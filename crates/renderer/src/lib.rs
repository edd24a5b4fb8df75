//! Supervised IPC client for the candidate-window renderer process.
//!
//! The renderer draws candidate lists in its own process; this crate owns
//! that process's lifecycle from the engine side. [`client::RendererClient`]
//! turns high-level calls (`activate`, `exec_command`, `shutdown`) into IPC
//! sends, deferring them through a single-slot pending buffer whenever the
//! renderer is not yet connectable, and [`launcher::ProcessLauncher`] runs
//! the launch state machine: spawn, rendezvous, retry with cooldown, and
//! flush of the pended command on first readiness.
//!
//! Crashes, timeouts, and protocol or product version mismatches are all
//! absorbed here; at worst the supervisor marks itself non-functional and
//! drops commands, never the session.

pub mod client;
pub mod launcher;

pub use client::RendererClient;
pub use launcher::{
	LaunchTuning, ProcessLauncher, RendererErrorKind, RendererLauncher, RendererStatus,
};
