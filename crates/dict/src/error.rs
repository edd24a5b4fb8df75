//! Error types for dictionary data access.

use thiserror::Error;

/// Errors surfaced by the user POS lookup structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictError {
	/// The packed data failed structural validation at load time.
	#[error("malformed user POS data: {0}")]
	Malformed(&'static str),

	/// A POS name was looked up that the table does not carry.
	#[error("unknown POS name: {0:?}")]
	UnknownPos(String),
}

/// Result type for dictionary operations.
pub type Result<T> = std::result::Result<T, DictError>;
