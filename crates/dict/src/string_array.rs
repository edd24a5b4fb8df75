//! Zero-copy reader over the serialized string pool.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! +--------------------------------------+
//! | count N              (4 bytes)       |
//! +--------------------------------------+
//! | offset[0], len[0]    (4 + 4 bytes)   |
//! | ...                                  |
//! | offset[N-1], len[N-1]                |
//! +--------------------------------------+
//! | UTF-8 string data                    |
//! +--------------------------------------+
//! ```
//!
//! Offsets are relative to the start of the buffer. The build emits the runs
//! in ascending byte order; readers only rely on ordinal addressing.

use crate::error::{DictError, Result};

const HEADER_LEN: usize = 4;
const ENTRY_LEN: usize = 8;

/// A borrowed, ordinal-addressed view over a serialized string pool.
///
/// Every run is validated (bounds and UTF-8) once at construction, after
/// which [`get`](Self::get) is a plain slice access.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedStringArray<'a> {
	runs: Vec<&'a str>,
}

impl<'a> SerializedStringArray<'a> {
	/// Parse and validate a serialized string pool.
	///
	/// # Errors
	///
	/// Returns [`DictError::Malformed`] when the buffer is shorter than its
	/// own header, any run falls outside the buffer, or a run is not valid
	/// UTF-8.
	pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
		if data.len() < HEADER_LEN {
			return Err(DictError::Malformed("string pool shorter than its header"));
		}
		let count = read_u32(data, 0) as usize;
		let table_end = HEADER_LEN + count * ENTRY_LEN;
		if data.len() < table_end {
			return Err(DictError::Malformed("string pool offset table truncated"));
		}

		let mut runs = Vec::with_capacity(count);
		for i in 0..count {
			let entry = HEADER_LEN + i * ENTRY_LEN;
			let offset = read_u32(data, entry) as usize;
			let len = read_u32(data, entry + 4) as usize;
			let run = offset
				.checked_add(len)
				.and_then(|end| data.get(offset..end))
				.ok_or(DictError::Malformed("string run out of bounds"))?;
			let run = std::str::from_utf8(run)
				.map_err(|_| DictError::Malformed("string run is not valid UTF-8"))?;
			runs.push(run);
		}

		Ok(Self { runs })
	}

	/// Number of strings in the pool.
	#[must_use]
	pub fn len(&self) -> usize {
		self.runs.len()
	}

	/// Whether the pool holds no strings.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.runs.is_empty()
	}

	/// The string at `ordinal`.
	///
	/// # Panics
	///
	/// Panics when `ordinal >= len()`, like slice indexing.
	#[must_use]
	pub fn get(&self, ordinal: usize) -> &'a str {
		self.runs[ordinal]
	}

	/// Iterate over all runs in ordinal order.
	pub fn iter(&self) -> impl ExactSizeIterator<Item = &'a str> + '_ {
		self.runs.iter().copied()
	}
}

fn read_u32(data: &[u8], at: usize) -> u32 {
	u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
