//! Read-only lookup structures for the user dictionary.
//!
//! The user POS table is shipped as two packed byte regions produced by the
//! dictionary build:
//!
//! * a **string pool** holding every key/value suffix and POS display name,
//!   serialized with [`SerializedStringArray`]'s header-plus-runs layout and
//!   addressed by 16-bit ordinal, and
//! * a **token array** of fixed 8-byte records sorted by POS index, read
//!   zero-copy by [`TokenArray`].
//!
//! [`UserPos`] ties the two together and answers the queries the user
//! dictionary needs: the POS name list, name validation, and materializing
//! [`UserPosToken`]s for a key/value/POS/locale combination. Both readers
//! borrow the caller's buffers and never mutate them; the caller guarantees
//! the buffers outlive the table.

pub mod error;
pub mod string_array;
pub mod user_pos;

pub use error::DictError;
pub use string_array::SerializedStringArray;
pub use user_pos::{TOKEN_BYTE_LENGTH, TokenArray, TokenAttribute, TokenRecord, UserPos, UserPosToken};
