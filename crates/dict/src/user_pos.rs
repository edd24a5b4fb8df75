//! User POS lookup over a sorted, packed token array.
//!
//! Each token is an 8-byte little-endian record:
//!
//! ```text
//! +---------------------------------------+
//! | POS index            (2 bytes)        |
//! + - - - - - - - - - - - - - - - - - - - +
//! | Value suffix index   (2 bytes)        |
//! + - - - - - - - - - - - - - - - - - - - +
//! | Key suffix index     (2 bytes)        |
//! + - - - - - - - - - - - - - - - - - - - +
//! | Conjugation ID       (2 bytes)        |
//! +---------------------------------------+
//! ```
//!
//! Records are sorted in ascending order of POS index (ties permitted, build
//! order preserved), so a POS's records form one contiguous range found by
//! binary search. All string fields are ordinals into the accompanying
//! [`SerializedStringArray`]. The data may be mapped at 2-byte alignment;
//! every field is read with an explicit unaligned little-endian load.

use std::collections::HashSet;
use std::ops::Range;

use crate::error::{DictError, Result};
use crate::string_array::SerializedStringArray;

/// Size of one packed token record.
pub const TOKEN_BYTE_LENGTH: usize = 8;

/// POS display name marking the build's default selection.
const DEFAULT_POS_NAME: &str = "名詞";

/// One unpacked token record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRecord {
	/// Ordinal of the POS this token belongs to.
	pub pos_index: u16,
	/// String pool ordinal of the value suffix.
	pub value_suffix_index: u16,
	/// String pool ordinal of the key suffix.
	pub key_suffix_index: u16,
	/// Opaque morphological class identifier.
	pub conjugation_id: u16,
}

impl TokenRecord {
	fn read(chunk: &[u8]) -> Self {
		Self {
			pos_index: u16::from_le_bytes([chunk[0], chunk[1]]),
			value_suffix_index: u16::from_le_bytes([chunk[2], chunk[3]]),
			key_suffix_index: u16::from_le_bytes([chunk[4], chunk[5]]),
			conjugation_id: u16::from_le_bytes([chunk[6], chunk[7]]),
		}
	}
}

/// Zero-copy random access over the packed token array.
///
/// Indexing is in units of records, never bytes; no per-record allocation
/// happens on any access path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenArray<'a> {
	data: &'a [u8],
}

impl<'a> TokenArray<'a> {
	/// Wrap a packed token buffer.
	///
	/// # Errors
	///
	/// Returns [`DictError::Malformed`] when the buffer length is not a
	/// multiple of [`TOKEN_BYTE_LENGTH`].
	pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
		if data.len() % TOKEN_BYTE_LENGTH != 0 {
			return Err(DictError::Malformed("token array length is not a multiple of 8"));
		}
		Ok(Self { data })
	}

	/// Number of records.
	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len() / TOKEN_BYTE_LENGTH
	}

	/// Whether the array holds no records.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// The record at `index`.
	///
	/// # Panics
	///
	/// Panics when `index >= len()`, like slice indexing.
	#[must_use]
	pub fn get(&self, index: usize) -> TokenRecord {
		let at = index * TOKEN_BYTE_LENGTH;
		TokenRecord::read(&self.data[at..at + TOKEN_BYTE_LENGTH])
	}

	/// Iterate over all records in build order.
	pub fn iter(self) -> impl ExactSizeIterator<Item = TokenRecord> + 'a {
		self.data.chunks_exact(TOKEN_BYTE_LENGTH).map(TokenRecord::read)
	}

	/// The contiguous record range whose `pos_index` equals `pos`.
	///
	/// Relies on the array being sorted non-strictly ascending by POS index.
	fn equal_range(&self, pos: u16) -> Range<usize> {
		let lo = partition_point(self.len(), |i| self.get(i).pos_index < pos);
		let hi = partition_point(self.len(), |i| self.get(i).pos_index <= pos);
		lo..hi
	}
}

fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
	let mut lo = 0;
	let mut hi = len;
	while lo < hi {
		let mid = lo + (hi - lo) / 2;
		if pred(mid) {
			lo = mid + 1;
		} else {
			hi = mid;
		}
	}
	lo
}

/// Dynamic attributes attached to a materialized token.
///
/// Independent from the POS; used downstream to assign costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TokenAttribute {
	/// Added via a shortcut entry with no explicit POS.
	Shortcut = 1,
	/// 短縮よみ.
	IsolatedWord = 2,
	/// Surfaced in suggestions only.
	SuggestionOnly = 4,
	/// The requesting locale is not Japanese.
	NonJaLocale = 8,
}

/// A token materialized by [`UserPos::get_tokens`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPosToken {
	/// Reading, caller key joined with the record's key suffix.
	pub key: String,
	/// Surface form, caller value joined with the record's value suffix.
	pub value: String,
	/// Conjugation ID of the underlying record.
	pub id: u16,
	/// Attribute bitset, see [`TokenAttribute`].
	pub attributes: u16,
	/// Free-form comment, populated from the user dictionary at lookup time.
	pub comment: String,
}

impl UserPosToken {
	/// Set `attr`.
	pub fn add_attribute(&mut self, attr: TokenAttribute) {
		self.attributes |= attr as u16;
	}

	/// Whether `attr` is set.
	#[must_use]
	pub fn has_attribute(&self, attr: TokenAttribute) -> bool {
		self.attributes & attr as u16 != 0
	}

	/// Clear `attr`.
	pub fn remove_attribute(&mut self, attr: TokenAttribute) {
		self.attributes &= !(attr as u16);
	}
}

/// The user POS table: token array + string pool + derived POS name list.
///
/// Immutable after construction and safe for concurrent reads; borrows the
/// caller's buffers, which must outlive it.
#[derive(Debug, PartialEq)]
pub struct UserPos<'a> {
	tokens: TokenArray<'a>,
	strings: SerializedStringArray<'a>,
	pos_entries: Vec<PosEntry<'a>>,
	default_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PosEntry<'a> {
	index: u16,
	name: &'a str,
}

impl<'a> UserPos<'a> {
	/// Build the table from the two packed regions.
	///
	/// Walks every record once, validating that each of its three string
	/// ordinals is in range and collecting distinct POS indices in encounter
	/// order. The display name of POS `p` is the pool entry at ordinal `p`.
	///
	/// # Errors
	///
	/// Returns [`DictError::Malformed`] when either region fails structural
	/// validation or any record references an out-of-range ordinal.
	pub fn from_bytes(token_bytes: &'a [u8], string_bytes: &'a [u8]) -> Result<Self> {
		let strings = SerializedStringArray::from_bytes(string_bytes)?;
		let tokens = TokenArray::from_bytes(token_bytes)?;

		let mut pos_entries: Vec<PosEntry<'a>> = Vec::new();
		let mut seen = HashSet::new();
		for record in tokens.iter() {
			let ordinals = [
				record.pos_index,
				record.value_suffix_index,
				record.key_suffix_index,
			];
			if ordinals.iter().any(|&i| usize::from(i) >= strings.len()) {
				return Err(DictError::Malformed("token references an out-of-range string ordinal"));
			}
			if seen.insert(record.pos_index) {
				pos_entries.push(PosEntry {
					index: record.pos_index,
					name: strings.get(usize::from(record.pos_index)),
				});
			}
		}

		let default_index = pos_entries
			.iter()
			.position(|e| e.name == DEFAULT_POS_NAME)
			.unwrap_or(0);

		tracing::debug!(
			tokens = tokens.len(),
			pos = pos_entries.len(),
			"loaded user POS table"
		);

		Ok(Self {
			tokens,
			strings,
			pos_entries,
			default_index,
		})
	}

	/// Ordered, deduplicated POS display names.
	#[must_use]
	pub fn pos_list(&self) -> Vec<&'a str> {
		self.pos_entries.iter().map(|e| e.name).collect()
	}

	/// Position in [`pos_list`](Self::pos_list) preselected for the UI.
	#[must_use]
	pub fn default_pos_index(&self) -> usize {
		self.default_index
	}

	/// Whether `pos` names a POS present in the table.
	#[must_use]
	pub fn is_valid_pos(&self, pos: &str) -> bool {
		self.find_pos(pos).is_some()
	}

	/// The POS id of `pos`: the conjugation ID of its first token.
	#[must_use]
	pub fn pos_id(&self, pos: &str) -> Option<u16> {
		let target = self.find_pos(pos)?;
		let range = self.tokens.equal_range(target);
		range.clone().next().map(|i| self.tokens.get(i).conjugation_id)
	}

	/// Materialize one [`UserPosToken`] per record of `pos`, in build order.
	///
	/// `key` and `value` are joined with each record's suffixes; empty
	/// strings are legal on either side. A non-empty `locale` that does not
	/// begin with ASCII-case-insensitive `"ja"` marks every produced token
	/// [`TokenAttribute::NonJaLocale`]. An empty record range is success
	/// with an empty list.
	///
	/// # Errors
	///
	/// Returns [`DictError::UnknownPos`] when `pos` is not in the table.
	pub fn get_tokens(
		&self,
		key: &str,
		value: &str,
		pos: &str,
		locale: &str,
	) -> Result<Vec<UserPosToken>> {
		let Some(target) = self.find_pos(pos) else {
			return Err(DictError::UnknownPos(pos.to_string()));
		};
		let non_ja = !locale.is_empty() && !is_japanese_locale(locale);

		let range = self.tokens.equal_range(target);
		let mut out = Vec::with_capacity(range.len());
		for i in range {
			let record = self.tokens.get(i);
			let mut token = UserPosToken {
				key: join(key, self.strings.get(usize::from(record.key_suffix_index))),
				value: join(value, self.strings.get(usize::from(record.value_suffix_index))),
				id: record.conjugation_id,
				..UserPosToken::default()
			};
			if non_ja {
				token.add_attribute(TokenAttribute::NonJaLocale);
			}
			out.push(token);
		}
		Ok(out)
	}

	/// [`get_tokens`](Self::get_tokens) without a locale filter.
	///
	/// # Errors
	///
	/// Returns [`DictError::UnknownPos`] when `pos` is not in the table.
	pub fn get_tokens_any_locale(&self, key: &str, value: &str, pos: &str) -> Result<Vec<UserPosToken>> {
		self.get_tokens(key, value, pos, "")
	}

	/// The underlying token array.
	#[must_use]
	pub fn tokens(&self) -> TokenArray<'a> {
		self.tokens
	}

	fn find_pos(&self, pos: &str) -> Option<u16> {
		self.pos_entries.iter().find(|e| e.name == pos).map(|e| e.index)
	}
}

fn is_japanese_locale(locale: &str) -> bool {
	locale.as_bytes().get(..2).is_some_and(|head| head.eq_ignore_ascii_case(b"ja"))
}

fn join(head: &str, suffix: &str) -> String {
	let mut out = String::with_capacity(head.len() + suffix.len());
	out.push_str(head);
	out.push_str(suffix);
	out
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;
	use crate::string_array::tests::build as build_pool;

	fn build_tokens(records: &[(u16, u16, u16, u16)]) -> Vec<u8> {
		let mut out = Vec::with_capacity(records.len() * TOKEN_BYTE_LENGTH);
		for &(pos, value_suffix, key_suffix, conjugation) in records {
			out.extend_from_slice(&pos.to_le_bytes());
			out.extend_from_slice(&value_suffix.to_le_bytes());
			out.extend_from_slice(&key_suffix.to_le_bytes());
			out.extend_from_slice(&conjugation.to_le_bytes());
		}
		out
	}

	/// The single-record table of the walk-verb example: pool
	/// `["", "い", "た", "名詞"]`, one 名詞 token with key suffix "い".
	fn noun_table() -> (Vec<u8>, Vec<u8>) {
		(build_tokens(&[(3, 0, 1, 7)]), build_pool(&["", "い", "た", "名詞"]))
	}

	#[test]
	fn happy_path_materializes_suffix_joined_token() {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert_eq!(table.pos_list(), vec!["名詞"]);
		let got = table.get_tokens("歩", "歩", "名詞", "ja").unwrap();
		assert_eq!(
			got,
			vec![UserPosToken {
				key: "歩い".to_string(),
				value: "歩".to_string(),
				id: 7,
				attributes: 0,
				comment: String::new(),
			}]
		);
	}

	#[test]
	fn non_ja_locale_sets_attribute() {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		let got = table.get_tokens("歩", "歩", "名詞", "en").unwrap();
		assert_eq!(got.len(), 1);
		assert_eq!(got[0].attributes, TokenAttribute::NonJaLocale as u16);
	}

	#[test]
	fn unknown_pos_is_an_error() {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert_eq!(
			table.get_tokens("x", "y", "動詞", ""),
			Err(DictError::UnknownPos("動詞".to_string()))
		);
	}

	#[rstest]
	#[case("ja", false)]
	#[case("ja-JP", false)]
	#[case("JA", false)]
	#[case("", false)]
	#[case("en", true)]
	#[case("en-US", true)]
	#[case("j", true)]
	fn locale_rule(#[case] locale: &str, #[case] expect_non_ja: bool) {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		let got = table.get_tokens("歩", "歩", "名詞", locale).unwrap();
		assert_eq!(got[0].has_attribute(TokenAttribute::NonJaLocale), expect_non_ja);
	}

	#[test]
	fn rejects_ragged_token_buffer() {
		let pool = build_pool(&["名詞"]);
		assert_eq!(
			UserPos::from_bytes(&[0, 0, 0], &pool),
			Err(DictError::Malformed("token array length is not a multiple of 8"))
		);
	}

	#[test]
	fn rejects_out_of_range_ordinal() {
		let pool = build_pool(&["名詞"]);
		let tokens = build_tokens(&[(0, 9, 0, 1)]);
		assert_eq!(
			UserPos::from_bytes(&tokens, &pool),
			Err(DictError::Malformed("token references an out-of-range string ordinal"))
		);
	}

	#[test]
	fn preserves_build_order_within_a_pos() {
		// Pool: suffix strings then two POS names, tokens sorted by pos_index
		// with duplicates.
		let pool = build_pool(&["", "a", "b", "動詞", "名詞"]);
		let tokens = build_tokens(&[
			(3, 1, 0, 10),
			(3, 2, 0, 11),
			(4, 0, 1, 20),
			(4, 0, 2, 21),
			(4, 0, 0, 22),
		]);
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert_eq!(table.pos_list(), vec!["動詞", "名詞"]);
		let got = table.get_tokens("k", "v", "名詞", "").unwrap();
		assert_eq!(got.len(), 3);
		assert_eq!(got[0].id, 20);
		assert_eq!(got[1].id, 21);
		assert_eq!(got[2].id, 22);
		assert_eq!(got[0].key, "ka");
		assert_eq!(got[1].key, "kb");
		assert_eq!(got[2].key, "k");
	}

	#[test]
	fn empty_key_and_value_are_legal() {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		let got = table.get_tokens("", "", "名詞", "").unwrap();
		assert_eq!(got[0].key, "い");
		assert_eq!(got[0].value, "");
	}

	#[test]
	fn pos_id_present_iff_valid() {
		let (tokens, pool) = noun_table();
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert!(table.is_valid_pos("名詞"));
		assert_eq!(table.pos_id("名詞"), Some(7));
		assert!(!table.is_valid_pos("動詞"));
		assert_eq!(table.pos_id("動詞"), None);
	}

	#[test]
	fn default_pos_index_finds_marker() {
		let pool = build_pool(&["", "動詞", "名詞"]);
		let tokens = build_tokens(&[(1, 0, 0, 1), (2, 0, 0, 2)]);
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert_eq!(table.default_pos_index(), 1);
		assert_eq!(table.pos_list()[table.default_pos_index()], "名詞");
	}

	#[test]
	fn default_pos_index_falls_back_to_zero() {
		let pool = build_pool(&["動詞"]);
		let tokens = build_tokens(&[(0, 0, 0, 1)]);
		let table = UserPos::from_bytes(&tokens, &pool).unwrap();

		assert_eq!(table.default_pos_index(), 0);
	}

	#[test]
	fn empty_table_has_no_pos() {
		let pool = build_pool(&[]);
		let table = UserPos::from_bytes(&[], &pool).unwrap();

		assert!(table.pos_list().is_empty());
		assert_eq!(table.default_pos_index(), 0);
		assert!(!table.is_valid_pos("名詞"));
	}

	#[test]
	fn token_array_random_access_is_in_record_units() {
		let data = build_tokens(&[(1, 2, 3, 4), (5, 6, 7, 8)]);
		let array = TokenArray::from_bytes(&data).unwrap();

		assert_eq!(array.len(), 2);
		assert_eq!(
			array.get(1),
			TokenRecord {
				pos_index: 5,
				value_suffix_index: 6,
				key_suffix_index: 7,
				conjugation_id: 8,
			}
		);
		assert_eq!(array.iter().count(), 2);
	}

	#[test]
	fn attribute_bitset_ops() {
		let mut token = UserPosToken::default();
		token.add_attribute(TokenAttribute::Shortcut);
		token.add_attribute(TokenAttribute::SuggestionOnly);
		assert!(token.has_attribute(TokenAttribute::Shortcut));
		assert!(!token.has_attribute(TokenAttribute::IsolatedWord));
		token.remove_attribute(TokenAttribute::Shortcut);
		assert!(!token.has_attribute(TokenAttribute::Shortcut));
		assert_eq!(token.attributes, TokenAttribute::SuggestionOnly as u16);
	}
}
