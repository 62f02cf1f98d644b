//! Element kinds that can be carried in a slice.
//!
//! Every element is stored little-endian with its natural width. The kind of
//! a slice is never inferred from the bytes; it is either a type parameter
//! ([`Element`]) or an explicit [`ElementKind`] tag.

use std::fmt;

use crate::err::{Error, Result};

mod sealed {
	pub trait Sealed {}
}

/// A fixed-width numeric type with a little-endian wire encoding.
pub trait Element: Copy + sealed::Sealed {
	/// The runtime tag for this type.
	const KIND: ElementKind;

	/// Decode one element from exactly `KIND.size()` bytes.
	fn from_wire(bytes: &[u8]) -> Self;

	/// Append this element's encoding to `out`.
	fn to_wire(self, out: &mut Vec<u8>);
}

/// Runtime tag naming an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
	I8,
	U8,
	I16,
	U16,
	I32,
	U32,
	I64,
	U64,
	F32,
	F64,
}

impl ElementKind {
	/// Width of one element in bytes.
	pub const fn size(self) -> usize {
		match self {
			ElementKind::I8 | ElementKind::U8 => 1,
			ElementKind::I16 | ElementKind::U16 => 2,
			ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
			ElementKind::I64 | ElementKind::U64 | ElementKind::F64 => 8,
		}
	}
}

impl fmt::Display for ElementKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ElementKind::I8 => "i8",
			ElementKind::U8 => "u8",
			ElementKind::I16 => "i16",
			ElementKind::U16 => "u16",
			ElementKind::I32 => "i32",
			ElementKind::U32 => "u32",
			ElementKind::I64 => "i64",
			ElementKind::U64 => "u64",
			ElementKind::F32 => "f32",
			ElementKind::F64 => "f64",
		};
		f.write_str(name)
	}
}

macro_rules! impl_element {
	($($ty:ty => $kind:ident),+ $(,)?) => {
		$(
			impl sealed::Sealed for $ty {}

			impl Element for $ty {
				const KIND: ElementKind = ElementKind::$kind;

				fn from_wire(bytes: &[u8]) -> Self {
					let mut raw = [0u8; std::mem::size_of::<$ty>()];
					raw.copy_from_slice(bytes);
					<$ty>::from_le_bytes(raw)
				}

				fn to_wire(self, out: &mut Vec<u8>) {
					out.extend_from_slice(&self.to_le_bytes());
				}
			}
		)+
	};
}

impl_element! {
	i8 => I8,
	u8 => U8,
	i16 => I16,
	u16 => U16,
	i32 => I32,
	u32 => U32,
	i64 => I64,
	u64 => U64,
	f32 => F32,
	f64 => F64,
}

/// Reinterpret a byte span as a sequence of `T`.
///
/// Fails with [`Error::Decode`] if the span is not a whole number of elements.
pub fn decode_all<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
	let size = T::KIND.size();
	if bytes.len() % size != 0 {
		return Err(Error::Decode(format!(
			"{} bytes is not a whole number of {}-byte {} elements",
			bytes.len(),
			size,
			T::KIND
		)));
	}
	Ok(bytes.chunks_exact(size).map(T::from_wire).collect())
}

/// Encode a sequence of `T` into its wire bytes.
pub fn encode_all<T: Element>(values: &[T]) -> Vec<u8> {
	let mut out = Vec::with_capacity(values.len() * T::KIND.size());
	for value in values {
		value.to_wire(&mut out);
	}
	out
}

/// A decoded sequence tagged with its element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
	I8(Vec<i8>),
	U8(Vec<u8>),
	I16(Vec<i16>),
	U16(Vec<u16>),
	I32(Vec<i32>),
	U32(Vec<u32>),
	I64(Vec<i64>),
	U64(Vec<u64>),
	F32(Vec<f32>),
	F64(Vec<f64>),
}

impl Elements {
	/// Reinterpret `bytes` as elements of `kind`.
	pub fn decode(kind: ElementKind, bytes: &[u8]) -> Result<Self> {
		Ok(match kind {
			ElementKind::I8 => Elements::I8(decode_all(bytes)?),
			ElementKind::U8 => Elements::U8(decode_all(bytes)?),
			ElementKind::I16 => Elements::I16(decode_all(bytes)?),
			ElementKind::U16 => Elements::U16(decode_all(bytes)?),
			ElementKind::I32 => Elements::I32(decode_all(bytes)?),
			ElementKind::U32 => Elements::U32(decode_all(bytes)?),
			ElementKind::I64 => Elements::I64(decode_all(bytes)?),
			ElementKind::U64 => Elements::U64(decode_all(bytes)?),
			ElementKind::F32 => Elements::F32(decode_all(bytes)?),
			ElementKind::F64 => Elements::F64(decode_all(bytes)?),
		})
	}

	/// Encode back into wire bytes.
	pub fn encode(&self) -> Vec<u8> {
		match self {
			Elements::I8(v) => encode_all(v),
			Elements::U8(v) => v.clone(),
			Elements::I16(v) => encode_all(v),
			Elements::U16(v) => encode_all(v),
			Elements::I32(v) => encode_all(v),
			Elements::U32(v) => encode_all(v),
			Elements::I64(v) => encode_all(v),
			Elements::U64(v) => encode_all(v),
			Elements::F32(v) => encode_all(v),
			Elements::F64(v) => encode_all(v),
		}
	}

	pub fn kind(&self) -> ElementKind {
		match self {
			Elements::I8(_) => ElementKind::I8,
			Elements::U8(_) => ElementKind::U8,
			Elements::I16(_) => ElementKind::I16,
			Elements::U16(_) => ElementKind::U16,
			Elements::I32(_) => ElementKind::I32,
			Elements::U32(_) => ElementKind::U32,
			Elements::I64(_) => ElementKind::I64,
			Elements::U64(_) => ElementKind::U64,
			Elements::F32(_) => ElementKind::F32,
			Elements::F64(_) => ElementKind::F64,
		}
	}

	/// Number of elements.
	pub fn len(&self) -> usize {
		match self {
			Elements::I8(v) => v.len(),
			Elements::U8(v) => v.len(),
			Elements::I16(v) => v.len(),
			Elements::U16(v) => v.len(),
			Elements::I32(v) => v.len(),
			Elements::U32(v) => v.len(),
			Elements::I64(v) => v.len(),
			Elements::U64(v) => v.len(),
			Elements::F32(v) => v.len(),
			Elements::F64(v) => v.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::i8(ElementKind::I8, 1)]
	#[case::u8(ElementKind::U8, 1)]
	#[case::i16(ElementKind::I16, 2)]
	#[case::u16(ElementKind::U16, 2)]
	#[case::i32(ElementKind::I32, 4)]
	#[case::u32(ElementKind::U32, 4)]
	#[case::f32(ElementKind::F32, 4)]
	#[case::i64(ElementKind::I64, 8)]
	#[case::u64(ElementKind::U64, 8)]
	#[case::f64(ElementKind::F64, 8)]
	fn kinds_have_fixed_sizes(#[case] kind: ElementKind, #[case] size: usize) {
		assert_eq!(kind.size(), size);
	}

	#[test]
	fn elements_are_little_endian() {
		assert_eq!(encode_all(&[0x0102u16]), vec![0x02, 0x01]);
		assert_eq!(encode_all(&[-1i32]), vec![0xff; 4]);
		assert_eq!(encode_all(&[1.0f32]), vec![0x00, 0x00, 0x80, 0x3f]);
		assert_eq!(decode_all::<i64>(&[0xff; 8]).unwrap(), vec![-1]);
	}

	#[test]
	fn partial_elements_are_a_decode_error() {
		let err = decode_all::<u32>(&[1, 2, 3, 4, 5]).unwrap_err();
		assert_eq!(
			err,
			Error::Decode("5 bytes is not a whole number of 4-byte u32 elements".into())
		);
		assert!(matches!(Elements::decode(ElementKind::F64, &[0; 12]), Err(Error::Decode(_))));
	}

	#[test]
	fn tagged_decode_matches_the_kind() {
		let bytes = encode_all(&[1.5f64, -2.25]);
		let elements = Elements::decode(ElementKind::F64, &bytes).unwrap();
		assert_eq!(elements, Elements::F64(vec![1.5, -2.25]));
		assert_eq!(elements.kind(), ElementKind::F64);
		assert_eq!(elements.len(), 2);
		assert_eq!(elements.encode(), bytes);
		// The same bytes are a different sequence under a different tag
		let words = Elements::decode(ElementKind::U32, &bytes).unwrap();
		assert_eq!(words.len(), 4);
	}
}
