//! Packing host values into guest memory and unpacking guest slices.
//!
//! # Unpacking
//!
//! A guest entry point that returns a slice returns the address of a
//! [`SliceHeader`]. The host adopts that address, reads the header, copies the
//! described bytes out, and then releases the header back to the guest. The
//! release happens whether or not decoding succeeds: once the host has read a
//! header it owns it, and nobody else will free it.
//!
//! # Packing
//!
//! Packing allocates guest memory for the encoded value and writes it, and
//! returns the `(pointer, length)` pair without wrapping it. Entry points that
//! take `(ptr, len)` as two arguments use the pair directly; entry points that
//! take a single address wrap it with
//! [`write_header`](crate::header::write_header) first.
//!
//! # Text
//!
//! Text is a `u8` slice holding UTF-8 with no byte-order mark and no
//! terminator. Decoding is strict: invalid UTF-8 is a
//! [`Error::Decode`] rather than being replaced, so that corrupted boundary
//! data is surfaced where it is first seen.

use bytes::Bytes;

use crate::controller::MemoryController;
use crate::element::{self, Element, ElementKind, Elements};
use crate::err::{Error, Result};
use crate::header::{SliceHeader, read_header};
use crate::memory;
use crate::ptr::OwnedPtr;

/// Read the header at `ptr`, snapshot `size`-byte elements, release `ptr`.
fn take(ctrl: &mut dyn MemoryController, ptr: OwnedPtr, size: usize) -> Result<Bytes> {
	let data = read_header(&*ctrl, ptr.addr()).and_then(|header| header.data(&*ctrl, size));
	ctrl.release(ptr)?;
	data
}

/// Unpack a slice of `T` and release its header.
pub fn read_slice<T: Element>(ctrl: &mut dyn MemoryController, ptr: OwnedPtr) -> Result<Vec<T>> {
	let bytes = take(ctrl, ptr, T::KIND.size())?;
	element::decode_all(&bytes)
}

/// Unpack a slice whose element kind is only known at runtime.
pub fn read_elements(
	ctrl: &mut dyn MemoryController,
	ptr: OwnedPtr,
	kind: ElementKind,
) -> Result<Elements> {
	let bytes = take(ctrl, ptr, kind.size())?;
	Elements::decode(kind, &bytes)
}

/// Unpack raw bytes and release their header.
pub fn read_bytes(ctrl: &mut dyn MemoryController, ptr: OwnedPtr) -> Result<Bytes> {
	take(ctrl, ptr, 1)
}

/// Unpack UTF-8 text and release its header.
pub fn read_str(ctrl: &mut dyn MemoryController, ptr: OwnedPtr) -> Result<String> {
	let bytes = take(ctrl, ptr, 1)?;
	decode_str(&bytes)
}

pub(crate) fn decode_str(bytes: &[u8]) -> Result<String> {
	std::str::from_utf8(bytes)
		.map(str::to_owned)
		.map_err(|e| Error::Decode(format!("Invalid UTF-8 string: {e}")))
}

/// Copy `bytes` into a fresh guest allocation.
pub fn write_bytes(ctrl: &mut dyn MemoryController, bytes: &[u8]) -> Result<SliceHeader> {
	let len = u32::try_from(bytes.len()).map_err(|_| Error::OutOfBounds {
		addr: 0,
		len: bytes.len() as u64,
		size: u32::MAX as u64,
	})?;
	let ptr = ctrl.alloc(len)?;
	if let Err(e) = memory::write(ctrl, ptr, bytes) {
		ctrl.free(ptr)?;
		return Err(e);
	}
	Ok(SliceHeader::new(ptr, len))
}

/// Pack a slice of `T` into guest memory.
///
/// The returned header's `len` is the element count.
pub fn write_slice<T: Element>(
	ctrl: &mut dyn MemoryController,
	values: &[T],
) -> Result<SliceHeader> {
	let header = write_bytes(ctrl, &element::encode_all(values))?;
	Ok(SliceHeader::new(header.ptr, values.len() as u32))
}

/// Pack a runtime-tagged sequence into guest memory.
pub fn write_elements(
	ctrl: &mut dyn MemoryController,
	values: &Elements,
) -> Result<SliceHeader> {
	let header = write_bytes(ctrl, &values.encode())?;
	Ok(SliceHeader::new(header.ptr, values.len() as u32))
}

/// Pack UTF-8 text into guest memory.
pub fn write_str(ctrl: &mut dyn MemoryController, value: &str) -> Result<SliceHeader> {
	write_bytes(ctrl, value.as_bytes())
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;
	use crate::header::write_header;
	use crate::mock::MockGuest;
	use crate::ptr::{Ledger, NULL};

	/// Pack `values`, wrap them in a header, and hand the header to the host
	/// as if the guest had returned it.
	fn returned<T: Element>(guest: &mut MockGuest, values: &[T]) -> OwnedPtr {
		let header = write_slice(guest, values).unwrap();
		let addr = write_header(guest, header.ptr, header.len).unwrap();
		guest.adopt(addr).unwrap()
	}

	#[rstest]
	#[case::empty("")]
	#[case::ascii("Hello, word!")]
	#[case::cyrillic("Привет из JS")]
	#[case::emoji("boundary 🦀 crossing")]
	fn text_round_trips(#[case] text: &str) {
		let mut guest = MockGuest::new();
		let header = write_str(&mut guest, text).unwrap();
		assert_eq!(header.len as usize, text.len());
		let allocs = guest.allocs();
		let addr = write_header(&mut guest, header.ptr, header.len).unwrap();
		// Wrapping is a single 8-byte allocation
		assert_eq!(guest.allocs(), allocs + 1);
		assert_eq!(guest.allocation(addr), Some(8));
		let frees = guest.frees();
		let ptr = guest.adopt(addr).unwrap();
		assert_eq!(read_str(&mut guest, ptr).unwrap(), text);
		// Unpacking allocates nothing and releases exactly the header, exactly once
		assert_eq!(guest.allocs(), allocs + 1);
		assert_eq!(guest.frees(), frees + 1);
		assert_eq!(guest.allocation(addr), None);
		assert_eq!(guest.outstanding(), 0);
		assert_eq!(guest.deallocate(addr), Err(Error::DoubleRelease(addr)));
	}

	#[test]
	fn numeric_slices_round_trip() {
		let mut guest = MockGuest::new();
		let ptr = returned(&mut guest, &[1f32, 2.42, 3.13]);
		assert_eq!(read_slice::<f32>(&mut guest, ptr).unwrap(), vec![1f32, 2.42, 3.13]);
		let ptr = returned(&mut guest, &[1i64, 2, i64::MAX]);
		assert_eq!(read_slice::<i64>(&mut guest, ptr).unwrap(), vec![1, 2, i64::MAX]);
		let ptr = returned(&mut guest, &[i8::MIN, 0, i8::MAX]);
		assert_eq!(read_slice::<i8>(&mut guest, ptr).unwrap(), vec![i8::MIN, 0, i8::MAX]);
		let ptr = returned(&mut guest, &[u16::MAX, 7]);
		assert_eq!(read_slice::<u16>(&mut guest, ptr).unwrap(), vec![u16::MAX, 7]);
		let ptr = returned(&mut guest, &[f64::MIN_POSITIVE, f64::INFINITY]);
		assert_eq!(
			read_slice::<f64>(&mut guest, ptr).unwrap(),
			vec![f64::MIN_POSITIVE, f64::INFINITY]
		);
		assert_eq!(guest.outstanding(), 0);
	}

	#[test]
	fn tagged_slices_round_trip() {
		let mut guest = MockGuest::new();
		let values = Elements::U64(vec![u64::MAX, 0, 42]);
		let header = write_elements(&mut guest, &values).unwrap();
		assert_eq!(header.len, 3);
		let addr = write_header(&mut guest, header.ptr, header.len).unwrap();
		let ptr = guest.adopt(addr).unwrap();
		assert_eq!(read_elements(&mut guest, ptr, ElementKind::U64).unwrap(), values);
	}

	/// A guest whose memory cannot be written by the host.
	struct ReadOnly(MockGuest);

	impl MemoryController for ReadOnly {
		fn alloc(&mut self, len: u32) -> Result<u32> {
			self.0.alloc(len)
		}

		fn free(&mut self, ptr: u32) -> Result<()> {
			self.0.free(ptr)
		}

		fn mem(&self) -> &[u8] {
			self.0.mem()
		}

		fn mut_mem(&mut self) -> &mut [u8] {
			&mut []
		}

		fn generation(&self) -> u64 {
			self.0.generation()
		}

		fn ledger(&mut self) -> &mut Ledger {
			self.0.ledger()
		}
	}

	#[test]
	fn failed_writes_free_their_allocation() {
		let mut guest = ReadOnly(MockGuest::new());
		assert!(matches!(write_str(&mut guest, "lost"), Err(Error::OutOfBounds { .. })));
		assert!(matches!(write_header(&mut guest, 1024, 4), Err(Error::OutOfBounds { .. })));
		assert_eq!(guest.0.allocs(), 2);
		assert_eq!(guest.0.frees(), 2);
		assert_eq!(guest.0.live(), 0);
	}

	#[test]
	fn header_length_counts_elements_not_bytes() {
		let mut guest = MockGuest::new();
		let header = write_slice(&mut guest, &[1u32, 2, 3]).unwrap();
		assert_eq!(header.len, 3);
		assert_eq!(memory::view(&guest, header.ptr, 12).unwrap().len(), 12);
	}

	#[test]
	fn null_data_pointer_fails_and_still_releases() {
		let mut guest = MockGuest::new();
		let addr = write_header(&mut guest, NULL, 0).unwrap();
		let ptr = guest.adopt(addr).unwrap();
		assert_eq!(read_slice::<u8>(&mut guest, ptr), Err(Error::NullReference));
		assert_eq!(guest.frees(), 1);
		assert_eq!(guest.outstanding(), 0);
	}

	#[test]
	fn invalid_utf8_is_rejected_not_replaced() {
		let mut guest = MockGuest::new();
		let ptr = returned(&mut guest, &[0x48u8, 0x69, 0xff, 0xfe]);
		let err = read_str(&mut guest, ptr).unwrap_err();
		assert!(matches!(err, Error::Decode(ref msg) if msg.starts_with("Invalid UTF-8 string")));
		assert_eq!(guest.outstanding(), 0);
	}

	#[test]
	fn data_past_the_end_of_memory_is_out_of_bounds() {
		let mut guest = MockGuest::new();
		let size = guest.mem().len() as u32;
		let addr = write_header(&mut guest, size - 2, 4).unwrap();
		let ptr = guest.adopt(addr).unwrap();
		assert!(matches!(read_bytes(&mut guest, ptr), Err(Error::OutOfBounds { .. })));
		assert_eq!(guest.outstanding(), 0);
	}

	#[test]
	fn reads_survive_memory_growth_between_calls() {
		let mut guest = MockGuest::new();
		let first = returned(&mut guest, &[10u32, 20, 30]);
		let before = read_slice::<u32>(&mut guest, first).unwrap();
		// A guest call that grows memory and moves the buffer
		guest.grow(4).unwrap();
		let second = returned(&mut guest, &[40u32, 50]);
		let after = read_slice::<u32>(&mut guest, second).unwrap();
		assert_eq!(before, vec![10, 20, 30]);
		assert_eq!(after, vec![40, 50]);
	}
}
