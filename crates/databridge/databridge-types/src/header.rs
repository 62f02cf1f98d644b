//! The slice header codec.
//!
//! # Wire Format
//!
//! A slice header is two consecutive little-endian guest words:
//! ```text
//! [4-byte pointer (u32 LE)][4-byte length (u32 LE)]
//! ```
//! `length` counts elements, not bytes. The header never records what kind
//! of element it describes; host and guest agree on that per entry point.

use bytes::Bytes;

use crate::controller::MemoryController;
use crate::err::{Error, Result};
use crate::memory::{self, WORD};
use crate::ptr::NULL;

/// Size of an encoded header in bytes.
pub const HEADER_SIZE: u32 = 2 * WORD;

/// A `(pointer, length)` pair describing a run of same-sized elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceHeader {
	pub ptr: u32,
	pub len: u32,
}

impl SliceHeader {
	pub const fn new(ptr: u32, len: u32) -> Self {
		Self {
			ptr,
			len,
		}
	}

	pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
		let mut out = [0u8; HEADER_SIZE as usize];
		out[..4].copy_from_slice(&self.ptr.to_le_bytes());
		out[4..].copy_from_slice(&self.len.to_le_bytes());
		out
	}

	pub fn decode(bytes: [u8; HEADER_SIZE as usize]) -> Self {
		let [p0, p1, p2, p3, l0, l1, l2, l3] = bytes;
		Self {
			ptr: u32::from_le_bytes([p0, p1, p2, p3]),
			len: u32::from_le_bytes([l0, l1, l2, l3]),
		}
	}

	/// The number of bytes covered by `len` elements of `size` bytes each.
	pub fn byte_len(&self, size: usize) -> Result<u32> {
		(self.len as u64)
			.checked_mul(size as u64)
			.and_then(|n| u32::try_from(n).ok())
			.ok_or(Error::OutOfBounds {
				addr: self.ptr as u64,
				len: self.len as u64 * size as u64,
				size: u32::MAX as u64,
			})
	}

	/// Snapshot the described elements as raw bytes.
	///
	/// Fails with [`Error::NullReference`] when the data pointer is null,
	/// even if the length is zero.
	pub fn data(&self, ctrl: &dyn MemoryController, size: usize) -> Result<Bytes> {
		if self.ptr == NULL {
			return Err(Error::NullReference);
		}
		memory::view(ctrl, self.ptr, self.byte_len(size)?)
	}
}

/// Read the header stored at `addr`.
pub fn read_header(ctrl: &dyn MemoryController, addr: u32) -> Result<SliceHeader> {
	let bytes = memory::view(ctrl, addr, HEADER_SIZE)?;
	let mut raw = [0u8; HEADER_SIZE as usize];
	raw.copy_from_slice(&bytes);
	Ok(SliceHeader::decode(raw))
}

/// Allocate a header in the guest and store `(ptr, len)` in it.
///
/// Returns the header's address, ready to be passed to a guest entry point
/// that takes a single address.
pub fn write_header(ctrl: &mut dyn MemoryController, ptr: u32, len: u32) -> Result<u32> {
	let addr = ctrl.alloc(HEADER_SIZE)?;
	if let Err(e) = memory::write(ctrl, addr, &SliceHeader::new(ptr, len).encode()) {
		ctrl.free(addr)?;
		return Err(e);
	}
	Ok(addr)
}
