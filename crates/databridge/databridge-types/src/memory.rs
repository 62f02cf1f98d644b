//! Raw access to guest linear memory.
//!
//! Reads always copy the requested bytes out of the live buffer. The returned
//! [`Bytes`] stays valid after the guest grows or moves its memory.

use std::ops::Range;

use bytes::Bytes;

use crate::controller::MemoryController;
use crate::err::{Error, Result};
use crate::ptr::NULL;

/// Width of a guest machine word.
pub const WORD: u32 = 4;

/// Resolve `addr..addr + len` against the current memory size.
fn span(mem: &[u8], addr: u32, len: u32) -> Result<Range<usize>> {
	if addr == NULL {
		return Err(Error::NullReference);
	}
	let end = addr as u64 + len as u64;
	if end > mem.len() as u64 {
		return Err(Error::OutOfBounds {
			addr: addr as u64,
			len: len as u64,
			size: mem.len() as u64,
		});
	}
	Ok(addr as usize..end as usize)
}

/// Check that `addr..addr + len` lies inside linear memory without reading it.
pub fn check(ctrl: &dyn MemoryController, addr: u32, len: u32) -> Result<()> {
	span(ctrl.mem(), addr, len).map(|_| ())
}

/// Snapshot `len` bytes starting at `addr`.
pub fn view(ctrl: &dyn MemoryController, addr: u32, len: u32) -> Result<Bytes> {
	let mem = ctrl.mem();
	let range = span(mem, addr, len)?;
	Ok(Bytes::copy_from_slice(&mem[range]))
}

/// Write `bytes` into linear memory at `addr`.
pub fn write(ctrl: &mut dyn MemoryController, addr: u32, bytes: &[u8]) -> Result<()> {
	let len = u32::try_from(bytes.len()).map_err(|_| Error::OutOfBounds {
		addr: addr as u64,
		len: bytes.len() as u64,
		size: ctrl.mem().len() as u64,
	})?;
	let mem = ctrl.mut_mem();
	let range = span(mem, addr, len)?;
	mem[range].copy_from_slice(bytes);
	Ok(())
}

/// Read a little-endian guest word at `addr`.
pub fn read_u32(ctrl: &dyn MemoryController, addr: u32) -> Result<u32> {
	let mem = ctrl.mem();
	let range = span(mem, addr, WORD)?;
	let mut word = [0u8; WORD as usize];
	word.copy_from_slice(&mem[range]);
	Ok(u32::from_le_bytes(word))
}

/// A remembered window onto linear memory.
///
/// A lease is tied to the controller generation it was taken at. Once any
/// guest call has happened the window may point into a detached buffer, and
/// reading it fails with [`Error::StaleReference`] until it is renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
	addr: u32,
	len: u32,
	generation: u64,
}

impl Lease {
	pub fn new(ctrl: &dyn MemoryController, addr: u32, len: u32) -> Result<Self> {
		check(ctrl, addr, len)?;
		Ok(Self {
			addr,
			len,
			generation: ctrl.generation(),
		})
	}

	pub fn addr(&self) -> u32 {
		self.addr
	}

	pub fn len(&self) -> u32 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn is_stale(&self, ctrl: &dyn MemoryController) -> bool {
		self.generation != ctrl.generation()
	}

	/// Snapshot the leased bytes.
	pub fn read(&self, ctrl: &dyn MemoryController) -> Result<Bytes> {
		let current = ctrl.generation();
		if self.generation != current {
			return Err(Error::StaleReference {
				leased: self.generation,
				current,
			});
		}
		view(ctrl, self.addr, self.len)
	}

	/// Re-derive the lease against the live buffer.
	pub fn renew(self, ctrl: &dyn MemoryController) -> Result<Self> {
		Self::new(ctrl, self.addr, self.len)
	}
}
