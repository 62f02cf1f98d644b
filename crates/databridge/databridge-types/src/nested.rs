//! Collections of slices.
//!
//! # Wire Format
//!
//! An array of strings is a header whose elements are guest words, each of
//! which is the address of a further string header:
//! ```text
//! outer header -> [addr0][addr1]...[addrN-1]
//!                   |      |
//!                   |      +-> [ptr][len] -> UTF-8 bytes
//!                   +-> [ptr][len] -> UTF-8 bytes
//! ```
//! Every inner header is owned by the host once the outer one is read, and is
//! released as soon as it has been decoded. The outer header is released last.

use crate::controller::MemoryController;
use crate::element::{self, Element};
use crate::err::Result;
use crate::header::{read_header, write_header};
use crate::marshal;
use crate::memory::WORD;
use crate::ptr::OwnedPtr;

/// Decode the array of addresses behind `ptr`, resolving every element with
/// `decode`, and release the outer header.
fn read_each<T>(
	ctrl: &mut dyn MemoryController,
	ptr: OwnedPtr,
	mut decode: impl FnMut(&mut dyn MemoryController, OwnedPtr) -> Result<T>,
) -> Result<Vec<T>> {
	let values = (|| -> Result<Vec<T>> {
		// Snapshot the whole pointer array before any inner release runs
		let header = read_header(&*ctrl, ptr.addr())?;
		let addrs: Vec<u32> = element::decode_all(&header.data(&*ctrl, WORD as usize)?)?;
		let mut out = Vec::with_capacity(addrs.len());
		for (i, &addr) in addrs.iter().enumerate() {
			match ctrl.adopt(addr).and_then(|inner| decode(&mut *ctrl, inner)) {
				Ok(value) => out.push(value),
				Err(e) => {
					// Every inner header past the failure is still ours to release
					for &rest in &addrs[i + 1..] {
						let _ = ctrl.adopt(rest).and_then(|inner| ctrl.release(inner));
					}
					return Err(e);
				}
			}
		}
		Ok(out)
	})();
	ctrl.release(ptr)?;
	values
}

/// Unpack an array of strings, preserving order.
pub fn read_str_array(ctrl: &mut dyn MemoryController, ptr: OwnedPtr) -> Result<Vec<String>> {
	read_each(ctrl, ptr, marshal::read_str)
}

/// Unpack an array of `T` slices, preserving order.
pub fn read_nested<T: Element>(
	ctrl: &mut dyn MemoryController,
	ptr: OwnedPtr,
) -> Result<Vec<Vec<T>>> {
	read_each(ctrl, ptr, marshal::read_slice::<T>)
}

/// Pack an array of strings in the same shape the guest produces.
///
/// Returns the address of the outer header.
pub fn write_str_array<S: AsRef<str>>(
	ctrl: &mut dyn MemoryController,
	values: &[S],
) -> Result<u32> {
	let mut addrs = Vec::with_capacity(values.len());
	for value in values {
		let inner = marshal::write_str(ctrl, value.as_ref())?;
		addrs.push(write_header(ctrl, inner.ptr, inner.len)?);
	}
	let outer = marshal::write_slice(ctrl, &addrs)?;
	write_header(ctrl, outer.ptr, outer.len)
}

/// Pack an array of `T` slices in the same shape as [`write_str_array`].
pub fn write_nested<T: Element>(ctrl: &mut dyn MemoryController, values: &[Vec<T>]) -> Result<u32> {
	let mut addrs = Vec::with_capacity(values.len());
	for value in values {
		let inner = marshal::write_slice(ctrl, value)?;
		addrs.push(write_header(ctrl, inner.ptr, inner.len)?);
	}
	let outer = marshal::write_slice(ctrl, &addrs)?;
	write_header(ctrl, outer.ptr, outer.len)
}
