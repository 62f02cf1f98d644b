//! An in-process guest for exercising the protocol without a wasm engine.
//!
//! `MockGuest` behaves like a guest module compiled with a bump allocator:
//! linear memory starts at one page, grows a page at a time when an
//! allocation does not fit, and every allocator call counts as a guest call.
//! Growing reallocates the backing vector, so buffers borrowed before a call
//! really are detached afterwards.

use std::collections::BTreeMap;

use crate::controller::MemoryController;
use crate::err::{Error, Result};
use crate::ptr::Ledger;

/// Size of a wasm page.
pub const PAGE: usize = 65536;

/// Allocation alignment, large enough for any supported element kind.
const ALIGN: u32 = 8;

#[derive(Debug)]
pub struct MockGuest {
	memory: Vec<u8>,
	top: u32,
	max_pages: usize,
	live: BTreeMap<u32, u32>,
	ledger: Ledger,
	generation: u64,
	allocs: usize,
	frees: usize,
}

impl Default for MockGuest {
	fn default() -> Self {
		Self::new()
	}
}

impl MockGuest {
	pub fn new() -> Self {
		Self::with_max_pages(usize::from(u16::MAX))
	}

	pub fn with_max_pages(max_pages: usize) -> Self {
		Self {
			memory: vec![0; PAGE],
			// Keep the first word unused so no allocation is ever null
			top: ALIGN,
			max_pages,
			live: BTreeMap::new(),
			ledger: Ledger::new(),
			generation: 0,
			allocs: 0,
			frees: 0,
		}
	}

	/// Grow linear memory by `pages`, as `memory.grow` would.
	pub fn grow(&mut self, pages: usize) -> Result<()> {
		self.generation += 1;
		let current = self.memory.len() / PAGE;
		if current + pages > self.max_pages {
			return Err(Error::Guest(format!(
				"memory.grow of {pages} pages exceeds the limit of {} pages",
				self.max_pages
			)));
		}
		// Move to a fresh buffer so stale borrows would observe a detached region
		let mut memory = vec![0; (current + pages) * PAGE];
		memory[..self.memory.len()].copy_from_slice(&self.memory);
		self.memory = memory;
		Ok(())
	}

	/// Simulate a guest entry point that does not touch the allocator.
	pub fn call(&mut self) {
		self.generation += 1;
	}

	/// Number of `allocate` calls served.
	pub fn allocs(&self) -> usize {
		self.allocs
	}

	/// Number of `deallocate` calls served.
	pub fn frees(&self) -> usize {
		self.frees
	}

	/// Number of allocations not yet freed.
	pub fn live(&self) -> usize {
		self.live.len()
	}

	/// Size of the live allocation at `ptr`.
	pub fn allocation(&self, ptr: u32) -> Option<u32> {
		self.live.get(&ptr).copied()
	}

	/// Number of addresses the host has adopted but not released.
	pub fn outstanding(&self) -> usize {
		self.ledger.outstanding()
	}
}

impl MemoryController for MockGuest {
	fn alloc(&mut self, len: u32) -> Result<u32> {
		self.generation += 1;
		let ptr = self.top.next_multiple_of(ALIGN);
		let end = ptr as usize + len as usize;
		if end > self.memory.len() {
			let pages = (end - self.memory.len()).div_ceil(PAGE);
			self.grow(pages).map_err(|_| Error::AllocationFailed {
				len,
			})?;
		}
		self.top = end as u32;
		self.live.insert(ptr, len);
		self.allocs += 1;
		Ok(ptr)
	}

	fn free(&mut self, ptr: u32) -> Result<()> {
		self.generation += 1;
		if self.live.remove(&ptr).is_none() {
			return Err(Error::Guest(format!("deallocate of unknown address {ptr}")));
		}
		self.frees += 1;
		Ok(())
	}

	fn mem(&self) -> &[u8] {
		&self.memory
	}

	fn mut_mem(&mut self) -> &mut [u8] {
		&mut self.memory
	}

	fn generation(&self) -> u64 {
		self.generation
	}

	fn ledger(&mut self) -> &mut Ledger {
		&mut self.ledger
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocations_are_aligned_and_non_null() {
		let mut guest = MockGuest::new();
		let a = guest.alloc(3).unwrap();
		let b = guest.alloc(5).unwrap();
		assert_ne!(a, 0);
		assert_eq!(a % ALIGN, 0);
		assert_eq!(b % ALIGN, 0);
		assert!(b >= a + 3);
		assert_eq!(guest.allocs(), 2);
	}

	#[test]
	fn large_allocations_grow_memory() {
		let mut guest = MockGuest::new();
		let ptr = guest.alloc(PAGE as u32 * 2).unwrap();
		assert_eq!(guest.mem().len(), PAGE * 3);
		assert!(ptr as usize + PAGE * 2 <= guest.mem().len());
	}

	#[test]
	fn growth_beyond_the_limit_fails_allocation() {
		let mut guest = MockGuest::with_max_pages(1);
		assert_eq!(
			guest.alloc(PAGE as u32),
			Err(Error::AllocationFailed {
				len: PAGE as u32,
			})
		);
	}

	#[test]
	fn free_of_unknown_address_is_a_guest_error() {
		let mut guest = MockGuest::new();
		assert!(matches!(guest.free(64), Err(Error::Guest(_))));
	}

	#[test]
	fn every_call_advances_the_generation() {
		let mut guest = MockGuest::new();
		let start = guest.generation();
		let ptr = guest.alloc(1).unwrap();
		guest.free(ptr).unwrap();
		guest.call();
		assert_eq!(guest.generation(), start + 3);
	}
}
