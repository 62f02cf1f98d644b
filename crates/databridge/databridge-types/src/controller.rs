//! Memory management abstractions for guest linear memory.
//!
//! A [`MemoryController`] is the host's handle on a single guest instance. It
//! forwards allocation requests to the guest's exported allocator, exposes the
//! live linear memory, and tracks which guest addresses the host owns.
//!
//! # Memory Model
//!
//! Linear memory is a contiguous array of bytes that can grow over time. Any
//! guest call (including `allocate` and `deallocate`) may grow it, and growing
//! may move the underlying buffer. The borrow returned by [`MemoryController::mem`]
//! therefore cannot outlive the next call that takes `&mut self`, and every
//! read in this crate re-derives it immediately before use.
//!
//! Each guest call also advances [`MemoryController::generation`], which is
//! what a [`Lease`](crate::memory::Lease) checks to detect stale windows.

use crate::err::Result;
use crate::ptr::{Ledger, OwnedPtr};

/// Host-side handle on a guest's allocator and linear memory.
///
/// # Example
///
/// ```rust,ignore
/// use databridge_types::controller::MemoryController;
///
/// struct MyController {
///     memory: Vec<u8>,
///     ledger: Ledger,
///     generation: u64,
/// }
///
/// impl MemoryController for MyController {
///     fn alloc(&mut self, len: u32) -> Result<u32> {
///         self.generation += 1;
///         // Reserve `len` bytes...
///         Ok(ptr)
///     }
///
///     fn free(&mut self, ptr: u32) -> Result<()> {
///         self.generation += 1;
///         Ok(())
///     }
///
///     fn mem(&self) -> &[u8] {
///         &self.memory
///     }
///
///     fn mut_mem(&mut self) -> &mut [u8] {
///         &mut self.memory
///     }
///
///     fn generation(&self) -> u64 {
///         self.generation
///     }
///
///     fn ledger(&mut self) -> &mut Ledger {
///         &mut self.ledger
///     }
/// }
/// ```
pub trait MemoryController {
	/// Allocate a region of guest linear memory.
	///
	/// Calls the guest's `allocate(byteSize) -> Address` entry point.
	///
	/// # Errors
	///
	/// Returns [`Error::AllocationFailed`](crate::err::Error::AllocationFailed)
	/// if the guest returns the null address, or
	/// [`Error::Guest`](crate::err::Error::Guest) if the call traps.
	fn alloc(&mut self, len: u32) -> Result<u32>;

	/// Hand an address to the guest's `deallocate(addr)` entry point.
	///
	/// This performs no ownership checks. Callers go through
	/// [`release`](Self::release) or [`deallocate`](Self::deallocate).
	fn free(&mut self, ptr: u32) -> Result<()>;

	/// The live linear memory.
	fn mem(&self) -> &[u8];

	/// Mutable access to the live linear memory.
	fn mut_mem(&mut self) -> &mut [u8];

	/// A counter advanced by every call into the guest.
	fn generation(&self) -> u64;

	/// The record of addresses the host currently owns.
	fn ledger(&mut self) -> &mut Ledger;

	/// Take ownership of an address returned by a guest call.
	fn adopt(&mut self, addr: u32) -> Result<OwnedPtr> {
		self.ledger().adopt(addr)
	}

	/// Return an owned address to the guest allocator.
	fn release(&mut self, ptr: OwnedPtr) -> Result<()> {
		self.deallocate(ptr.into_raw())
	}

	/// Return a raw address to the guest allocator.
	///
	/// # Errors
	///
	/// - [`Error::DoubleRelease`](crate::err::Error::DoubleRelease) if the
	///   address has already been released
	/// - [`Error::UnownedRelease`](crate::err::Error::UnownedRelease) if the
	///   host never received it
	fn deallocate(&mut self, addr: u32) -> Result<()> {
		self.ledger().release(addr)?;
		self.free(addr)
	}
}
