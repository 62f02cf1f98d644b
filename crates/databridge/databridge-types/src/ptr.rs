//! Addresses into guest linear memory and the host's ownership of them.
//!
//! # Ownership
//!
//! Every address handed from the guest to the host across a call boundary is
//! owned by the host from that moment on, until it is released exactly once.
//! The compiler enforces this for [`OwnedPtr`], which is move-only. The
//! [`Ledger`] enforces it at runtime for raw addresses, so a second release or
//! a release of an address the host never received is reported instead of
//! being forwarded to the guest allocator.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::num::NonZeroU32;

use crate::err::{Error, Result};

/// The reserved null address.
pub const NULL: u32 = 0;

/// A guest address the host currently owns.
///
/// An `OwnedPtr` is obtained by adopting an address returned from a guest
/// call, and can only be handed back to the guest by moving it into
/// [`MemoryController::release`](crate::controller::MemoryController::release).
/// It is neither `Clone` nor `Copy`, so a given pointer can be released at
/// most once.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "an owned pointer must be released back to the guest"]
pub struct OwnedPtr(NonZeroU32);

impl OwnedPtr {
	/// The raw address, for reading through it.
	pub fn addr(&self) -> u32 {
		self.0.get()
	}

	pub(crate) fn into_raw(self) -> u32 {
		self.0.get()
	}
}

impl fmt::Display for OwnedPtr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#010x}", self.0.get())
	}
}

/// How many released addresses a [`Ledger`] remembers by default.
pub const RELEASE_WINDOW: usize = 4096;

/// Runtime record of the addresses the host currently owns.
///
/// Released addresses are remembered for the most recent `window` releases,
/// so that a second release is reported as [`Error::DoubleRelease`]. Past the
/// window it is reported as [`Error::UnownedRelease`], which is equally fatal.
#[derive(Debug)]
pub struct Ledger {
	owned: HashSet<u32>,
	released: HashSet<u32>,
	order: VecDeque<u32>,
	window: usize,
}

impl Default for Ledger {
	fn default() -> Self {
		Self::with_window(RELEASE_WINDOW)
	}
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	/// A ledger remembering at most `window` released addresses.
	pub fn with_window(window: usize) -> Self {
		Self {
			owned: HashSet::new(),
			released: HashSet::new(),
			order: VecDeque::new(),
			window: window.max(1),
		}
	}

	/// Take ownership of an address returned by the guest.
	pub fn adopt(&mut self, addr: u32) -> Result<OwnedPtr> {
		let ptr = NonZeroU32::new(addr).ok_or(Error::NullReference)?;
		if !self.owned.insert(addr) {
			return Err(Error::AlreadyOwned(addr));
		}
		// The guest allocator is free to hand out a released address again
		if self.released.remove(&addr) {
			self.order.retain(|&a| a != addr);
		}
		Ok(OwnedPtr(ptr))
	}

	/// Give up ownership of an address before it goes back to the guest.
	pub fn release(&mut self, addr: u32) -> Result<()> {
		if self.owned.remove(&addr) {
			if self.released.insert(addr) {
				self.order.push_back(addr);
			}
			while self.order.len() > self.window {
				if let Some(old) = self.order.pop_front() {
					self.released.remove(&old);
				}
			}
			return Ok(());
		}
		if self.released.contains(&addr) {
			Err(Error::DoubleRelease(addr))
		} else {
			Err(Error::UnownedRelease(addr))
		}
	}

	pub fn is_owned(&self, addr: u32) -> bool {
		self.owned.contains(&addr)
	}

	/// Number of addresses adopted but not yet released.
	pub fn outstanding(&self) -> usize {
		self.owned.len()
	}

	/// Number of released addresses still remembered.
	pub fn remembered(&self) -> usize {
		self.released.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn adopt_then_release() {
		let mut ledger = Ledger::new();
		let ptr = ledger.adopt(64).unwrap();
		assert_eq!(ptr.addr(), 64);
		assert!(ledger.is_owned(64));
		assert_eq!(ledger.outstanding(), 1);
		ledger.release(ptr.into_raw()).unwrap();
		assert!(!ledger.is_owned(64));
		assert_eq!(ledger.outstanding(), 0);
	}

	#[test]
	fn null_cannot_be_adopted() {
		let mut ledger = Ledger::new();
		assert_eq!(ledger.adopt(NULL), Err(Error::NullReference));
	}

	#[test]
	fn adopting_twice_is_rejected() {
		let mut ledger = Ledger::new();
		let _ptr = ledger.adopt(16).unwrap();
		assert_eq!(ledger.adopt(16), Err(Error::AlreadyOwned(16)));
	}

	#[test]
	fn second_release_is_a_double_release() {
		let mut ledger = Ledger::new();
		let ptr = ledger.adopt(16).unwrap();
		ledger.release(ptr.into_raw()).unwrap();
		assert_eq!(ledger.release(16), Err(Error::DoubleRelease(16)));
	}

	#[test]
	fn unknown_release_is_unowned() {
		let mut ledger = Ledger::new();
		assert_eq!(ledger.release(24), Err(Error::UnownedRelease(24)));
	}

	#[test]
	fn reused_addresses_can_be_adopted_again() {
		let mut ledger = Ledger::new();
		let ptr = ledger.adopt(32).unwrap();
		ledger.release(ptr.into_raw()).unwrap();
		let ptr = ledger.adopt(32).unwrap();
		ledger.release(ptr.into_raw()).unwrap();
		assert_eq!(ledger.release(32), Err(Error::DoubleRelease(32)));
	}

	#[test]
	fn released_addresses_are_forgotten_past_the_window() {
		let mut ledger = Ledger::with_window(2);
		for addr in [8, 16, 24] {
			let ptr = ledger.adopt(addr).unwrap();
			ledger.release(ptr.into_raw()).unwrap();
		}
		assert_eq!(ledger.remembered(), 2);
		assert_eq!(ledger.release(8), Err(Error::UnownedRelease(8)));
		assert_eq!(ledger.release(16), Err(Error::DoubleRelease(16)));
		assert_eq!(ledger.release(24), Err(Error::DoubleRelease(24)));
	}

	#[test]
	fn readopting_forgets_the_release() {
		let mut ledger = Ledger::with_window(2);
		let ptr = ledger.adopt(8).unwrap();
		ledger.release(ptr.into_raw()).unwrap();
		let _ptr = ledger.adopt(8).unwrap();
		assert_eq!(ledger.remembered(), 0);
	}

	#[test]
	fn display_is_hex() {
		let mut ledger = Ledger::new();
		let ptr = ledger.adopt(0x40).unwrap();
		assert_eq!(ptr.to_string(), "0x00000040");
	}
}
