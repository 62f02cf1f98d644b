//! Error taxonomy for the host/guest memory boundary.
//!
//! Every variant describes a protocol or ABI mismatch between host and guest
//! rather than a transient condition, so nothing here is ever retried.

use std::fmt::Display;

use thiserror::Error;

/// A failure raised while crossing the linear-memory boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	/// An address of `0` was dereferenced
	#[error("Attempted to dereference the null address")]
	NullReference,

	/// A read or write would run past the end of linear memory
	#[error("Access of {len} bytes at address {addr} exceeds linear memory of {size} bytes")]
	OutOfBounds {
		addr: u64,
		len: u64,
		size: u64,
	},

	/// The bytes do not form a valid value of the requested shape
	#[error("Failed to decode guest data: {0}")]
	Decode(String),

	/// An address was released after it had already been released
	#[error("Address {0} was released twice")]
	DoubleRelease(u32),

	/// An address was released that the host never received
	#[error("Address {0} is not owned by the host")]
	UnownedRelease(u32),

	/// An address was received from the guest while the host still owned it
	#[error("Address {0} is already owned by the host")]
	AlreadyOwned(u32),

	/// A lease on linear memory was read after a guest call
	#[error("Memory lease from generation {leased} was used at generation {current}")]
	StaleReference {
		leased: u64,
		current: u64,
	},

	/// The guest allocator could not satisfy a request
	#[error("The guest failed to allocate {len} bytes")]
	AllocationFailed {
		len: u32,
	},

	/// A guest entry point trapped or could not be resolved
	#[error("Guest call failed: {0}")]
	Guest(String),

	/// The controller refuses all work after an ownership fault
	#[error("The controller was poisoned by an earlier ownership fault")]
	Poisoned,
}

impl Error {
	/// Whether this error breaks the single-owner rule.
	///
	/// These faults mean the host and guest no longer agree on who owns
	/// which address, and the controller that observed one must stop.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::DoubleRelease(_) | Error::UnownedRelease(_) | Error::AlreadyOwned(_))
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attaches a human readable prefix to an error while converting it into
/// an [`anyhow::Error`].
pub trait PrefixError<T> {
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display;
}

impl<T, E: Display> PrefixError<T> for std::result::Result<T, E> {
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display,
	{
		self.map_err(|e| anyhow::anyhow!("{}: {}", prefix(), e))
	}
}

impl<T> PrefixError<T> for Option<T> {
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display,
	{
		self.ok_or_else(|| anyhow::anyhow!("{}", prefix()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ownership_faults_are_fatal() {
		assert!(Error::DoubleRelease(8).is_fatal());
		assert!(Error::UnownedRelease(8).is_fatal());
		assert!(Error::AlreadyOwned(8).is_fatal());
		assert!(!Error::NullReference.is_fatal());
		assert!(!Error::Decode("bad".into()).is_fatal());
	}

	#[test]
	fn prefix_err_keeps_the_cause() {
		let res: std::result::Result<(), Error> = Err(Error::NullReference);
		let err = res.prefix_err(|| "Failed to read header").unwrap_err();
		assert_eq!(
			err.to_string(),
			"Failed to read header: Attempted to dereference the null address"
		);
		let none: Option<u32> = None;
		let err = none.prefix_err(|| "Guest must export 'memory'").unwrap_err();
		assert_eq!(err.to_string(), "Guest must export 'memory'");
	}
}
