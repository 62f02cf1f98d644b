//! Marshalling of values across the boundary between a host and a
//! WebAssembly guest's linear memory.
//!
//! Every value that crosses the boundary is described by an 8-byte
//! [`SliceHeader`]: a guest address and an element count. Scalars and arrays
//! are packed and unpacked by [`marshal`], arrays of slices by [`nested`], and
//! arrays of fixed-layout records are viewed in place by [`record`].
//!
//! The host side of a guest instance is abstracted by
//! [`MemoryController`], which owns the allocator calls, the live memory, and
//! the [`Ledger`] of addresses the host is responsible for releasing.

pub mod controller;
pub mod element;
pub mod err;
pub mod header;
pub mod marshal;
pub mod memory;
pub mod nested;
pub mod ptr;
pub mod record;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use controller::MemoryController;
pub use element::{Element, ElementKind, Elements};
pub use err::{Error, PrefixError, Result};
pub use header::{HEADER_SIZE, SliceHeader};
pub use memory::Lease;
pub use ptr::{Ledger, NULL, OwnedPtr};
pub use record::{Layout, Product, RecordArray, RecordView};
