//! A wasmtime host for guests that speak the databridge memory protocol.
//!
//! [`Controller`] loads a module and implements
//! [`MemoryController`](databridge_types::MemoryController) against its
//! exported allocator and linear memory. [`Guest`] wraps the demo entry
//! points with typed methods.

pub mod config;
pub mod controller;
pub mod guest;

pub use config::BridgeConfig;
pub use controller::Controller;
pub use guest::{Guest, Resize};
