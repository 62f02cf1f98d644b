use databridge_types::err::Result;
use databridge_types::marshal::{read_slice, read_str, write_bytes, write_slice, write_str};
use databridge_types::nested::read_str_array;
use databridge_types::record::{Layout, Product, RecordArray};

use crate::config::{BridgeConfig, FunctionNames};
use crate::controller::Controller;

/// Dimensions for a call to the guest's image resize entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
	pub src_width: u32,
	pub src_height: u32,
	pub dst_width: u32,
	pub dst_height: u32,
	pub radius: u32,
}

/// Typed wrappers over the demo guest's entry points.
///
/// Every method copies its inputs into guest memory, makes exactly one
/// domain call, and fully decodes the result before returning, so no value
/// handed back borrows guest memory.
pub struct Guest {
	ctrl: Controller,
	names: FunctionNames,
}

impl Guest {
	pub fn new(wasm: &[u8], config: BridgeConfig) -> anyhow::Result<Self> {
		let names = config.functions.clone();
		Ok(Self {
			ctrl: Controller::new(wasm, config)?,
			names,
		})
	}

	pub fn controller(&self) -> &Controller {
		&self.ctrl
	}

	pub fn controller_mut(&mut self) -> &mut Controller {
		&mut self.ctrl
	}

	pub fn get_str(&mut self) -> Result<String> {
		let ptr = self.ctrl.call_ptr(&self.names.get_str, ())?;
		read_str(&mut self.ctrl, ptr)
	}

	/// Pass `value` to the guest and read back its modified copy.
	///
	/// The guest owns the packed input once the call is made.
	pub fn mod_str(&mut self, value: &str) -> Result<String> {
		let input = write_str(&mut self.ctrl, value)?;
		let ptr = self.ctrl.call_ptr(&self.names.mod_str, (input.ptr, input.len))?;
		read_str(&mut self.ctrl, ptr)
	}

	pub fn get_strs(&mut self) -> Result<Vec<String>> {
		let ptr = self.ctrl.call_ptr(&self.names.get_strs, ())?;
		read_str_array(&mut self.ctrl, ptr)
	}

	pub fn get_slice_f32(&mut self) -> Result<Vec<f32>> {
		let ptr = self.ctrl.call_ptr(&self.names.get_slice_f32, ())?;
		read_slice(&mut self.ctrl, ptr)
	}

	pub fn mod_vec_f32(&mut self, values: &[f32]) -> Result<Vec<f32>> {
		let input = write_slice(&mut self.ctrl, values)?;
		let ptr = self.ctrl.call_ptr(&self.names.mod_vec_f32, (input.ptr, input.len))?;
		read_slice(&mut self.ctrl, ptr)
	}

	pub fn get_slice_i64(&mut self) -> Result<Vec<i64>> {
		let ptr = self.ctrl.call_ptr(&self.names.get_slice_i64, ())?;
		read_slice(&mut self.ctrl, ptr)
	}

	/// Fetch the guest's inventory as a lazily read record array.
	///
	/// The caller is responsible for [`RecordArray::release`].
	pub fn items(&mut self, layout: Layout) -> Result<RecordArray> {
		let name = match layout {
			Layout::Raw => &self.names.get_items,
			Layout::Boxed => &self.names.get_items_binary,
		};
		let ptr = self.ctrl.call_ptr(name, ())?;
		RecordArray::read(&mut self.ctrl, ptr, layout)
	}

	/// Fetch and decode the guest's inventory, releasing the array.
	pub fn products(&mut self, layout: Layout) -> Result<Vec<Product>> {
		let items = self.items(layout)?;
		let products = items.products(&self.ctrl);
		items.release(&mut self.ctrl)?;
		products
	}

	/// Resize an image through the guest.
	pub fn resize(&mut self, pixels: &[u8], dims: Resize) -> Result<Vec<u8>> {
		let input = write_bytes(&mut self.ctrl, pixels)?;
		let ptr = self.ctrl.call_ptr(
			&self.names.resize,
			(
				input.ptr,
				input.len,
				dims.src_width,
				dims.src_height,
				dims.dst_width,
				dims.dst_height,
				dims.radius,
			),
		)?;
		read_slice(&mut self.ctrl, ptr)
	}
}
