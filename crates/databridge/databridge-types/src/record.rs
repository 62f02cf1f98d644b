//! Lazy views onto arrays of fixed-layout records.
//!
//! A record array is a [`SliceHeader`](crate::header::SliceHeader) whose
//! length is a record count. The stride is not on the wire; host and guest
//! agree on it through the [`Layout`] of the array. Element `i` starts at
//! `base + i * stride`.
//!
//! # Layouts
//!
//! Both layouts carry the same logical fields, an inventory line item:
//!
//! | field | Boxed | Raw | decode |
//! |---|---|---|---|
//! | lead-in word | - | `[0,4)` | ignored |
//! | text pointer | `[0,4)` | `[4,8)` | u32 LE |
//! | text length | `[4,8)` | `[8,12)` | u32 LE |
//! | alignment | - | `[12,16)` | ignored |
//! | number | `[8,16)` | `[16,24)` | f64 LE |
//! | counter | `[16,20)` | `[24,28)` | u32 LE |
//! | flag | `[20,21)` | `[28,29)` | non-zero is true |
//! | padding | - | `[29,32)` | ignored |
//!
//! so a Boxed record is 21 bytes and a Raw record is 32. Raw is the wasm32
//! C layout of the guest's own struct: the text is a `(capacity, ptr, len)`
//! triple and the number sits on an 8-byte boundary.
//!
//! Views hold only an address. Every field accessor computes its byte range
//! and reads it from the live memory when called, so a view stays correct
//! across guest calls that grow memory.

use std::fmt;
use std::marker::PhantomData;

use crate::controller::MemoryController;
use crate::element::{self, Element};
use crate::err::{Error, Result};
use crate::header::{SliceHeader, read_header, write_header};
use crate::marshal;
use crate::memory;
use crate::ptr::{NULL, OwnedPtr};

/// Byte offsets of the fields of one record layout.
pub trait RecordLayout: fmt::Debug + 'static {
	/// The tag selecting this layout.
	const LAYOUT: Layout;
	/// Offset of the text `(ptr, len)` pair.
	const TEXT: u32;
	/// Offset of the f64 number.
	const NUMBER: u32;
	/// Offset of the u32 counter.
	const COUNTER: u32;
	/// Offset of the flag byte.
	const FLAG: u32;
	/// Distance between consecutive records.
	const STRIDE: u32;
}

/// Text stored as a `(ptr, len)` pair, fields packed with no padding.
#[derive(Debug, Clone, Copy)]
pub struct Boxed;

impl RecordLayout for Boxed {
	const LAYOUT: Layout = Layout::Boxed;
	const TEXT: u32 = 0;
	const NUMBER: u32 = 8;
	const COUNTER: u32 = 16;
	const FLAG: u32 = 20;
	const STRIDE: u32 = 21;
}

/// A 4-byte lead-in before the text pair, the number aligned to 8, and a
/// stride padded by 7 bytes beyond the Boxed stride plus lead-in.
#[derive(Debug, Clone, Copy)]
pub struct Raw;

impl RecordLayout for Raw {
	const LAYOUT: Layout = Layout::Raw;
	const TEXT: u32 = Boxed::TEXT + 4;
	const NUMBER: u32 = 16;
	const COUNTER: u32 = 24;
	const FLAG: u32 = 28;
	const STRIDE: u32 = Boxed::STRIDE + 4 + 7;
}

/// Runtime tag selecting a record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
	Boxed,
	Raw,
}

impl Layout {
	/// The stride of this layout in bytes.
	pub const fn stride(self) -> u32 {
		match self {
			Layout::Boxed => Boxed::STRIDE,
			Layout::Raw => Raw::STRIDE,
		}
	}

	fn view(self, start: u32) -> Box<dyn RecordView> {
		match self {
			Layout::Boxed => Box::new(Record::<Boxed>::new(start)),
			Layout::Raw => Box::new(Record::<Raw>::new(start)),
		}
	}

	fn encode(self, sku: SliceHeader, product: &Product, out: &mut Vec<u8>) {
		match self {
			Layout::Boxed => encode_record::<Boxed>(sku, product, out),
			Layout::Raw => encode_record::<Raw>(sku, product, out),
		}
	}
}

impl fmt::Display for Layout {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Layout::Boxed => f.write_str("boxed"),
			Layout::Raw => f.write_str("raw"),
		}
	}
}

/// An owned copy of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
	pub sku: String,
	pub price: f64,
	pub quantity: u32,
	pub in_stock: bool,
}

impl Product {
	pub fn new(sku: impl Into<String>, price: f64, quantity: u32, in_stock: bool) -> Self {
		Self {
			sku: sku.into(),
			price,
			quantity,
			in_stock,
		}
	}
}

/// Field access to a single record, whatever its layout.
pub trait RecordView: fmt::Debug {
	/// Address of the first byte of the record.
	fn start(&self) -> u32;

	fn layout(&self) -> Layout;

	/// The text field, decoded as strict UTF-8.
	///
	/// The `(ptr, len)` pair is owned by the record, so nothing is released.
	fn text(&self, ctrl: &dyn MemoryController) -> Result<String>;

	fn number(&self, ctrl: &dyn MemoryController) -> Result<f64>;

	fn counter(&self, ctrl: &dyn MemoryController) -> Result<u32>;

	fn flag(&self, ctrl: &dyn MemoryController) -> Result<bool>;

	/// Read every field into an owned [`Product`].
	fn decode(&self, ctrl: &dyn MemoryController) -> Result<Product> {
		Ok(Product {
			sku: self.text(ctrl)?,
			price: self.number(ctrl)?,
			quantity: self.counter(ctrl)?,
			in_stock: self.flag(ctrl)?,
		})
	}
}

/// A record view for layout `L`.
pub struct Record<L> {
	start: u32,
	_layout: PhantomData<L>,
}

impl<L: RecordLayout> Record<L> {
	pub fn new(start: u32) -> Self {
		Self {
			start,
			_layout: PhantomData,
		}
	}

	fn field(&self, offset: u32) -> Result<u32> {
		self.start.checked_add(offset).ok_or(Error::OutOfBounds {
			addr: self.start as u64 + offset as u64,
			len: 0,
			size: u32::MAX as u64,
		})
	}
}

impl<L: RecordLayout> fmt::Debug for Record<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Record").field("layout", &L::LAYOUT).field("start", &self.start).finish()
	}
}

impl<L: RecordLayout> RecordView for Record<L> {
	fn start(&self) -> u32 {
		self.start
	}

	fn layout(&self) -> Layout {
		L::LAYOUT
	}

	fn text(&self, ctrl: &dyn MemoryController) -> Result<String> {
		let header = read_header(ctrl, self.field(L::TEXT)?)?;
		marshal::decode_str(&header.data(ctrl, 1)?)
	}

	fn number(&self, ctrl: &dyn MemoryController) -> Result<f64> {
		let bytes = memory::view(ctrl, self.field(L::NUMBER)?, 8)?;
		Ok(f64::from_wire(&bytes))
	}

	fn counter(&self, ctrl: &dyn MemoryController) -> Result<u32> {
		memory::read_u32(ctrl, self.field(L::COUNTER)?)
	}

	fn flag(&self, ctrl: &dyn MemoryController) -> Result<bool> {
		let bytes = memory::view(ctrl, self.field(L::FLAG)?, 1)?;
		Ok(bytes[0] != 0)
	}
}

fn encode_record<L: RecordLayout>(sku: SliceHeader, product: &Product, out: &mut Vec<u8>) {
	let start = out.len();
	out.resize(start + L::STRIDE as usize, 0);
	let record = &mut out[start..];
	let mut put = |offset: u32, bytes: &[u8]| {
		let offset = offset as usize;
		record[offset..offset + bytes.len()].copy_from_slice(bytes);
	};
	if let Some(lead_in) = L::TEXT.checked_sub(4) {
		// The lead-in word mirrors the text capacity
		put(lead_in, &sku.len.to_le_bytes());
	}
	put(L::TEXT, &sku.encode());
	put(L::NUMBER, &element::encode_all(&[product.price]));
	put(L::COUNTER, &product.quantity.to_le_bytes());
	put(L::FLAG, &[product.in_stock as u8]);
}

/// Resolve record `index` of an array at `base` with the given stride.
///
/// # Errors
///
/// - [`Error::NullReference`] if `base` is null
/// - [`Error::Decode`] if `stride` is smaller than the layout needs
/// - [`Error::OutOfBounds`] if the record does not lie inside linear memory
pub fn record_at(
	ctrl: &dyn MemoryController,
	base: u32,
	stride: u32,
	index: u32,
	layout: Layout,
) -> Result<Box<dyn RecordView>> {
	if base == NULL {
		return Err(Error::NullReference);
	}
	if stride < layout.stride() {
		return Err(Error::Decode(format!(
			"A stride of {stride} bytes cannot hold a {layout} record of {} bytes",
			layout.stride()
		)));
	}
	let start = base as u64 + index as u64 * stride as u64;
	let size = ctrl.mem().len() as u64;
	if start + stride as u64 > size {
		return Err(Error::OutOfBounds {
			addr: start,
			len: stride as u64,
			size,
		});
	}
	Ok(layout.view(start as u32))
}

/// A guest-produced array of records, read lazily.
///
/// The array keeps ownership of the header it was read from until
/// [`release`](RecordArray::release) is called, since the guest frees the
/// records along with their header.
#[derive(Debug)]
#[must_use = "a record array must be released back to the guest"]
pub struct RecordArray {
	header: OwnedPtr,
	base: u32,
	len: u32,
	layout: Layout,
}

impl RecordArray {
	/// Read the record array header at `header`.
	///
	/// On failure the header is released before the error is returned.
	pub fn read(ctrl: &mut dyn MemoryController, header: OwnedPtr, layout: Layout) -> Result<Self> {
		match Self::locate(&*ctrl, &header, layout) {
			Ok(slice) => Ok(Self {
				header,
				base: slice.ptr,
				len: slice.len,
				layout,
			}),
			Err(e) => {
				ctrl.release(header)?;
				Err(e)
			}
		}
	}

	fn locate(ctrl: &dyn MemoryController, header: &OwnedPtr, layout: Layout) -> Result<SliceHeader> {
		let slice = read_header(ctrl, header.addr())?;
		if slice.ptr == NULL {
			return Err(Error::NullReference);
		}
		memory::check(ctrl, slice.ptr, slice.byte_len(layout.stride() as usize)?)?;
		Ok(slice)
	}

	pub fn len(&self) -> u32 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn layout(&self) -> Layout {
		self.layout
	}

	/// Address of the first record.
	pub fn base(&self) -> u32 {
		self.base
	}

	/// A view of record `index`.
	pub fn get(&self, ctrl: &dyn MemoryController, index: u32) -> Result<Box<dyn RecordView>> {
		if index >= self.len {
			let stride = self.layout.stride() as u64;
			return Err(Error::OutOfBounds {
				addr: self.base as u64 + index as u64 * stride,
				len: stride,
				size: self.base as u64 + self.len as u64 * stride,
			});
		}
		record_at(ctrl, self.base, self.layout.stride(), index, self.layout)
	}

	/// Decode every record.
	pub fn products(&self, ctrl: &dyn MemoryController) -> Result<Vec<Product>> {
		(0..self.len).map(|i| self.get(ctrl, i)?.decode(ctrl)).collect()
	}

	/// Hand the array back to the guest.
	pub fn release(self, ctrl: &mut dyn MemoryController) -> Result<()> {
		ctrl.release(self.header)
	}
}

/// Pack `products` as a record array in the given layout.
///
/// Each text field is packed into its own allocation first. Returns the
/// address of the array header.
pub fn write_records(
	ctrl: &mut dyn MemoryController,
	products: &[Product],
	layout: Layout,
) -> Result<u32> {
	let mut bytes = Vec::with_capacity(products.len() * layout.stride() as usize);
	for product in products {
		let sku = marshal::write_str(ctrl, &product.sku)?;
		layout.encode(sku, product, &mut bytes);
	}
	let array = marshal::write_bytes(ctrl, &bytes)?;
	write_header(ctrl, array.ptr, products.len() as u32)
}
