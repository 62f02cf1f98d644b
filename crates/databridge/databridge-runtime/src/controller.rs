use databridge_types::controller::MemoryController;
use databridge_types::err::{Error, PrefixError, Result};
use databridge_types::ptr::{Ledger, OwnedPtr};
use tracing::{debug, instrument, trace, warn};
use wasmtime::*;

use crate::config::BridgeConfig;

const TARGET: &str = "databridge::runtime";

pub struct StoreData {
	pub limits: StoreLimits,
}

/// A single instantiated guest module.
///
/// The controller is the only path into the guest. Every call goes through
/// [`Controller::call`], which advances the generation, and every address the
/// guest hands back is adopted into the controller's [`Ledger`]. After an
/// ownership fault the controller is poisoned and refuses further calls.
pub struct Controller {
	store: Store<StoreData>,
	instance: Instance,
	memory: Memory,
	config: BridgeConfig,
	ledger: Ledger,
	generation: u64,
	poisoned: bool,
}

impl Controller {
	/// Compile and instantiate a guest module.
	///
	/// `wasm` may be a binary module or anything else wasmtime accepts. The
	/// module must export the configured memory, `allocate` and `deallocate`.
	pub fn new(wasm: &[u8], config: BridgeConfig) -> anyhow::Result<Self> {
		let engine = Engine::default();
		let module =
			Module::new(&engine, wasm).prefix_err(|| "Failed to construct module from bytes")?;
		let linker: Linker<StoreData> = Linker::new(&engine);

		let mut limits = StoreLimitsBuilder::new();
		if let Some(max) = config.max_memory() {
			limits = limits.memory_size(max);
		}
		let mut store = Store::new(
			&engine,
			StoreData {
				limits: limits.build(),
			},
		);
		store.limiter(|data| &mut data.limits);

		let instance = linker
			.instantiate(&mut store, &module)
			.prefix_err(|| "Failed to instantiate WASM module")?;
		let memory = instance
			.get_memory(&mut store, &config.memory)
			.prefix_err(|| format!("WASM module must export memory '{}'", config.memory))?;
		instance
			.get_typed_func::<(u32,), u32>(&mut store, &config.allocate)
			.prefix_err(|| format!("WASM module must export '{}(u32) -> u32'", config.allocate))?;
		instance
			.get_typed_func::<(u32,), ()>(&mut store, &config.deallocate)
			.prefix_err(|| format!("WASM module must export '{}(u32)'", config.deallocate))?;

		debug!(
			target: TARGET,
			pages = memory.size(&store),
			limit = ?config.max_pages,
			"Instantiated guest module"
		);

		let mut controller = Self {
			store,
			instance,
			memory,
			config,
			ledger: Ledger::new(),
			generation: 0,
			poisoned: false,
		};
		controller.init().prefix_err(|| "Failed to initialise guest")?;
		Ok(controller)
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.config
	}

	/// Whether an ownership fault has shut this controller down.
	pub fn is_poisoned(&self) -> bool {
		self.poisoned
	}

	/// Current size of linear memory in pages.
	pub fn pages(&self) -> u64 {
		self.memory.size(&self.store)
	}

	/// Run the configured init export, if the guest has one.
	fn init(&mut self) -> Result<()> {
		let name = self.config.init.clone();
		if self.instance.get_export(&mut self.store, &name).is_none() {
			return Ok(());
		}
		self.call::<(), ()>(&name, ())
	}

	/// Names of every function the guest exports.
	pub fn functions(&mut self) -> Vec<String> {
		let names: Vec<String> =
			self.instance.exports(&mut self.store).map(|export| export.name().to_string()).collect();
		let mut functions = Vec::new();
		for name in names {
			if let Some(export) = self.instance.get_export(&mut self.store, &name) {
				if let ExternType::Func(_) = export.ty(&self.store) {
					functions.push(name);
				}
			}
		}
		functions
	}

	fn guard(&self) -> Result<()> {
		if self.poisoned {
			return Err(Error::Poisoned);
		}
		Ok(())
	}

	/// Poison the controller if `result` is an ownership fault.
	fn fault<T>(&mut self, result: Result<T>) -> Result<T> {
		if let Err(e) = &result {
			if e.is_fatal() {
				warn!(target: TARGET, error = %e, "Ownership fault, refusing further guest calls");
				self.poisoned = true;
			}
		}
		result
	}

	/// Call a guest export.
	///
	/// Any buffer borrowed from [`mem`](MemoryController::mem) before this
	/// call must be considered invalid afterwards.
	#[instrument(level = "trace", target = "databridge::runtime", skip(self, params))]
	pub fn call<P, R>(&mut self, name: &str, params: P) -> Result<R>
	where
		P: WasmParams,
		R: WasmResults,
	{
		self.guard()?;
		let func = self
			.instance
			.get_typed_func::<P, R>(&mut self.store, name)
			.map_err(|e| Error::Guest(format!("Export '{name}' is unavailable: {e:#}")))?;
		let before = self.memory.data_size(&self.store);
		self.generation += 1;
		let result = func
			.call(&mut self.store, params)
			.map_err(|e| Error::Guest(format!("Call to '{name}' failed: {e:#}")));
		let after = self.memory.data_size(&self.store);
		if after != before {
			debug!(target: TARGET, name, before, after, "Guest memory grew");
		}
		result
	}

	/// Call a guest export that returns an address, and adopt it.
	pub fn call_ptr<P>(&mut self, name: &str, params: P) -> Result<OwnedPtr>
	where
		P: WasmParams,
	{
		let addr = self.call::<P, u32>(name, params)?;
		self.adopt(addr)
	}
}

impl MemoryController for Controller {
	fn alloc(&mut self, len: u32) -> Result<u32> {
		let name = self.config.allocate.clone();
		let ptr = self.call::<(u32,), u32>(&name, (len,))?;
		if ptr == 0 {
			return Err(Error::AllocationFailed {
				len,
			});
		}
		trace!(target: TARGET, ptr, len, "Allocated guest memory");
		Ok(ptr)
	}

	fn free(&mut self, ptr: u32) -> Result<()> {
		let name = self.config.deallocate.clone();
		self.call::<(u32,), ()>(&name, (ptr,))?;
		trace!(target: TARGET, ptr, "Released guest memory");
		Ok(())
	}

	fn mem(&self) -> &[u8] {
		self.memory.data(&self.store)
	}

	fn mut_mem(&mut self) -> &mut [u8] {
		self.memory.data_mut(&mut self.store)
	}

	fn generation(&self) -> u64 {
		self.generation
	}

	fn ledger(&mut self) -> &mut Ledger {
		&mut self.ledger
	}

	fn adopt(&mut self, addr: u32) -> Result<OwnedPtr> {
		self.guard()?;
		let result = self.ledger.adopt(addr);
		self.fault(result)
	}

	fn deallocate(&mut self, addr: u32) -> Result<()> {
		self.guard()?;
		let result = self.ledger.release(addr);
		self.fault(result)?;
		self.free(addr)
	}
}
