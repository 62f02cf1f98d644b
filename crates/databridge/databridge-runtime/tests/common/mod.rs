use databridge_runtime::{BridgeConfig, Controller, Guest};

pub fn wasm() -> Vec<u8> {
	wat::parse_str(include_str!("../fixtures/bridge.wat")).unwrap()
}

#[allow(dead_code)]
pub fn guest() -> Guest {
	Guest::new(&wasm(), BridgeConfig::default()).unwrap()
}

/// How many times the guest's `deallocate` has run.
pub fn frees(ctrl: &mut Controller) -> u32 {
	ctrl.call::<(), u32>("frees", ()).unwrap()
}
