use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How the host finds its way around a guest module.
///
/// Every field has a default, so an empty document describes a guest that
/// follows the standard ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
	/// Name of the exported linear memory.
	pub memory: String,
	/// Name of the exported `allocate(byteSize) -> Address` function.
	pub allocate: String,
	/// Name of the exported `deallocate(addr)` function.
	pub deallocate: String,
	/// Optional export run once after instantiation.
	pub init: String,
	/// Upper bound on linear memory, in 64 KiB pages.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_pages: Option<u32>,
	pub functions: FunctionNames,
}

/// Export names of the demo entry points wrapped by [`Guest`](crate::Guest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionNames {
	pub get_str: String,
	pub mod_str: String,
	pub get_strs: String,
	pub get_slice_f32: String,
	pub mod_vec_f32: String,
	pub get_slice_i64: String,
	pub get_items: String,
	pub get_items_binary: String,
	pub resize: String,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			memory: "memory".into(),
			allocate: "allocate".into(),
			deallocate: "deallocate".into(),
			init: "_initialize".into(),
			max_pages: None,
			functions: FunctionNames::default(),
		}
	}
}

impl Default for FunctionNames {
	fn default() -> Self {
		Self {
			get_str: "get_str".into(),
			mod_str: "mod_str".into(),
			get_strs: "get_strs".into(),
			get_slice_f32: "get_slice_f32".into(),
			mod_vec_f32: "mod_vec_f32".into(),
			get_slice_i64: "get_slice_i64".into(),
			get_items: "get_items".into(),
			get_items_binary: "get_items_binary".into(),
			resize: "resize".into(),
		}
	}
}

impl BridgeConfig {
	pub fn parse(s: &str) -> Result<Self> {
		toml::from_str(s).map_err(Into::into)
	}

	pub fn to_string(&self) -> Result<String> {
		toml::to_string(self).map_err(Into::into)
	}

	/// Upper bound on linear memory in bytes, if one is configured.
	pub fn max_memory(&self) -> Option<usize> {
		self.max_pages.map(|pages| pages as usize * 65536)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_uses_the_defaults() {
		assert_eq!(BridgeConfig::parse("").unwrap(), BridgeConfig::default());
	}

	#[test]
	fn fields_can_be_overridden() {
		let config = BridgeConfig::parse(
			r#"
			allocate = "__alloc"
			max_pages = 4

			[functions]
			get_items = "items_repr_c"
			"#,
		)
		.unwrap();
		assert_eq!(config.allocate, "__alloc");
		assert_eq!(config.deallocate, "deallocate");
		assert_eq!(config.max_pages, Some(4));
		assert_eq!(config.max_memory(), Some(4 * 65536));
		assert_eq!(config.functions.get_items, "items_repr_c");
		assert_eq!(config.functions.get_items_binary, "get_items_binary");
	}

	#[test]
	fn serialization_round_trips() {
		let config = BridgeConfig {
			max_pages: Some(16),
			..Default::default()
		};
		let text = config.to_string().unwrap();
		assert_eq!(BridgeConfig::parse(&text).unwrap(), config);
	}

	#[test]
	fn unknown_fields_are_rejected() {
		assert!(BridgeConfig::parse("alocate = \"typo\"").is_err());
	}
}
