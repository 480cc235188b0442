//! Legacy VMAP text format contract: line-oriented `OBJECT`/`DATA` blocks,
//! grounded on `vmap2io_vmap.cpp`. The core only needs to know the block
//! shape and that object types are the legacy numbering scheme, translated
//! through the [`crate::catalogue::TypeCatalogue`] rather than carried
//! 1:1 into a `VMap2obj::type_`.

/// One `OBJECT ... DATA ... END` block.
#[derive(Debug, Clone, Default)]
pub struct LegacyObject {
  /// Legacy numeric type, pre-translation.
  pub legacy_type: u32,
  pub name: String,
  pub comment: String,
  /// Point list in the legacy file's own coordinate units (degrees).
  pub points: Vec<(f64, f64)>,
}

/// Maps a legacy numeric type to a packed `VMap2obj::type_`, or `None`
/// when the catalogue has no mapping for it (the import should then skip
/// the object, matching MP's `skip_unknown` behavior).
pub type LegacyTypeMap = std::collections::BTreeMap<u32, u32>;
