//! MP (Polish/cGPSmapper) format contract: `key=value` records with
//! section markers, grounded on `vmap2io_mp.cpp`'s `mp_to_vmap2`/
//! `vmap2_to_mp`. A full adapter would hand `source` to a dedicated MP
//! parser crate and walk the result through [`MpObject`]; this module
//! fixes only the shape that walk produces and consumes.

use crate::store::obj::VMap2objClass;

/// `[IMG ID]` / `[POLYLINE]` / `[POI]` / `[POLYGON]` section kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpSection {
  Img,
  Polyline,
  Poi,
  Polygon,
}

impl MpSection {
  #[must_use]
  pub fn class(self) -> Option<VMap2objClass> {
    match self {
      Self::Polyline => Some(VMap2objClass::Line),
      Self::Poi => Some(VMap2objClass::Point),
      Self::Polygon => Some(VMap2objClass::Polygon),
      Self::Img => None,
    }
  }
}

/// One record between a section header and its matching `[END]`.
#[derive(Debug, Clone, Default)]
pub struct MpObject {
  pub section: Option<MpSection>,
  /// `Type=0x...`, full 16-bit MP type including the data-level nibble.
  pub type_: u32,
  pub label: String,
  pub comment: String,
  /// `Data0`, `Data1`, ... in ascending data-level order; each entry is a
  /// `(lat, lon)` decimal-degree point list for that level.
  pub data_levels: Vec<Vec<(f64, f64)>>,
  pub codepage: Option<String>,
}

/// Which MP data level an export should fill, taken from the catalogue's
/// `mp_start`/`mp_end` per-type range.
#[must_use]
pub fn export_level(mp_start: i32, mp_end: i32) -> std::ops::RangeInclusive<i32> {
  mp_start..=mp_end
}
