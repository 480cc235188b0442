//! Interface-only contracts (§6.1) for the file formats VMap2 objects can
//! be read from or written to. None of these parse a real file end to
//! end; each module states the record shapes a full adapter would need
//! and leaves the wire-level parsing to a dedicated crate (`gpx` for
//! tracks, `quick-xml`/`roxmltree` for OSM), keeping each per-format
//! module thin.

use crate::catalogue::TypeCatalogue;
use crate::error::Error;
use crate::store::obj::VMap2obj;
use crate::store::VMap2;

pub mod fig;
pub mod geopackage;
pub mod gpx;
pub mod mp;
pub mod osm;
pub mod vmap_legacy;

/// A format capable of exchanging objects with a [`VMap2`] store, grounded
/// on `vmap2io_mp.cpp`/`vmap2io_fig.cpp`/etc.'s `*_to_vmap2`/`vmap2_to_*`
/// function pairs.
pub trait FormatAdapter {
  /// Reads every record of the source into `store`, looking up display
  /// hints (label type, mp export levels, ...) in `catalogue`.
  fn import(&self, source: &str, store: &mut VMap2, catalogue: &TypeCatalogue) -> Result<(), Error>;

  /// Serializes every matching object of `store` to this format.
  fn export(&self, store: &VMap2, catalogue: &TypeCatalogue) -> Result<String, Error>;
}

/// One coordinate pair as a format's wire representation sees it:
/// `(lat, lon)` decimal degrees for MP, plain `(lon, lat)` for everything
/// else that speaks WGS84 natively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
  pub lat: f64,
  pub lon: f64,
}

/// A staged object, already classified but not yet inserted: the shape
/// every adapter's import path converges on before handing off to
/// [`VMap2::add`].
#[derive(Debug, Clone)]
pub struct StagedObject {
  pub obj: VMap2obj,
  /// Raw, not-yet-validated tag list (`Tags=...` in MP, OSM `<tag>`
  /// elements, ...), kept separate from `obj.tags` until the catalogue
  /// confirms the type exists.
  pub raw_tags: Vec<String>,
}
