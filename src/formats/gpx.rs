//! GPX import, the one format adapter with a real parser body: tracks and
//! waypoints only, names and coordinates preserved, the target VMap2 type
//! fixed by the caller rather than inferred (GPX carries no type
//! information of its own). Built on the `gpx` crate rather than hand
//! rolling XML parsing; every other format module in this crate makes
//! the same call to delegate wire parsing to a dedicated crate once one
//! exists, rather than hand-rolling it.

use std::io::Cursor;

use crate::catalogue::TypeCatalogue;
use crate::error::{Error, FormatError};
use crate::formats::FormatAdapter;
use crate::geom::{Line, MultiLine, Point};
use crate::store::obj::VMap2obj;
use crate::store::VMap2;

/// Which VMap2 type a waypoint / track becomes.
#[derive(Debug, Clone, Copy)]
pub struct GpxAdapter {
  pub waypoint_type: u32,
  pub track_type: u32,
}

impl FormatAdapter for GpxAdapter {
  fn import(&self, source: &str, store: &mut VMap2, _catalogue: &TypeCatalogue) -> Result<(), Error> {
    let parsed = gpx::read(Cursor::new(source)).map_err(|e| FormatError::new("<gpx>", 0, format!("gpx parse error: {e}")))?;

    for wpt in &parsed.waypoints {
      let (lon, lat) = wpt.point().x_y();
      let mut obj = VMap2obj::new(crate::store::obj::class_of(self.waypoint_type), crate::store::obj::tnum_of(self.waypoint_type));
      obj.name = wpt.name.clone().unwrap_or_default();
      obj.coords = MultiLine::single_point(Point::new(lon, lat));
      store.add(obj)?;
    }

    for trk in &parsed.tracks {
      let mut lines = Vec::new();
      for seg in &trk.segments {
        let pts: Vec<Point> = seg.points.iter().map(|p| {
          let (lon, lat) = p.point().x_y();
          Point::new(lon, lat)
        }).collect();
        if !pts.is_empty() {
          lines.push(Line::new(pts));
        }
      }
      if lines.is_empty() {
        continue;
      }
      let mut obj = VMap2obj::new(crate::store::obj::class_of(self.track_type), crate::store::obj::tnum_of(self.track_type));
      obj.name = trk.name.clone().unwrap_or_default();
      obj.coords = MultiLine::new(lines);
      store.add(obj)?;
    }
    Ok(())
  }

  fn export(&self, _store: &VMap2, _catalogue: &TypeCatalogue) -> Result<String, Error> {
    Err(FormatError::new("<gpx>", 0, "GPX export is not part of this contract: §6.1 only requires import").into())
  }
}
