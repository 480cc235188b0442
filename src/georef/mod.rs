//! `GeoMap`: binds an image pixel grid to a geographic region.

pub mod builders;

use serde::{Deserialize, Serialize};

use crate::conv::{Affine2D, Conv, Conversion};
use crate::error::ConversionError;
use crate::geom::{MultiLine, Point};

/// Per-pixel tile metadata carried by tiled web references.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TileInfo {
  pub tile_size: u32,
  pub tile_swapy: bool,
  pub is_tiled: bool,
  pub tile_minz: u8,
  pub tile_maxz: u8,
}

/// A reference binding an image pixel grid to a geographic region via a
/// reference-point set (≥3 pairs, typically 4 corners), a projection
/// descriptor, an optional border, and image/tile metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoMap {
  pub name: String,
  pub comm: String,
  /// Pixel point -> projected-coordinate point pairs (at least 3 define
  /// an affine fit; typically 4 corners).
  pub reference_points: Vec<(Point, Point)>,
  /// Closed multi-line in image-pixel coordinates enclosing the valid area.
  pub border: MultiLine,
  pub proj: String,
  pub image: Option<String>,
  pub image_size: (u32, u32),
  pub image_dpi: f64,
  pub tile: TileInfo,
}

impl Default for GeoMap {
  fn default() -> Self {
    Self {
      name: String::new(),
      comm: String::new(),
      reference_points: Vec::new(),
      border: MultiLine::default(),
      proj: "WGS".into(),
      image: None,
      image_size: (0, 0),
      image_dpi: 300.0,
      tile: TileInfo::default(),
    }
  }
}

impl GeoMap {
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.reference_points.len() < 3
  }

  pub fn add_reference_point(&mut self, pixel: Point, geo: Point) {
    self.reference_points.push((pixel, geo));
  }

  /// Fit the affine map from pixel coordinates to the map's own projected
  /// coordinates (§4.1, `Affine2D::from_point_pairs`), from the stored
  /// reference points.
  pub fn pixel_to_proj(&self) -> Result<Conv, ConversionError> {
    Ok(Conv::affine(Affine2D::from_point_pairs(&self.reference_points)?))
  }

  /// Compose `pixel -> proj -> WGS`.
  pub fn pixel_to_wgs(&self) -> Result<Conv, ConversionError> {
    let pix2proj = self.pixel_to_proj()?;
    let proj2wgs = Conv::proj(&self.proj, "WGS")?;
    Ok(Conv::compose(vec![pix2proj, proj2wgs]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_reference_has_fewer_than_three_points() {
    let map = GeoMap::default();
    assert!(map.is_empty());
  }

  #[test]
  fn pixel_to_proj_fits_four_corners() {
    let mut map = GeoMap::default();
    map.add_reference_point(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
    map.add_reference_point(Point::new(100.0, 0.0), Point::new(20.0, 10.0));
    map.add_reference_point(Point::new(0.0, 100.0), Point::new(10.0, 20.0));
    map.add_reference_point(Point::new(100.0, 100.0), Point::new(20.0, 20.0));
    let conv = map.pixel_to_proj().unwrap();
    let p = conv.frw_pt(Point::new(50.0, 50.0)).unwrap();
    assert_approx_eq::assert_approx_eq!(p.x, 15.0);
    assert_approx_eq::assert_approx_eq!(p.y, 15.0);
  }
}
