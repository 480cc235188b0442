//! Reference builders: produce a [`GeoMap`] from a sheet name, a tile
//! range, or an explicit projection, instead of requiring callers to fit
//! reference points by hand.

use super::GeoMap;
use crate::conv::proj::{su_zone_from_lon, web_mercator_forward};
use crate::conv::{Affine2D, Conv, Conversion, DEFAULT_ACCURACY};
use crate::error::{Error, GeorefError};
use crate::geom::{Line, MultiLine, Point, Rect};

/// Pixel margins added around the fitted image, e.g. from `--margins` or
/// the per-side overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct Margins {
  pub top: i64,
  pub left: i64,
  pub right: i64,
  pub bottom: i64,
}

fn bad_name(name: &str, reason: impl Into<String>) -> Error {
  GeorefError::BadNomenclature { name: name.to_string(), reason: reason.into() }.into()
}

fn shift_flip(pts: &[Point], dx: f64, dy: f64, height: f64) -> Vec<Point> {
  pts.iter().map(|p| Point::new(p.x - dx, height - (p.y - dy))).collect()
}

/// Parses a Soviet topographic sheet name (e.g. `n37` or `n37-001`) into
/// its WGS84 lon/lat rectangle and nominal scale denominator. Supports the
/// 1:1,000,000 base grid (22 latitude bands `A`..`V` of 4 deg, 60
/// longitude columns of 6 deg) and its 1:100,000 subdivision (12x12 cells
/// numbered 1..144, row-major from the sheet's north-west corner).
pub(crate) fn nom_to_range_su(name: &str) -> Result<(Rect, f64), Error> {
  let lower = name.trim().to_lowercase();
  let mut chars = lower.chars();
  let letter = chars.next().ok_or_else(|| bad_name(name, "empty name"))?;
  if !letter.is_ascii_alphabetic() {
    return Err(bad_name(name, "row letter A..V expected"));
  }
  let row = i64::from(letter as u32 - 'a' as u32);
  if !(0..22).contains(&row) {
    return Err(bad_name(name, "row letter out of range A..V"));
  }
  let rest: String = chars.collect();
  let (col_str, sub_str) = match rest.split_once('-') {
    Some((c, s)) => (c, Some(s)),
    None => (rest.as_str(), None),
  };
  let col: i64 = col_str.parse().map_err(|_| bad_name(name, "column number expected"))?;
  if !(1..=60).contains(&col) {
    return Err(bad_name(name, "column out of range 1..60"));
  }
  let lat_min = row as f64 * 4.0;
  let lon_min = (col - 1) as f64 * 6.0 - 180.0;
  let mut rect = Rect::new(lon_min, lat_min, lon_min + 6.0, lat_min + 4.0);
  let mut scale = 1_000_000.0;

  if let Some(sub_str) = sub_str {
    let sub: i64 = sub_str.parse().map_err(|_| bad_name(name, "1:100,000 cell number expected"))?;
    if !(1..=144).contains(&sub) {
      return Err(bad_name(name, "1:100,000 cell number out of range 1..144"));
    }
    let cell_w = 6.0 / 12.0;
    let cell_h = 4.0 / 12.0;
    let row_sub = (sub - 1) / 12;
    let col_sub = (sub - 1) % 12;
    let cell_lon_min = rect.x1 + col_sub as f64 * cell_w;
    let cell_lat_max = rect.y2 - row_sub as f64 * cell_h;
    rect = Rect::new(cell_lon_min, cell_lat_max - cell_h, cell_lon_min + cell_w, cell_lat_max);
    scale = 100_000.0;
  }
  Ok((rect, scale))
}

/// Soviet ("SU") standard map sheet, e.g. `n37-001`.
pub fn from_nomenclature_su(name: &str, dpi: f64, mag: f64, north: bool, margins: Margins) -> Result<GeoMap, Error> {
  let (range_ll, scale_denom) = nom_to_range_su(name)?;
  let (_, lon0) = su_zone_from_lon(range_ll.x1 + 1e-6);
  let proj_name = format!("SU{}", lon0 as i64);

  // meters per map point
  let k = scale_denom / mag * 25.4e-3 / dpi;
  let scale_affine = Affine2D { a: k, b: 0.0, c: 0.0, d: 0.0, e: k, f: 0.0 };
  let mut pix_to_wgs = Conv::compose(vec![Conv::affine(scale_affine), Conv::proj(&proj_name, "WGS")?]);

  if north {
    let center = range_ll.center();
    let p0 = pix_to_wgs.bck_pt(center)?;
    let p1 = pix_to_wgs.bck_pt(Point::new(center.x, center.y + 0.01))?;
    let heading = (p1.y - p0.y).atan2(p1.x - p0.x).to_degrees() + 90.0;
    pix_to_wgs = Conv::compose(vec![Conv::affine(Affine2D::from_rotation(p0, -heading, 1.0)), pix_to_wgs]);
  }

  let corners_ll = range_ll.corners();
  let closed = Line::new(vec![corners_ll[0], corners_ll[1], corners_ll[2], corners_ll[3], corners_ll[0]]);
  let border_full = pix_to_wgs.bck_acc_line(&closed, 1.0)?;
  let border_raw = border_full.opened();

  let bbox_raw = pix_to_wgs.bck_acc_rect(&range_ll, DEFAULT_ACCURACY)?;
  let x0 = bbox_raw.x1.floor();
  let y0 = bbox_raw.y1.floor();
  let mut w = (bbox_raw.x2.ceil() - x0) as i64;
  let mut h = (bbox_raw.y2.ceil() - y0) as i64;

  let pix_corners_raw: Vec<Point> = corners_ll.iter().map(|p| pix_to_wgs.bck_pt(*p)).collect::<Result<_, _>>()?;
  let pix_corners_floor: Vec<Point> = pix_corners_raw.iter().map(Point::floor).collect();
  let proj_corners: Vec<Point> = pix_corners_floor.iter().map(|p| scale_affine.apply(*p)).collect();

  let x0 = x0 - margins.left as f64;
  let y0 = y0 - margins.bottom as f64;
  w += margins.left + margins.right;
  h += margins.top + margins.bottom;

  let border = MultiLine::new(vec![Line::new(shift_flip(&border_raw.0, x0, y0, h as f64))]);
  let final_corners = shift_flip(&pix_corners_floor, x0, y0, h as f64);

  let mut map = GeoMap { name: name.to_string(), proj: proj_name, image_dpi: dpi, border, ..GeoMap::default() };
  map.image_size = (w.max(0) as u32, h.max(0) as u32);
  for (pixel, proj) in final_corners.into_iter().zip(proj_corners) {
    map.add_reference_point(pixel, proj);
  }
  Ok(map)
}

/// Parses a Finnish map sheet name (`V51`, `V511L`, `V5111A1`, ...) into
/// its ETRS-TM35FIN rectangle in meters. Mirrors the base-tile halving
/// grammar: letter K..X\{O}, digit 2..6, then an alternating sequence of
/// `L`/`R` halves and 1..4 quadrant digits down to the 1:5,000 level, with
/// an A..H letter selecting the 1:10,000 square.
pub(crate) fn nom_to_range_fi(name: &str) -> Result<Rect, Error> {
  let chars: Vec<char> = name.trim().chars().collect();
  let mut i = 0usize;
  let next = |i: &mut usize| -> Option<char> {
    let c = chars.get(*i).copied();
    *i += 1;
    c
  };
  let mut x = 500.0; // km
  let mut y = 6570.0; // km
  let mut w = 192.0;
  let mut h = 96.0;

  let c = next(&mut i).ok_or_else(|| bad_name(name, "empty name"))?.to_ascii_lowercase();
  if !('k'..='x').contains(&c) || c == 'o' {
    return Err(bad_name(name, "letter K..N or P..X expected"));
  }
  let band = if c > 'o' { c as i64 - 'k' as i64 - 1 } else { c as i64 - 'k' as i64 };
  y += band as f64 * h;

  let c = next(&mut i).ok_or_else(|| bad_name(name, "first digit 2..6 expected"))?;
  if !('2'..='6').contains(&c) {
    return Err(bad_name(name, "first digit 2..6 expected"));
  }
  x += (c as i64 - '5' as i64) as f64 * w;

  if i >= chars.len() {
    return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
  }

  for _ in 0..4 {
    let c = next(&mut i).ok_or_else(|| bad_name(name, "unexpected end of name"))?.to_ascii_lowercase();
    if c == 'l' || c == 'r' {
      w /= 2.0;
      if c == 'r' {
        x += w;
      }
      if i < chars.len() {
        return Err(bad_name(name, "extra symbols after L/R"));
      }
      return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
    }
    if !('1'..='4').contains(&c) {
      return Err(bad_name(name, "digit 1..4 expected"));
    }
    w /= 2.0;
    h /= 2.0;
    if c == '3' || c == '4' {
      x += w;
    }
    if c == '2' || c == '4' {
      y += h;
    }
    if i >= chars.len() {
      return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
    }
  }

  // 1:10,000 square, letter A..H.
  let c = next(&mut i).ok_or_else(|| bad_name(name, "unexpected end of name"))?.to_ascii_lowercase();
  if !('a'..='h').contains(&c) {
    return Err(bad_name(name, "letter A..H expected"));
  }
  w /= 4.0;
  h /= 2.0;
  let d = c as i64 - 'a' as i64;
  x += w * (d / 2) as f64;
  if d % 2 == 1 {
    y += h;
  }
  if i >= chars.len() {
    return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
  }

  for _ in 0..2 {
    let c = next(&mut i).ok_or_else(|| bad_name(name, "unexpected end of name"))?.to_ascii_lowercase();
    if c == 'l' || c == 'r' {
      w /= 2.0;
      if c == 'r' {
        x += w;
      }
      if i < chars.len() {
        return Err(bad_name(name, "extra symbols after L/R"));
      }
      return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
    }
    if !('1'..='4').contains(&c) {
      return Err(bad_name(name, "digit 1..4 expected"));
    }
    w /= 2.0;
    h /= 2.0;
    if c == '3' || c == '4' {
      x += w;
    }
    if c == '2' || c == '4' {
      y += h;
    }
    if i >= chars.len() {
      return Ok(Rect::new(x * 1000.0, y * 1000.0, (x + w) * 1000.0, (y + h) * 1000.0));
    }
  }
  Err(bad_name(name, "extra symbols after the name"))
}

/// Finnish standard map sheet, e.g. `V51`.
pub fn from_nomenclature_fi(name: &str, dpi: f64, mag: f64, margins: Margins) -> Result<GeoMap, Error> {
  let range = nom_to_range_fi(name)?;
  let k = 100_000.0 * 25.4e-3 / mag / dpi;

  let raw = Rect::new(range.x1 / k, range.y1 / k, range.x2 / k, range.y2 / k);
  let x0 = raw.x1.round();
  let y0 = raw.y1.round();
  let x1 = raw.x2.round();
  let y1 = raw.y2.round();
  let mut w = x1 - x0;
  let mut h = y1 - y0;

  // The sheet is an unrotated rectangle, so once the image size is rounded
  // to a pixel grid the border is exactly that grid, not the fractional
  // `range / k` corners.
  let rounded_corners = Rect::new(x0, y0, x1, y1).corners();
  let proj_corners = range.corners();

  let x0 = x0 - margins.left as f64;
  let y0 = y0 - margins.bottom as f64;
  w += (margins.left + margins.right) as f64;
  h += (margins.top + margins.bottom) as f64;

  let border_pix = shift_flip(&rounded_corners, x0, y0, h as f64);
  let border = MultiLine::new(vec![Line::new(border_pix.clone())]);
  let final_corners = border_pix;

  let mut map =
    GeoMap { name: name.to_string(), proj: "ETRS-TM35FIN".into(), image_dpi: dpi, border, ..GeoMap::default() };
  map.image_size = (w.max(0.0) as u32, h.max(0.0) as u32);
  for (pixel, proj) in final_corners.into_iter().zip(proj_corners) {
    map.add_reference_point(pixel, proj);
  }
  Ok(map)
}

/// Rectangular range of TMS or "Google" (XYZ) tiles at one zoom level.
pub fn from_tile_range(x: i64, y: i64, z: u8, w: i64, h: i64, google: bool, mag: f64) -> Result<GeoMap, Error> {
  if w <= 0 || h <= 0 {
    return Err(bad_name(&format!("[{x},{y},{z}]"), "empty tile range"));
  }
  let n = 1i64 << z;
  let tile_side = 256.0 * mag;
  let to_lon = |tx: i64| tx as f64 / n as f64 * 360.0 - 180.0;
  let to_lat = |ty: i64| {
    let yr = 1.0 - 2.0 * ty as f64 / n as f64;
    (std::f64::consts::PI * yr).sinh().atan().to_degrees()
  };

  let (north_row, south_row) = if google { (y, y + h - 1) } else { (n - y - h, n - 1 - y) };
  let lon_min = to_lon(x);
  let lon_max = to_lon(x + w);
  let lat_max = to_lat(north_row);
  let lat_min = to_lat(south_row + 1);

  let image_w = (w as f64 * tile_side).round() as u32;
  let image_h = (h as f64 * tile_side).round() as u32;

  let pix = [
    Point::new(0.0, image_h as f64),
    Point::new(image_w as f64, image_h as f64),
    Point::new(image_w as f64, 0.0),
    Point::new(0.0, 0.0),
  ];
  let geo_ll = [
    Point::new(lon_min, lat_min),
    Point::new(lon_max, lat_min),
    Point::new(lon_max, lat_max),
    Point::new(lon_min, lat_max),
  ];
  let proj_pts: Vec<Point> = geo_ll
    .iter()
    .map(|p| {
      let (px, py) = web_mercator_forward(p.x, p.y);
      Point::new(px, py)
    })
    .collect();

  let mut map = GeoMap {
    name: format!("[{x},{y},{w},{h}]"),
    proj: "WEB".into(),
    border: MultiLine::new(vec![Line::new(pix.to_vec())]),
    ..GeoMap::default()
  };
  map.image_size = (image_w, image_h);
  for (pixel, proj) in pix.into_iter().zip(proj_pts) {
    map.add_reference_point(pixel, proj);
  }
  Ok(map)
}

/// Explicit projection, with extent given as a WGS84 rectangle.
pub fn from_projection(proj_name: &str, scale: Option<f64>, dpi: f64, extent_wgs: &Rect) -> Result<GeoMap, Error> {
  let proj = Conv::proj(proj_name, "WGS")?;
  let is_deg = proj.src_is_degrees();
  let scale = scale.unwrap_or(if is_deg { 0.01 } else { 1000.0 });
  let k = scale * 2.54 / dpi;

  let range_proj = proj.bck_acc_rect(extent_wgs, DEFAULT_ACCURACY)?;
  let x0 = (range_proj.x1 / k).floor();
  let y0 = (range_proj.y1 / k).floor();
  let w = (range_proj.x2 / k).ceil() - x0;
  let h = (range_proj.y2 / k).ceil() - y0;

  let proj_corners = range_proj.corners();
  let pix_corners: Vec<Point> =
    proj_corners.iter().map(|p| Point::new(p.x / k - x0, h - (p.y / k - y0))).collect();

  let mut map = GeoMap {
    proj: proj_name.to_string(),
    image_dpi: dpi,
    border: MultiLine::new(vec![Line::new(pix_corners.clone())]),
    ..GeoMap::default()
  };
  map.image_size = (w.max(0.0) as u32, h.max(0.0) as u32);
  for (pixel, proj_pt) in pix_corners.into_iter().zip(proj_corners) {
    map.add_reference_point(pixel, proj_pt);
  }
  Ok(map)
}

/// Chooses a reference from loaded data: reuse it if non-empty, otherwise
/// fall back to a "proj" (WGS) reference covering `bbox_wgs`.
pub fn from_data(existing: Option<GeoMap>, bbox_wgs: &Rect, dpi: f64) -> Result<GeoMap, Error> {
  if let Some(map) = existing {
    if !map.is_empty() {
      return Ok(map);
    }
  }
  from_projection("WGS", None, dpi, bbox_wgs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn su_nomenclature_zone_and_corner_count() {
    // n37-001 at dpi=200: same scenario as geo_mkref.test.cpp's first nom
    // case, which gives image_size (2583,3020) and a 6-vertex border built
    // from the meridian-curved long edges of the 1:100000 sheet. Our TM is
    // spherical rather than the original's ellipsoid (see conv::proj's
    // module doc), so pixel counts are close but not bit-identical; check
    // against that reference within the sphere/ellipsoid gap instead of
    // exactly.
    let map = from_nomenclature_su("n37-001", 200.0, 1.0, false, Margins::default()).unwrap();
    assert_eq!(map.proj, "SU39");
    assert!((map.image_size.0 as f64 - 2583.0).abs() < 150.0);
    assert!((map.image_size.1 as f64 - 3020.0).abs() < 150.0);
    assert_eq!(map.border.0[0].len(), 6);
    assert_eq!(map.reference_points.len(), 4);
  }

  #[test]
  fn fi_nomenclature_matches_known_sheet_size() {
    let map = from_nomenclature_fi("v52", 200.0, 1.0, Margins::default()).unwrap();
    assert_eq!(map.proj, "ETRS-TM35FIN");
    assert_eq!(map.image_size, (7559, 3779));
    let pts = &map.border.0[0].0;
    assert_eq!(pts.len(), 4);
    assert_eq!(pts[0], Point::new(0.0, 3779.0));
    assert_eq!(pts[1], Point::new(7559.0, 3779.0));
    assert_eq!(pts[2], Point::new(7559.0, 0.0));
    assert_eq!(pts[3], Point::new(0.0, 0.0));
  }

  #[test]
  fn fi_nomenclature_rejects_bad_letter() {
    assert!(from_nomenclature_fi("o52", 200.0, 1.0, Margins::default()).is_err());
  }

  #[test]
  fn tile_range_single_tms_tile() {
    let map = from_tile_range(1, 1, 10, 1, 1, false, 1.0).unwrap();
    assert_eq!(map.name, "[1,1,1,1]");
    assert_eq!(map.image_size, (256, 256));
    let mut lons: Vec<f64> = map
      .reference_points
      .iter()
      .map(|(_, proj)| crate::conv::proj::web_mercator_backward(proj.x, proj.y).0)
      .collect();
    lons.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_approx_eq::assert_approx_eq!(lons[0], -179.648_438, 1e-4);
    assert_approx_eq::assert_approx_eq!(lons[lons.len() - 1], -179.296_875, 1e-4);
  }

  #[test]
  fn explicit_projection_produces_four_refpoints() {
    let extent = Rect::new(10.0, 50.0, 11.0, 51.0);
    let map = from_projection("WGS", None, 300.0, &extent).unwrap();
    assert_eq!(map.reference_points.len(), 4);
    assert!(map.image_size.0 > 0 && map.image_size.1 > 0);
  }

  #[test]
  fn from_data_falls_back_to_projection_bbox() {
    let extent = Rect::new(0.0, 0.0, 1.0, 1.0);
    let map = from_data(None, &extent, 300.0).unwrap();
    assert_eq!(map.proj, "WGS");
  }
}
