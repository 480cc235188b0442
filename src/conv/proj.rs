//! A small built-in stand-in for the external projection library the
//! original system wraps via `PROJ`. Only the handful of named systems
//! the store and reference builders actually need are implemented, using
//! the spherical transverse-Mercator and Web-Mercator formulas (Snyder);
//! an exact ellipsoidal PROJ replica is out of scope (§1).

use crate::error::ConversionError;
use crate::geom::Point;

/// Mean Earth radius in meters, used by the spherical approximations below.
const EARTH_RADIUS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
  pub lon0_deg: f64,
  pub false_easting: f64,
  pub false_northing: f64,
  pub k0: f64,
}

impl TransverseMercator {
  #[must_use]
  pub fn new(lon0_deg: f64, false_easting: f64, false_northing: f64, k0: f64) -> Self {
    Self { lon0_deg, false_easting, false_northing, k0 }
  }

  /// Forward: geographic degrees -> projected meters.
  pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Result<(f64, f64), ConversionError> {
    let lon0 = self.lon0_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();
    let b = lat.cos() * (lon - lon0).sin();
    if b.abs() >= 1.0 {
      return Err(ConversionError::OutOfDomain { x: lon_deg, y: lat_deg });
    }
    let x = 0.5 * EARTH_RADIUS * self.k0 * ((1.0 + b) / (1.0 - b)).ln() + self.false_easting;
    let y = EARTH_RADIUS * self.k0 * lat.tan().atan2((lon - lon0).cos()) + self.false_northing;
    if !x.is_finite() || !y.is_finite() {
      return Err(ConversionError::NonFinite);
    }
    Ok((x, y))
  }

  /// Backward: projected meters -> geographic degrees.
  pub fn backward(&self, x: f64, y: f64) -> Result<(f64, f64), ConversionError> {
    let dx = (x - self.false_easting) / (EARTH_RADIUS * self.k0);
    let d = (y - self.false_northing) / (EARTH_RADIUS * self.k0);
    let lon0 = self.lon0_deg.to_radians();
    let lon = lon0 + dx.sinh().atan2(d.cos());
    let lat = (d.sin() / dx.cosh()).asin();
    if !lon.is_finite() || !lat.is_finite() {
      return Err(ConversionError::NonFinite);
    }
    Ok((lon.to_degrees(), lat.to_degrees()))
  }
}

/// Web Mercator, meters, `EPSG:3857`-style (spherical).
#[must_use]
pub fn web_mercator_forward(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
  let lon = lon_deg.to_radians();
  let lat = lat_deg.to_radians().clamp(-1.4844, 1.4844);
  (EARTH_RADIUS * lon, EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln())
}

#[must_use]
pub fn web_mercator_backward(x: f64, y: f64) -> (f64, f64) {
  let lon = (x / EARTH_RADIUS).to_degrees();
  let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
  (lon, lat)
}

/// Extracts the megameter zone prefix from an SU-system easting and its
/// reference meridian, per the "SU automatic 6-degree zones" rule: the
/// integer `x / 1e6` encodes the zone number, zones above 30 wrap to the
/// western hemisphere.
#[must_use]
pub fn su_zone_from_prefix(x: f64) -> (i64, f64) {
  let pref = (x / 1_000_000.0).floor() as i64;
  let lon0 = ((pref - if pref > 30 { 60 } else { 0 }) * 6 - 3) as f64;
  (pref, lon0)
}

/// Computes the SU zone prefix that a given longitude falls into, and its
/// reference meridian, inverting [`su_zone_from_prefix`].
#[must_use]
pub fn su_zone_from_lon(lon_deg: f64) -> (i64, f64) {
  let lon0 = (lon_deg / 6.0).floor() * 6.0 + 3.0;
  let pref = if lon0 < 0.0 { 60 } else { 0 } + ((lon0 - 3.0) / 6.0) as i64 + 1;
  (pref, lon0)
}

/// Builds the `SU<N>` transverse Mercator for reference meridian `lon0_deg`
/// (must be of the form `3 + 6*n`), with the zone-dependent false easting
/// `SU` normally carries (omit it for the `SU<N>N` "no prefix" variant).
#[must_use]
pub fn su_zone_tm(lon0_deg: f64, with_prefix: bool) -> TransverseMercator {
  let pref = if lon0_deg < 0.0 { 60 } else { 0 } + ((lon0_deg - 3.0) / 6.0) as i64 + 1;
  let false_easting = 500_000.0 + if with_prefix { pref as f64 * 1_000_000.0 } else { 0.0 };
  TransverseMercator::new(lon0_deg, false_easting, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forward_rejects_the_90_degree_asymptote() {
    let tm = TransverseMercator::new(27.0, 500_000.0, 0.0, 1.0);
    assert!(tm.forward(117.0, 0.0).is_err());
  }

  #[test]
  fn tmerc_roundtrip() {
    let tm = TransverseMercator::new(27.0, 500_000.0, 0.0, 1.0);
    let (x, y) = tm.forward(27.3, 54.5).unwrap();
    let (lon, lat) = tm.backward(x, y).unwrap();
    assert_approx_eq::assert_approx_eq!(lon, 27.3, 1e-6);
    assert_approx_eq::assert_approx_eq!(lat, 54.5, 1e-6);
  }

  #[test]
  fn web_mercator_roundtrip() {
    let (x, y) = web_mercator_forward(13.41, 52.52);
    let (lon, lat) = web_mercator_backward(x, y);
    assert_approx_eq::assert_approx_eq!(lon, 13.41, 1e-9);
    assert_approx_eq::assert_approx_eq!(lat, 52.52, 1e-6);
  }

  #[test]
  fn su_zone_prefix_roundtrip() {
    let (pref, lon0) = su_zone_from_lon(27.3);
    assert_eq!(lon0, 27.0);
    let x_with_prefix = 123_456.0 + pref as f64 * 1_000_000.0;
    let (pref2, lon0_2) = su_zone_from_prefix(x_with_prefix);
    assert_eq!(pref2, pref);
    assert_eq!(lon0_2, lon0);
  }
}
