//! Reverse spatial index: `(type, geohash-prefix) -> id-set`, grounded on
//! the geohash-backed 2D index `vmap2.h` wraps as `GeoHashStorage`.
//!
//! Each object is filed under the longest geohash prefix whose cell still
//! fully contains its bounding rectangle, so a query only has to decode and
//! intersect-test the (typically small) set of prefixes actually stored,
//! rather than every object.

use std::collections::{BTreeMap, BTreeSet};

use crate::geom::{Point, Rect};
use crate::store::obj::{class_of, VMap2objClass};

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const MAX_PRECISION: usize = 12;

/// Encodes a lon/lat point as a standard base32 geohash of `precision`
/// characters.
#[must_use]
pub fn encode(p: Point, precision: usize) -> String {
  let mut lon_range = (-180.0_f64, 180.0_f64);
  let mut lat_range = (-90.0_f64, 90.0_f64);
  let mut bits = 0u8;
  let mut bit_count = 0u8;
  let mut even_bit = true;
  let mut out = String::with_capacity(precision);
  while out.len() < precision {
    if even_bit {
      let mid = (lon_range.0 + lon_range.1) / 2.0;
      if p.x >= mid {
        bits = (bits << 1) | 1;
        lon_range.0 = mid;
      } else {
        bits <<= 1;
        lon_range.1 = mid;
      }
    } else {
      let mid = (lat_range.0 + lat_range.1) / 2.0;
      if p.y >= mid {
        bits = (bits << 1) | 1;
        lat_range.0 = mid;
      } else {
        bits <<= 1;
        lat_range.1 = mid;
      }
    }
    even_bit = !even_bit;
    bit_count += 1;
    if bit_count == 5 {
      out.push(BASE32[bits as usize] as char);
      bits = 0;
      bit_count = 0;
    }
  }
  out
}

/// The rectangle of points a geohash prefix could encode.
#[must_use]
pub fn decode_bounds(hash: &str) -> Rect {
  let mut lon_range = (-180.0_f64, 180.0_f64);
  let mut lat_range = (-90.0_f64, 90.0_f64);
  let mut even_bit = true;
  for c in hash.chars() {
    let Some(idx) = BASE32.iter().position(|&b| b as char == c) else {
      continue;
    };
    for shift in (0..5).rev() {
      let bit = (idx >> shift) & 1;
      if even_bit {
        let mid = (lon_range.0 + lon_range.1) / 2.0;
        if bit == 1 {
          lon_range.0 = mid;
        } else {
          lon_range.1 = mid;
        }
      } else {
        let mid = (lat_range.0 + lat_range.1) / 2.0;
        if bit == 1 {
          lat_range.0 = mid;
        } else {
          lat_range.1 = mid;
        }
      }
      even_bit = !even_bit;
    }
  }
  Rect::new(lon_range.0, lat_range.0, lon_range.1, lat_range.1)
}

/// The longest geohash prefix (up to [`MAX_PRECISION`]) whose cell fully
/// contains `bbox`: the shared prefix of the south-west and north-east
/// corners' full-precision geohashes.
#[must_use]
pub fn covering_prefix(bbox: &Rect) -> String {
  if bbox.is_empty() {
    return String::new();
  }
  let sw = encode(Point::new(bbox.x1, bbox.y1), MAX_PRECISION);
  let ne = encode(Point::new(bbox.x2, bbox.y2), MAX_PRECISION);
  sw.chars().zip(ne.chars()).take_while(|(a, b)| a == b).map(|(a, _)| a).collect()
}

/// `(type, geohash-prefix) -> id-set`.
#[derive(Debug, Clone, Default)]
pub struct GeoHashIndex {
  entries: BTreeMap<(u32, String), BTreeSet<u32>>,
}

impl GeoHashIndex {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, type_: u32, bbox: &Rect, id: u32) {
    let prefix = covering_prefix(bbox);
    self.entries.entry((type_, prefix)).or_default().insert(id);
  }

  pub fn remove(&mut self, type_: u32, bbox: &Rect, id: u32) {
    let prefix = covering_prefix(bbox);
    let key = (type_, prefix);
    if let Some(set) = self.entries.get_mut(&key) {
      set.remove(&id);
      if set.is_empty() {
        self.entries.remove(&key);
      }
    }
  }

  /// Ids of exactly `type_` whose covering cell intersects `rect`; an empty
  /// `rect` matches every extent.
  #[must_use]
  pub fn find_type(&self, type_: u32, rect: &Rect) -> BTreeSet<u32> {
    self
      .entries
      .iter()
      .filter(|((t, prefix), _)| *t == type_ && (rect.is_empty() || decode_bounds(prefix).intersects(rect)))
      .flat_map(|(_, ids)| ids.iter().copied())
      .collect()
  }

  /// Ids whose class matches and covering cell intersects `rect`.
  #[must_use]
  pub fn find_class(&self, class: VMap2objClass, rect: &Rect) -> BTreeSet<u32> {
    self
      .entries
      .iter()
      .filter(|((t, prefix), _)| class_of(*t) == class && (rect.is_empty() || decode_bounds(prefix).intersects(rect)))
      .flat_map(|(_, ids)| ids.iter().copied())
      .collect()
  }

  #[must_use]
  pub fn types(&self) -> BTreeSet<u32> {
    self.entries.keys().map(|(t, _)| *t).collect()
  }

  /// Aggregate bbox over every indexed prefix.
  #[must_use]
  pub fn bbox(&self) -> Rect {
    self.entries.keys().map(|(_, prefix)| decode_bounds(prefix)).fold(Rect::empty(), |acc, r| acc.extend(&r))
  }

  /// One line per `(type, prefix, ids...)` entry, for the `_gh` sidecar
  /// format (§6.4).
  #[must_use]
  pub fn to_lines(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .map(|((t, prefix), ids)| {
        let ids = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
        format!("{t} {prefix} {ids}")
      })
      .collect()
  }

  #[must_use]
  pub fn from_lines(lines: &[String]) -> Self {
    let mut entries: BTreeMap<(u32, String), BTreeSet<u32>> = BTreeMap::new();
    for line in lines {
      let mut parts = line.split_whitespace();
      let Some(Ok(t)) = parts.next().map(str::parse) else { continue };
      let Some(prefix) = parts.next() else { continue };
      let ids = parts.filter_map(|p| p.parse().ok()).collect();
      entries.insert((t, prefix.to_string()), ids);
    }
    Self { entries }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_decode_bounds_contains_source_point() {
    let p = Point::new(24.9384, 60.1699);
    let hash = encode(p, 9);
    let bounds = decode_bounds(&hash);
    assert!(bounds.contains_point(&p));
  }

  #[test]
  fn covering_prefix_of_a_point_is_precise() {
    let p = Rect::new(24.9384, 60.1699, 24.9384, 60.1699);
    let prefix = covering_prefix(&p);
    assert_eq!(prefix.len(), MAX_PRECISION);
  }

  #[test]
  fn insert_then_find_by_type_and_range() {
    let mut idx = GeoHashIndex::new();
    idx.insert(7, &Rect::new(24.9, 60.1, 24.95, 60.2), 101);
    idx.insert(7, &Rect::new(-10.0, -10.0, -9.0, -9.0), 202);
    let hits = idx.find_type(7, &Rect::new(24.0, 60.0, 25.0, 61.0));
    assert!(hits.contains(&101));
    assert!(!hits.contains(&202));
  }

  #[test]
  fn remove_drops_empty_prefix_entry() {
    let mut idx = GeoHashIndex::new();
    let bbox = Rect::new(1.0, 1.0, 2.0, 2.0);
    idx.insert(1, &bbox, 5);
    idx.remove(1, &bbox, 5);
    assert!(idx.find_type(1, &Rect::empty()).is_empty());
    assert!(idx.types().is_empty());
  }

  #[test]
  fn lines_roundtrip() {
    let mut idx = GeoHashIndex::new();
    idx.insert(3, &Rect::new(1.0, 1.0, 1.5, 1.5), 9);
    idx.insert(3, &Rect::new(1.0, 1.0, 1.5, 1.5), 10);
    let back = GeoHashIndex::from_lines(&idx.to_lines());
    assert_eq!(back.find_type(3, &Rect::empty()), idx.find_type(3, &Rect::empty()));
  }
}
