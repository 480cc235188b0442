//! The map object model: class/type taxonomy, the essential attributes a
//! [`VMap2obj`] carries, and the packed TLV byte encoding `VMap2` uses for
//! storage.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::{Error, StoreError};
use crate::geom::{Line, MultiLine, Point};

/// High byte of a type value: the object's broad taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum VMap2objClass {
  Point = 0x00,
  Line = 0x01,
  Polygon = 0x02,
  Text = 0x03,
  None = 0xFF,
}

impl VMap2objClass {
  #[must_use]
  pub fn from_byte(b: u8) -> Self {
    match b {
      0x00 => Self::Point,
      0x01 => Self::Line,
      0x02 => Self::Polygon,
      0x03 => Self::Text,
      _ => Self::None,
    }
  }
}

/// Text anchor point relative to the object's reference coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum VMap2objAlign {
  #[default]
  SW = 0,
  W = 1,
  NW = 2,
  N = 3,
  NE = 4,
  E = 5,
  SE = 6,
  S = 7,
  C = 8,
}

impl VMap2objAlign {
  #[must_use]
  pub fn from_byte(b: u8) -> Self {
    match b {
      0 => Self::SW,
      1 => Self::W,
      2 => Self::NW,
      3 => Self::N,
      4 => Self::NE,
      5 => Self::E,
      6 => Self::SE,
      7 => Self::S,
      _ => Self::C,
    }
  }
}

/// Direction an oriented object (an arrow from Fig, a one-way line from MP)
/// runs relative to its stored point order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum VMap2objDir {
  #[default]
  No = 0,
  Frw = 1,
  Bck = 2,
}

impl VMap2objDir {
  #[must_use]
  pub fn from_u32(v: u32) -> Self {
    match v {
      1 => Self::Frw,
      2 => Self::Bck,
      _ => Self::No,
    }
  }
}

/// Sentinel meaning "no type"/"no reference" (also the reserved invalid id).
pub const NONE_ID: u32 = 0xFFFF_FFFF;

#[must_use]
pub fn make_type(class: VMap2objClass, tnum: u32) -> u32 {
  (u32::from(class as u8) << 24) | (tnum & 0x00FF_FFFF)
}

#[must_use]
pub fn class_of(type_: u32) -> VMap2objClass {
  VMap2objClass::from_byte((type_ >> 24) as u8)
}

#[must_use]
pub fn tnum_of(type_: u32) -> u32 {
  type_ & 0x00FF_FFFF
}

/// The four class words this crate's type grammar accepts in every place a
/// type or class can be written as text: stylesheet selectors, edit-script
/// conditions, render targets.
#[must_use]
pub fn class_from_word(word: &str) -> Option<VMap2objClass> {
  Some(match word {
    "point" => VMap2objClass::Point,
    "line" => VMap2objClass::Line,
    "area" => VMap2objClass::Polygon,
    "text" => VMap2objClass::Text,
    _ => return None,
  })
}

fn class_word(class: VMap2objClass) -> &'static str {
  match class {
    VMap2objClass::Point => "point",
    VMap2objClass::Line => "line",
    VMap2objClass::Polygon => "area",
    VMap2objClass::Text => "text",
    VMap2objClass::None => "none",
  }
}

/// Parses a bare type number, decimal or `0x`-prefixed hex.
#[must_use]
pub fn parse_type_num(tok: &str) -> Option<u32> {
  if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
    u32::from_str_radix(hex, 16).ok()
  } else {
    tok.parse().ok()
  }
}

/// Parses `(point|line|area|text):<number>` into a packed type, the one
/// type-selector grammar shared by the stylesheet, edit-script, and
/// renderer DSLs.
#[must_use]
pub fn parse_type(tok: &str) -> Option<u32> {
  let (prefix, num) = tok.split_once(':')?;
  let class = class_from_word(prefix)?;
  let tnum = parse_type_num(num)?;
  Some(make_type(class, tnum))
}

/// Prints a packed type as `(point|line|area|text):0x<hex>`, the inverse of
/// [`parse_type`].
#[must_use]
pub fn print_type(type_: u32) -> String {
  format!("{}:0x{:x}", class_word(class_of(type_)), tnum_of(type_))
}

/// A single map object: a typed, styled geometry with an optional label
/// attachment.
#[derive(Debug, Clone)]
pub struct VMap2obj {
  pub type_: u32,
  /// Orientation from geographic north, clockwise, in degrees. `NaN` means
  /// "no orientation", distinct from `0.0`.
  pub angle: f32,
  pub scale: f32,
  pub align: VMap2objAlign,
  /// Direction from a source MP one-way line or a Fig arrow. [`VMap2objDir::No`]
  /// means the object carries no direction.
  pub dir: VMap2objDir,
  pub name: String,
  pub comm: String,
  /// Free-text provenance of this object (source file, importer), distinct
  /// from `comm`'s human-authored notes.
  pub src: String,
  pub tags: BTreeSet<String>,
  /// Type of the parent object a Text object's label is attached to.
  /// [`NONE_ID`] means "detached label".
  pub ref_type: u32,
  pub ref_pt: Point,
  pub coords: MultiLine,
}

impl Default for VMap2obj {
  fn default() -> Self {
    Self {
      type_: make_type(VMap2objClass::None, 0),
      angle: f32::NAN,
      scale: 1.0,
      align: VMap2objAlign::SW,
      dir: VMap2objDir::No,
      name: String::new(),
      comm: String::new(),
      src: String::new(),
      tags: BTreeSet::new(),
      ref_type: NONE_ID,
      ref_pt: Point::default(),
      coords: MultiLine::default(),
    }
  }
}

impl VMap2obj {
  #[must_use]
  pub fn new(class: VMap2objClass, tnum: u32) -> Self {
    Self { type_: make_type(class, tnum), ..Self::default() }
  }

  #[must_use]
  pub fn class(&self) -> VMap2objClass {
    class_of(self.type_)
  }

  #[must_use]
  pub fn tnum(&self) -> u32 {
    tnum_of(self.type_)
  }

  /// Header equality: everything but `coords`, with NaN-aware `angle`.
  #[must_use]
  pub fn is_same_head(&self, other: &Self) -> bool {
    self.type_ == other.type_
      && (self.angle == other.angle || (self.angle.is_nan() && other.angle.is_nan()))
      && self.scale == other.scale
      && self.align == other.align
      && self.dir == other.dir
      && self.name == other.name
      && self.comm == other.comm
      && self.src == other.src
      && self.tags == other.tags
      && self.ref_type == other.ref_type
      && self.ref_pt == other.ref_pt
  }

  /// Checks the class/coords invariants of §3.2: Point and Text objects
  /// carry exactly one point.
  pub fn check_invariants(&self) -> Result<(), Error> {
    match self.class() {
      VMap2objClass::Point | VMap2objClass::Text => {
        if self.coords.0.len() != 1 || self.coords.0[0].len() != 1 {
          return Err(
            StoreError::CorruptRecord(
              0,
              format!("{:?} object must carry exactly one point, got {} line(s)", self.class(), self.coords.0.len()),
            )
            .into(),
          );
        }
      }
      VMap2objClass::Line | VMap2objClass::Polygon | VMap2objClass::None => {}
    }
    Ok(())
  }
}

impl PartialEq for VMap2obj {
  fn eq(&self, other: &Self) -> bool {
    self.is_same_head(other) && coords_eq(&self.coords, &other.coords)
  }
}

impl Eq for VMap2obj {}

fn coords_eq(a: &MultiLine, b: &MultiLine) -> bool {
  a.0.len() == b.0.len() && a.0.iter().zip(&b.0).all(|(la, lb)| la.0 == lb.0)
}

impl PartialOrd for VMap2obj {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for VMap2obj {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .type_
      .cmp(&other.type_)
      .then_with(|| cmp_angle(self.angle, other.angle))
      .then_with(|| self.scale.total_cmp(&other.scale))
      .then_with(|| self.align.cmp(&other.align))
      .then_with(|| self.dir.cmp(&other.dir))
      .then_with(|| self.name.cmp(&other.name))
      .then_with(|| self.comm.cmp(&other.comm))
      .then_with(|| self.src.cmp(&other.src))
      .then_with(|| self.tags.cmp(&other.tags))
      .then_with(|| self.ref_type.cmp(&other.ref_type))
      .then_with(|| cmp_point(&self.ref_pt, &other.ref_pt))
      .then_with(|| cmp_coords(&self.coords, &other.coords))
  }
}

fn cmp_angle(a: f32, b: f32) -> Ordering {
  match (a.is_nan(), b.is_nan()) {
    (true, true) => Ordering::Equal,
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (false, false) => a.total_cmp(&b),
  }
}

fn cmp_point(a: &Point, b: &Point) -> Ordering {
  a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y))
}

fn cmp_line(a: &Line, b: &Line) -> Ordering {
  for (pa, pb) in a.0.iter().zip(&b.0) {
    let c = cmp_point(pa, pb);
    if c != Ordering::Equal {
      return c;
    }
  }
  a.0.len().cmp(&b.0.len())
}

fn cmp_coords(a: &MultiLine, b: &MultiLine) -> Ordering {
  for (la, lb) in a.0.iter().zip(&b.0) {
    let c = cmp_line(la, lb);
    if c != Ordering::Equal {
      return c;
    }
  }
  a.0.len().cmp(&b.0.len())
}

// Packed TLV encoding (§3.2, §6.4): two little-endian u32 (class, type
// number), then zero or more 4-byte-tag/4-byte-length/value records.
// Coordinates are 1e-7-degree signed 32-bit integers, folded into the
// canonical lon/lat range so a record always round-trips even if the
// writer produced a slightly out-of-range value.

const TAG_ANGL: [u8; 4] = *b"angl";
const TAG_SCAL: [u8; 4] = *b"scal";
const TAG_ALGN: [u8; 4] = *b"algn";
const TAG_DIR: [u8; 4] = *b"dir ";
const TAG_NAME: [u8; 4] = *b"name";
const TAG_COMM: [u8; 4] = *b"comm";
const TAG_SRC: [u8; 4] = *b"src ";
const TAG_TAG: [u8; 4] = *b"tag ";
const TAG_REF: [u8; 4] = *b"ref ";
const TAG_CRDS: [u8; 4] = *b"crds";

fn fold_lon(lon: f64) -> f64 {
  (lon + 180.0).rem_euclid(360.0) - 180.0
}

fn fold_lat(lat: f64) -> f64 {
  lat.clamp(-90.0, 90.0)
}

fn encode_coord(v: f64) -> i32 {
  (v * 1e7).round() as i32
}

fn decode_coord(v: i32) -> f64 {
  f64::from(v) * 1e-7
}

fn push_tlv(out: &mut Vec<u8>, tag: [u8; 4], value: &[u8]) {
  out.extend_from_slice(&tag);
  out.extend_from_slice(&(value.len() as u32).to_le_bytes());
  out.extend_from_slice(value);
}

impl VMap2obj {
  #[must_use]
  pub fn pack(&self) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u32::from(self.class() as u8).to_le_bytes());
    out.extend_from_slice(&self.tnum().to_le_bytes());

    if !self.angle.is_nan() {
      let millideg = (f64::from(self.angle) * 1000.0).round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
      push_tlv(&mut out, TAG_ANGL, &millideg.to_le_bytes());
    }
    if (self.scale - 1.0).abs() > f32::EPSILON {
      push_tlv(&mut out, TAG_SCAL, &self.scale.to_le_bytes());
    }
    if self.align != VMap2objAlign::SW {
      push_tlv(&mut out, TAG_ALGN, &[self.align as u8]);
    }
    if self.dir != VMap2objDir::No {
      push_tlv(&mut out, TAG_DIR, &(self.dir as u32).to_le_bytes());
    }
    if !self.name.is_empty() {
      push_tlv(&mut out, TAG_NAME, self.name.as_bytes());
    }
    if !self.comm.is_empty() {
      push_tlv(&mut out, TAG_COMM, self.comm.as_bytes());
    }
    if !self.src.is_empty() {
      push_tlv(&mut out, TAG_SRC, self.src.as_bytes());
    }
    for tag in &self.tags {
      push_tlv(&mut out, TAG_TAG, tag.as_bytes());
    }
    if self.ref_type != NONE_ID {
      let mut buf = Vec::with_capacity(12);
      buf.extend_from_slice(&self.ref_type.to_le_bytes());
      buf.extend_from_slice(&encode_coord(fold_lon(self.ref_pt.x)).to_le_bytes());
      buf.extend_from_slice(&encode_coord(fold_lat(self.ref_pt.y)).to_le_bytes());
      push_tlv(&mut out, TAG_REF, &buf);
    }
    for line in &self.coords.0 {
      let mut buf = Vec::with_capacity(line.0.len() * 8);
      for p in &line.0 {
        buf.extend_from_slice(&encode_coord(fold_lon(p.x)).to_le_bytes());
        buf.extend_from_slice(&encode_coord(fold_lat(p.y)).to_le_bytes());
      }
      push_tlv(&mut out, TAG_CRDS, &buf);
    }
    out
  }

  pub fn unpack(bytes: &[u8]) -> Result<Self, Error> {
    if bytes.len() < 8 {
      return Err(StoreError::CorruptRecord(0, "record shorter than the class/type header".into()).into());
    }
    let class = VMap2objClass::from_byte(u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u8);
    let tnum = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let mut obj = Self::new(class, tnum);
    let mut lines = Vec::new();

    let mut pos = 8;
    while pos + 8 <= bytes.len() {
      let tag: [u8; 4] = bytes[pos..pos + 4].try_into().unwrap();
      let len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
      pos += 8;
      if pos + len > bytes.len() {
        return Err(StoreError::CorruptRecord(0, format!("TLV record {:?} overruns the buffer", String::from_utf8_lossy(&tag))).into());
      }
      let value = &bytes[pos..pos + len];
      match tag {
        TAG_ANGL if len == 4 => {
          let millideg = i32::from_le_bytes(value.try_into().unwrap());
          obj.angle = (f64::from(millideg) / 1000.0) as f32;
        }
        TAG_SCAL if len == 4 => obj.scale = f32::from_le_bytes(value.try_into().unwrap()),
        TAG_ALGN if len == 1 => obj.align = VMap2objAlign::from_byte(value[0]),
        TAG_DIR if len == 4 => obj.dir = VMap2objDir::from_u32(u32::from_le_bytes(value.try_into().unwrap())),
        TAG_NAME => obj.name = String::from_utf8_lossy(value).into_owned(),
        TAG_COMM => obj.comm = String::from_utf8_lossy(value).into_owned(),
        TAG_SRC => obj.src = String::from_utf8_lossy(value).into_owned(),
        TAG_TAG => {
          obj.tags.insert(String::from_utf8_lossy(value).into_owned());
        }
        TAG_REF if len == 12 => {
          obj.ref_type = u32::from_le_bytes(value[0..4].try_into().unwrap());
          let lon = decode_coord(i32::from_le_bytes(value[4..8].try_into().unwrap()));
          let lat = decode_coord(i32::from_le_bytes(value[8..12].try_into().unwrap()));
          obj.ref_pt = Point::new(lon, lat);
        }
        TAG_CRDS if len % 8 == 0 => {
          let pts = value
            .chunks_exact(8)
            .map(|c| {
              let lon = decode_coord(i32::from_le_bytes(c[0..4].try_into().unwrap()));
              let lat = decode_coord(i32::from_le_bytes(c[4..8].try_into().unwrap()));
              Point::new(lon, lat)
            })
            .collect();
          lines.push(Line::new(pts));
        }
        // Unknown or malformed-length tags are skipped for forward
        // compatibility rather than rejected.
        _ => {}
      }
      pos += len;
    }
    obj.coords = MultiLine::new(lines);
    Ok(obj)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn make_type_roundtrips_class_and_tnum() {
    let t = make_type(VMap2objClass::Polygon, 0x1234);
    assert_eq!(class_of(t), VMap2objClass::Polygon);
    assert_eq!(tnum_of(t), 0x1234);
  }

  #[test]
  fn parse_type_reads_back_print_type() {
    let t = make_type(VMap2objClass::Line, 0x2a);
    assert_eq!(print_type(t), "line:0x2a");
    assert_eq!(parse_type("line:0x2a"), Some(t));
    assert_eq!(parse_type("area:42"), Some(make_type(VMap2objClass::Polygon, 42)));
  }

  #[test]
  fn parse_type_rejects_unknown_class_word() {
    assert_eq!(parse_type("shape:1"), None);
    assert_eq!(parse_type("notype"), None);
  }

  #[test]
  fn point_object_rejects_multi_point_coords() {
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = MultiLine::new(vec![Line::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)])]);
    assert!(obj.check_invariants().is_err());
  }

  #[test]
  fn pack_unpack_roundtrips_full_object() {
    let mut obj = VMap2obj::new(VMap2objClass::Text, 7);
    obj.angle = 45.5;
    obj.scale = 2.0;
    obj.align = VMap2objAlign::NE;
    obj.dir = VMap2objDir::Frw;
    obj.name = "peak".into();
    obj.comm = "surveyed 1998".into();
    obj.src = "survey.gpx".into();
    obj.tags.insert("source:survey".into());
    obj.tags.insert("verified".into());
    obj.ref_type = make_type(VMap2objClass::Point, 3);
    obj.ref_pt = Point::new(24.9, 60.17);
    obj.coords = MultiLine::single_point(Point::new(24.901, 60.171));

    let bytes = obj.pack();
    let back = VMap2obj::unpack(&bytes).unwrap();
    assert_eq!(back.type_, obj.type_);
    assert_approx_eq::assert_approx_eq!(f64::from(back.angle), f64::from(obj.angle), 1e-3);
    assert_approx_eq::assert_approx_eq!(f64::from(back.scale), f64::from(obj.scale));
    assert_eq!(back.align, obj.align);
    assert_eq!(back.dir, obj.dir);
    assert_eq!(back.name, obj.name);
    assert_eq!(back.comm, obj.comm);
    assert_eq!(back.src, obj.src);
    assert_eq!(back.tags, obj.tags);
    assert_eq!(back.ref_type, obj.ref_type);
    assert_approx_eq::assert_approx_eq!(back.ref_pt.x, obj.ref_pt.x, 1e-6);
    assert_approx_eq::assert_approx_eq!(back.ref_pt.y, obj.ref_pt.y, 1e-6);
    assert_eq!(back.coords.0.len(), 1);
    assert_approx_eq::assert_approx_eq!(back.coords.0[0].0[0].x, 24.901, 1e-6);
  }

  #[test]
  fn pack_omits_default_header_fields() {
    let obj = VMap2obj::new(VMap2objClass::Line, 1);
    let bytes = obj.pack();
    // Only the 8-byte class/type header: no TLV records for defaults.
    assert_eq!(bytes.len(), 8);
  }

  #[test]
  fn unpack_skips_unknown_tags() {
    let obj = VMap2obj::new(VMap2objClass::Line, 2);
    let mut bytes = obj.pack();
    push_tlv(&mut bytes, *b"xtra", b"future field");
    push_tlv(&mut bytes, TAG_NAME, b"still readable");
    let back = VMap2obj::unpack(&bytes).unwrap();
    assert_eq!(back.name, "still readable");
  }

  #[test]
  fn coordinates_fold_into_canonical_range() {
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = MultiLine::single_point(Point::new(190.0, 60.0));
    let bytes = obj.pack();
    let back = VMap2obj::unpack(&bytes).unwrap();
    assert_approx_eq::assert_approx_eq!(back.coords.0[0].0[0].x, -170.0, 1e-6);
  }

  #[test]
  fn ordering_treats_nan_angle_as_greatest() {
    let mut a = VMap2obj::new(VMap2objClass::Point, 1);
    let mut b = VMap2obj::new(VMap2objClass::Point, 1);
    a.angle = 10.0;
    b.angle = f32::NAN;
    assert_eq!(a.cmp(&b), Ordering::Less);
  }
}
