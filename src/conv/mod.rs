//! Coordinate conversions: the `Conv` tagged enum (Identity, Affine,
//! Projection, Composite) behind a single `Conversion` trait, with
//! accuracy-aware batch transforms implemented once as default methods.

pub mod affine;
pub mod proj;

use crate::error::ConversionError;
use crate::geom::{Line, MultiLine, Point, Rect};

pub use affine::Affine2D;
pub use proj::TransverseMercator;

/// Default accuracy target for densifying transforms, in source units.
pub const DEFAULT_ACCURACY: f64 = 0.5;
const MAX_BISECT_DEPTH: u32 = 16;

/// A named endpoint of a [`Proj`] conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedProjection {
  /// Identity lon/lat in degrees (the "WGS" alias).
  Wgs,
  /// Spherical Web Mercator meters (the "WEB"/"EWEB" aliases).
  Web,
  /// An explicit transverse-Mercator zone (Finnish KKJ/ETRS-TM35FIN,
  /// an explicit `SU<N>`/`SU<N>N` zone, or any custom `+lon_0=...` system).
  Tmerc(TransverseMercator),
  /// "SU automatic 6-degree zones": the easting's megameter prefix
  /// selects the zone and reference meridian.
  SuAuto,
}

impl NamedProjection {
  /// Expand the aliases named in the reference format (`WGS`, `WEB`,
  /// `EWEB`, `FI`/`KKJ`, `ETRS-TM35FIN`, `GB`, `CH`, `SU_LL`, `SU`,
  /// `SU<N>`, `SU<N>N`) into a concrete projection, or treat the string
  /// as an explicit zone spec of the form `SU<lon0>` / `SU<lon0>N`.
  pub fn from_alias(alias: &str) -> Result<Self, ConversionError> {
    match alias {
      "WGS" | "SU_LL" => Ok(Self::Wgs),
      "WEB" | "EWEB" => Ok(Self::Web),
      "FI" | "KKJ" => Ok(Self::Tmerc(TransverseMercator::new(27.0, 3_500_000.0, 0.0, 1.0))),
      "ETRS-TM35FIN" | "ETRS89" => Ok(Self::Tmerc(TransverseMercator::new(27.0, 500_000.0, 0.0, 0.9996))),
      "GB" => Ok(Self::Tmerc(TransverseMercator::new(-2.0, 400_000.0, -100_000.0, 0.9996012717))),
      "CH" => Ok(Self::Tmerc(TransverseMercator::new(7.439_583_333_333_333, 600_000.0, 200_000.0, 1.0))),
      "SU" => Ok(Self::SuAuto),
      s if s.len() > 2 && &s[0..2] == "SU" => {
        let no_prefix = s.ends_with('N');
        let num_part = if no_prefix { &s[2..s.len() - 1] } else { &s[2..] };
        let lon0: i64 = num_part
          .parse()
          .map_err(|_| ConversionError::ProjInit { proj: alias.into(), reason: "bad SU zone number".into() })?;
        if (lon0 - 3).rem_euclid(6) != 0 {
          return Err(ConversionError::ProjInit {
            proj: alias.into(),
            reason: "central meridian must have the form 3+n*6".into(),
          });
        }
        Ok(Self::Tmerc(proj::su_zone_tm(lon0 as f64, !no_prefix)))
      }
      other => Err(ConversionError::ProjInit { proj: other.into(), reason: "unknown projection alias".into() }),
    }
  }

  fn to_lonlat(&self, p: Point) -> Result<Point, ConversionError> {
    match self {
      Self::Wgs => Ok(p),
      Self::Web => {
        let (lon, lat) = proj::web_mercator_backward(p.x, p.y);
        Ok(Point::new3(lon, lat, p.z))
      }
      Self::Tmerc(tm) => {
        let (lon, lat) = tm.backward(p.x, p.y)?;
        Ok(Point::new3(lon, lat, p.z))
      }
      Self::SuAuto => {
        let (pref, lon0) = proj::su_zone_from_prefix(p.x);
        let tm = proj::su_zone_tm(lon0, false);
        let (lon_rel, lat) = tm.backward(p.x - pref as f64 * 1_000_000.0, p.y)?;
        Ok(Point::new3(lon_rel + lon0, lat, p.z))
      }
    }
  }

  fn from_lonlat(&self, p: Point) -> Result<Point, ConversionError> {
    match self {
      Self::Wgs => Ok(p),
      Self::Web => {
        let (x, y) = proj::web_mercator_forward(p.x, p.y);
        Ok(Point::new3(x, y, p.z))
      }
      Self::Tmerc(tm) => {
        let (x, y) = tm.forward(p.x, p.y)?;
        Ok(Point::new3(x, y, p.z))
      }
      Self::SuAuto => {
        let (pref, lon0) = proj::su_zone_from_lon(p.x);
        let tm = proj::su_zone_tm(lon0, false);
        let (x_local, y) = tm.forward(p.x - lon0, p.y)?;
        Ok(Point::new3(x_local + pref as f64 * 1_000_000.0, y, p.z))
      }
    }
  }

  fn is_degrees(&self) -> bool {
    matches!(self, Self::Wgs)
  }
}

/// A forward/backward projection between two named coordinate systems,
/// routed through geographic lon/lat as a common pivot.
#[derive(Debug, Clone, PartialEq)]
pub struct Proj {
  pub src: NamedProjection,
  pub dst: NamedProjection,
  /// When true, altitude is left untouched rather than carried through
  /// the (here trivial) 3D part of the projection.
  pub use_2d: bool,
}

impl Proj {
  pub fn new(src: &str, dst: &str) -> Result<Self, ConversionError> {
    Ok(Self { src: NamedProjection::from_alias(src)?, dst: NamedProjection::from_alias(dst)?, use_2d: false })
  }
}

/// The common interface every conversion variant implements: point-level
/// forward/backward, accuracy-aware batch transforms (default methods,
/// built on the point-level primitives) and axis rescaling.
pub trait Conversion {
  fn frw_pt(&self, p: Point) -> Result<Point, ConversionError>;
  fn bck_pt(&self, p: Point) -> Result<Point, ConversionError>;
  fn rescale_src(&mut self, k: f64);
  fn rescale_dst(&mut self, k: f64);

  /// Forward-transform a rectangle by densifying its boundary and taking
  /// the minimum bounding rectangle of the result, to within `acc` of the
  /// true transformed boundary.
  fn frw_acc_rect(&self, r: &Rect, acc: f64) -> Result<Rect, ConversionError> {
    let line = rect_boundary(r);
    let densified = self.frw_acc_line(&line, acc)?;
    Ok(densified.bbox())
  }

  fn bck_acc_rect(&self, r: &Rect, acc: f64) -> Result<Rect, ConversionError> {
    let line = rect_boundary(r);
    let densified = self.bck_acc_line(&line, acc)?;
    Ok(densified.bbox())
  }

  /// Forward-transform a polyline, recursively bisecting each segment
  /// until the transformed midpoint is within `acc` of the true
  /// transformed midpoint (or a depth limit is reached), so the result's
  /// Hausdorff distance from the true curve is bounded by `acc`.
  fn frw_acc_line(&self, l: &Line, acc: f64) -> Result<Line, ConversionError> {
    densify(l, acc, |p| self.frw_pt(p))
  }

  fn bck_acc_line(&self, l: &Line, acc: f64) -> Result<Line, ConversionError> {
    densify(l, acc, |p| self.bck_pt(p))
  }

  fn frw_acc_multiline(&self, ml: &MultiLine, acc: f64) -> Result<MultiLine, ConversionError> {
    Ok(MultiLine::new(ml.0.iter().map(|l| self.frw_acc_line(l, acc)).collect::<Result<_, _>>()?))
  }

  fn bck_acc_multiline(&self, ml: &MultiLine, acc: f64) -> Result<MultiLine, ConversionError> {
    Ok(MultiLine::new(ml.0.iter().map(|l| self.bck_acc_line(l, acc)).collect::<Result<_, _>>()?))
  }
}

fn rect_boundary(r: &Rect) -> Line {
  let c = r.corners();
  Line::new(vec![c[0], c[1], c[2], c[3], c[0]])
}

/// Shared accuracy-aware densification: transform every input vertex
/// exactly, then recursively bisect segments whose transformed midpoint
/// deviates from the true transformed midpoint by more than `acc`.
fn densify<F>(l: &Line, acc: f64, f: F) -> Result<Line, ConversionError>
where
  F: Fn(Point) -> Result<Point, ConversionError>,
{
  if l.0.len() < 2 {
    return Ok(Line::new(l.0.iter().map(|p| f(*p)).collect::<Result<_, _>>()?));
  }
  let mut out = vec![f(l.0[0])?];
  for w in l.0.windows(2) {
    bisect(w[0], w[1], &f, acc, 0, &mut out)?;
  }
  Ok(Line::new(out))
}

/// Appends the transform of `b` (and any intermediate points needed to
/// stay within `acc`) to `out`, given that the transform of `a` is
/// already its last element.
fn bisect<F>(a: Point, b: Point, f: &F, acc: f64, depth: u32, out: &mut Vec<Point>) -> Result<(), ConversionError>
where
  F: Fn(Point) -> Result<Point, ConversionError>,
{
  let fa = *out.last().expect("caller pushes f(a) before bisecting");
  let fb = f(b)?;
  if depth >= MAX_BISECT_DEPTH {
    out.push(fb);
    return Ok(());
  }
  let mid = Point::new3((a.x + b.x) / 2.0, (a.y + b.y) / 2.0, (a.z + b.z) / 2.0);
  let f_mid_true = f(mid)?;
  let f_mid_linear = Point::new3((fa.x + fb.x) / 2.0, (fa.y + fb.y) / 2.0, (fa.z + fb.z) / 2.0);
  if f_mid_true.dist2d(&f_mid_linear) <= acc {
    out.push(fb);
    return Ok(());
  }
  bisect(a, mid, f, acc, depth + 1, out)?;
  bisect(mid, b, f, acc, depth + 1, out)
}

/// A conversion variant: identity, 2D affine, named projection, or an
/// ordered composition of conversions (forward head-to-tail, backward
/// tail-to-head).
#[derive(Debug, Clone, PartialEq)]
pub enum Conv {
  Identity,
  Affine(Affine2D),
  Proj(Box<Proj>),
  Composite(Vec<Conv>),
}

impl Conv {
  #[must_use]
  pub fn identity() -> Self {
    Self::Identity
  }

  #[must_use]
  pub fn affine(a: Affine2D) -> Self {
    Self::Affine(a)
  }

  pub fn proj(src: &str, dst: &str) -> Result<Self, ConversionError> {
    Ok(Self::Proj(Box::new(Proj::new(src, dst)?)))
  }

  #[must_use]
  pub fn compose(steps: Vec<Conv>) -> Self {
    Self::Composite(steps)
  }

  /// Whether the source endpoint of this conversion is in degrees
  /// (inherited from the first element for a composition).
  #[must_use]
  pub fn src_is_degrees(&self) -> bool {
    match self {
      Self::Identity | Self::Affine(_) => false,
      Self::Proj(p) => p.src.is_degrees(),
      Self::Composite(steps) => steps.first().is_some_and(Conv::src_is_degrees),
    }
  }

  /// Whether the destination endpoint is in degrees (inherited from the
  /// last element for a composition).
  #[must_use]
  pub fn dst_is_degrees(&self) -> bool {
    match self {
      Self::Identity | Self::Affine(_) => false,
      Self::Proj(p) => p.dst.is_degrees(),
      Self::Composite(steps) => steps.last().is_some_and(Conv::dst_is_degrees),
    }
  }
}

impl Conversion for Conv {
  fn frw_pt(&self, p: Point) -> Result<Point, ConversionError> {
    match self {
      Self::Identity => Ok(p),
      Self::Affine(a) => Ok(a.apply(p)),
      Self::Proj(proj) => {
        let lonlat = proj.src.to_lonlat(p)?;
        let mut out = proj.dst.from_lonlat(lonlat)?;
        if proj.use_2d {
          out.z = p.z;
        }
        Ok(out)
      }
      Self::Composite(steps) => steps.iter().try_fold(p, |acc, step| step.frw_pt(acc)),
    }
  }

  fn bck_pt(&self, p: Point) -> Result<Point, ConversionError> {
    match self {
      Self::Identity => Ok(p),
      Self::Affine(a) => a.inverse().map(|inv| inv.apply(p)),
      Self::Proj(proj) => {
        let lonlat = proj.dst.to_lonlat(p)?;
        let mut out = proj.src.from_lonlat(lonlat)?;
        if proj.use_2d {
          out.z = p.z;
        }
        Ok(out)
      }
      Self::Composite(steps) => steps.iter().rev().try_fold(p, |acc, step| step.bck_pt(acc)),
    }
  }

  fn rescale_src(&mut self, k: f64) {
    match self {
      Self::Identity => {}
      Self::Affine(a) => {
        a.c *= k;
        a.f *= k;
        a.a *= k;
        a.b *= k;
        a.d *= k;
        a.e *= k;
      }
      Self::Proj(_) => {}
      Self::Composite(steps) => {
        if let Some(first) = steps.first_mut() {
          first.rescale_src(k);
        }
      }
    }
  }

  fn rescale_dst(&mut self, k: f64) {
    match self {
      Self::Identity => {}
      Self::Affine(a) => {
        a.a *= k;
        a.b *= k;
        a.c *= k;
        a.d *= k;
        a.e *= k;
        a.f *= k;
      }
      Self::Proj(_) => {}
      Self::Composite(steps) => {
        if let Some(last) = steps.last_mut() {
          last.rescale_dst(k);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identity_src_and_dst_unchanged() {
    let id = Conv::identity();
    let p = Point::new(1.0, 2.0);
    assert_eq!(id.frw_pt(p).unwrap().x, p.x);
    assert_eq!(id.bck_pt(p).unwrap().x, p.x);
  }

  #[test]
  fn projection_roundtrip_within_accuracy() {
    let conv = Conv::proj("WGS", "SU39").unwrap();
    let p = Point::new(39.3, 54.5);
    let fwd = conv.frw_pt(p).unwrap();
    let back = conv.bck_pt(fwd).unwrap();
    assert!(back.dist2d(&p) < 1e-6);
  }

  #[test]
  fn su_auto_roundtrip_across_zone() {
    let conv = Conv::proj("WGS", "SU").unwrap();
    let p = Point::new(27.4, 60.1);
    let fwd = conv.frw_pt(p).unwrap();
    let back = conv.bck_pt(fwd).unwrap();
    assert!(back.dist2d(&p) < 1e-6);
  }

  #[test]
  fn composite_applies_forward_head_to_tail() {
    let aff = Conv::affine(Affine2D::from_rotation(Point::new(0.0, 0.0), 0.0, 2.0));
    let comp = Conv::compose(vec![aff.clone(), aff.clone()]);
    let p = Point::new(1.0, 0.0);
    let direct = aff.frw_pt(aff.frw_pt(p).unwrap()).unwrap();
    let composed = comp.frw_pt(p).unwrap();
    assert_approx_eq::assert_approx_eq!(direct.x, composed.x);
  }

  #[test]
  fn point_90_degrees_from_the_central_meridian_is_out_of_domain() {
    // lon0=39 (SU39's central meridian), lat=0: cos(lat)*sin(lon-lon0) hits
    // exactly 1.0, the transverse-Mercator projection's asymptote.
    let conv = Conv::proj("WGS", "SU39").unwrap();
    let err = conv.frw_pt(Point::new(129.0, 0.0)).unwrap_err();
    assert!(matches!(err, ConversionError::OutOfDomain { .. }));
  }

  #[test]
  fn a_point_well_inside_the_zone_converts_cleanly() {
    let conv = Conv::proj("WGS", "SU39").unwrap();
    assert!(conv.frw_pt(Point::new(40.0, 54.0)).is_ok());
  }

  #[test]
  fn accuracy_aware_line_bounds_deviation() {
    let conv = Conv::proj("WGS", "SU39").unwrap();
    let l = Line::new(vec![Point::new(38.0, 53.0), Point::new(40.0, 56.0)]);
    let densified = conv.frw_acc_line(&l, 50.0).unwrap();
    assert!(densified.len() >= 2);
  }
}
