//! 2D affine coordinate transform.

use crate::error::ConversionError;
use crate::geom::Point;

/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f`. z is untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2D {
  pub a: f64,
  pub b: f64,
  pub c: f64,
  pub d: f64,
  pub e: f64,
  pub f: f64,
}

impl Affine2D {
  #[must_use]
  pub fn identity() -> Self {
    Self { a: 1.0, b: 0.0, c: 0.0, d: 0.0, e: 1.0, f: 0.0 }
  }

  /// Build from a rotation (degrees, CW) around `center`, optionally
  /// followed by a uniform scale.
  #[must_use]
  pub fn from_rotation(center: Point, angle_deg: f64, scale: f64) -> Self {
    let theta = angle_deg.to_radians();
    let (s, c) = theta.sin_cos();
    let a = scale * c;
    let b = -scale * s;
    let d = scale * s;
    let e = scale * c;
    let cc = c_shift(a, b, d, e, center);
    Self { a, b, c: cc.0, d, e, f: cc.1 }
  }

  /// Least-squares fit from matched point pairs (source -> destination).
  /// Requires at least 3 non-collinear pairs.
  pub fn from_point_pairs(pairs: &[(Point, Point)]) -> Result<Self, ConversionError> {
    if pairs.len() < 3 {
      return Err(ConversionError::ProjInit {
        proj: "affine".into(),
        reason: "at least 3 reference points are required".into(),
      });
    }
    // Solve two independent least-squares systems:
    //   x' = a*x + b*y + c
    //   y' = d*x + e*y + f
    let (row_a, row_b) = normal_equations(pairs);
    let a_coeffs = solve3(row_a).ok_or_else(|| ConversionError::ProjInit {
      proj: "affine".into(),
      reason: "reference points are collinear (singular system)".into(),
    })?;
    let b_coeffs = solve3(row_b).ok_or_else(|| ConversionError::ProjInit {
      proj: "affine".into(),
      reason: "reference points are collinear (singular system)".into(),
    })?;
    Ok(Self {
      a: a_coeffs[0],
      b: a_coeffs[1],
      c: a_coeffs[2],
      d: b_coeffs[0],
      e: b_coeffs[1],
      f: b_coeffs[2],
    })
  }

  #[must_use]
  pub fn apply(&self, p: Point) -> Point {
    Point::new3(self.a * p.x + self.b * p.y + self.c, self.d * p.x + self.e * p.y + self.f, p.z)
  }

  /// The inverse affine map; fails if the matrix is singular.
  pub fn inverse(&self) -> Result<Self, ConversionError> {
    let det = self.a * self.e - self.b * self.d;
    if det.abs() < 1e-12 {
      return Err(ConversionError::ProjInit { proj: "affine".into(), reason: "singular matrix".into() });
    }
    let a = self.e / det;
    let b = -self.b / det;
    let d = -self.d / det;
    let e = self.a / det;
    let c = -(a * self.c + b * self.f);
    let f = -(d * self.c + e * self.f);
    Ok(Self { a, b, c, d, e, f })
  }
}

fn c_shift(a: f64, b: f64, d: f64, e: f64, center: Point) -> (f64, f64) {
  (center.x - a * center.x - b * center.y, center.y - d * center.x - e * center.y)
}

/// Builds the 3x4 augmented normal-equation rows for the x' and y' fits.
fn normal_equations(pairs: &[(Point, Point)]) -> ([f64; 12], [f64; 12]) {
  // Each row vector holds [sum xx, sum xy, sum x, sum xTarget,
  //                        sum xy, sum yy, sum y, sum yTarget,
  //                        sum x,  sum y,  n,     sum target]
  let mut s = [0.0f64; 12];
  for (src, _) in pairs {
    s[0] += src.x * src.x;
    s[1] += src.x * src.y;
    s[2] += src.x;
    s[4] += src.x * src.y;
    s[5] += src.y * src.y;
    s[6] += src.y;
    s[8] += src.x;
    s[9] += src.y;
    s[10] += 1.0;
  }
  let mut row_a = s;
  let mut row_b = s;
  for (src, dst) in pairs {
    row_a[3] += src.x * dst.x;
    row_a[7] += src.y * dst.x;
    row_a[11] += dst.x;
    row_b[3] += src.x * dst.y;
    row_b[7] += src.y * dst.y;
    row_b[11] += dst.y;
  }
  (row_a, row_b)
}

/// Solves a 3x3 symmetric normal-equation system packed into 12 values
/// (three length-4 rows `[c0, c1, c2, rhs]`) via Gaussian elimination.
fn solve3(s: [f64; 12]) -> Option<[f64; 3]> {
  let mut m = [
    [s[0], s[1], s[2], s[3]],
    [s[4], s[5], s[6], s[7]],
    [s[8], s[9], s[10], s[11]],
  ];
  for col in 0..3 {
    let mut pivot = col;
    for row in (col + 1)..3 {
      if m[row][col].abs() > m[pivot][col].abs() {
        pivot = row;
      }
    }
    if m[pivot][col].abs() < 1e-12 {
      return None;
    }
    m.swap(col, pivot);
    for row in 0..3 {
      if row == col {
        continue;
      }
      let factor = m[row][col] / m[col][col];
      for k in 0..4 {
        m[row][k] -= factor * m[col][k];
      }
    }
  }
  Some([m[0][3] / m[0][0], m[1][3] / m[1][1], m[2][3] / m[2][2]])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identity_roundtrip() {
    let id = Affine2D::identity();
    let p = Point::new(3.0, 4.0);
    assert_eq!(id.apply(p).x, p.x);
  }

  #[test]
  fn from_rotation_preserves_center() {
    let center = Point::new(5.0, 5.0);
    let aff = Affine2D::from_rotation(center, 90.0, 1.0);
    let p = aff.apply(center);
    assert_approx_eq::assert_approx_eq!(p.x, center.x);
    assert_approx_eq::assert_approx_eq!(p.y, center.y);
  }

  #[test]
  fn from_point_pairs_exact_fit() {
    let pairs = [
      (Point::new(0.0, 0.0), Point::new(10.0, 20.0)),
      (Point::new(1.0, 0.0), Point::new(12.0, 20.0)),
      (Point::new(0.0, 1.0), Point::new(10.0, 22.0)),
      (Point::new(1.0, 1.0), Point::new(12.0, 22.0)),
    ];
    let aff = Affine2D::from_point_pairs(&pairs).unwrap();
    for (src, dst) in pairs {
      let p = aff.apply(src);
      assert_approx_eq::assert_approx_eq!(p.x, dst.x, 1e-6);
      assert_approx_eq::assert_approx_eq!(p.y, dst.y, 1e-6);
    }
  }

  #[test]
  fn inverse_undoes_forward() {
    let aff = Affine2D::from_rotation(Point::new(1.0, 1.0), 37.0, 2.0);
    let inv = aff.inverse().unwrap();
    let p = Point::new(3.0, -2.0);
    let back = inv.apply(aff.apply(p));
    assert_approx_eq::assert_approx_eq!(back.x, p.x, 1e-9);
    assert_approx_eq::assert_approx_eq!(back.y, p.y, 1e-9);
  }
}
