//! A geographic or projected point with an optional altitude.

use serde::{Deserialize, Serialize};

/// An ordered triple of reals. `z` defaults to `0.0` but may be `NaN`,
/// meaning "undefined altitude": 3D distance computations propagate that
/// `NaN` into their result, 2D distance never looks at `z` at all.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

impl Point {
  #[must_use]
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y, z: 0.0 }
  }

  #[must_use]
  pub fn new3(x: f64, y: f64, z: f64) -> Self {
    Self { x, y, z }
  }

  #[must_use]
  pub fn exact_eq(&self, other: &Self) -> bool {
    self.x.to_bits() == other.x.to_bits()
      && self.y.to_bits() == other.y.to_bits()
      && self.z.to_bits() == other.z.to_bits()
  }

  /// Euclidean distance in the x/y plane, ignoring `z`.
  #[must_use]
  pub fn dist2d(&self, other: &Self) -> f64 {
    let dx = self.x - other.x;
    let dy = self.y - other.y;
    (dx * dx + dy * dy).sqrt()
  }

  /// Euclidean distance including `z`. `NaN` on either side propagates.
  #[must_use]
  pub fn dist3d(&self, other: &Self) -> f64 {
    let dx = self.x - other.x;
    let dy = self.y - other.y;
    let dz = self.z - other.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
  }

  #[must_use]
  pub fn rint(&self) -> Self {
    Self { x: self.x.round(), y: self.y.round(), z: self.z }
  }

  #[must_use]
  pub fn floor(&self) -> Self {
    Self { x: self.x.floor(), y: self.y.floor(), z: self.z }
  }

  #[must_use]
  pub fn ceil(&self) -> Self {
    Self { x: self.x.ceil(), y: self.y.ceil(), z: self.z }
  }

  #[must_use]
  pub fn rotated(&self, center: &Self, angle_deg: f64) -> Self {
    let a = angle_deg.to_radians();
    let (s, c) = a.sin_cos();
    let dx = self.x - center.x;
    let dy = self.y - center.y;
    Self { x: center.x + dx * c - dy * s, y: center.y + dx * s + dy * c, z: self.z }
  }
}

impl std::ops::Add for Point {
  type Output = Self;
  fn add(self, rhs: Self) -> Self {
    Self { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z }
  }
}

impl std::ops::Sub for Point {
  type Output = Self;
  fn sub(self, rhs: Self) -> Self {
    Self { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z }
  }
}

impl std::ops::Mul<f64> for Point {
  type Output = Self;
  fn mul(self, k: f64) -> Self {
    Self { x: self.x * k, y: self.y * k, z: self.z }
  }
}

impl PartialEq for Point {
  fn eq(&self, other: &Self) -> bool {
    self.x == other.x && self.y == other.y && (self.z == other.z || (self.z.is_nan() && other.z.is_nan()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dist2d_ignores_altitude() {
    let a = Point::new3(0.0, 0.0, 10.0);
    let b = Point::new3(3.0, 4.0, f64::NAN);
    assert_approx_eq::assert_approx_eq!(a.dist2d(&b), 5.0);
  }

  #[test]
  fn dist3d_propagates_nan() {
    let a = Point::new3(0.0, 0.0, f64::NAN);
    let b = Point::new3(3.0, 4.0, 0.0);
    assert!(a.dist3d(&b).is_nan());
  }

  #[test]
  fn nan_altitude_distinct_from_zero() {
    let a = Point::new3(1.0, 1.0, f64::NAN);
    let b = Point::new3(1.0, 1.0, 0.0);
    assert_eq!(a, a);
    assert_ne!(a.z, b.z);
  }
}
