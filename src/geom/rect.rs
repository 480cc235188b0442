//! Axis-aligned rectangles.

use serde::{Deserialize, Serialize};

use super::point::Point;

/// An axis-aligned rectangle. May be empty (no enclosed area); emptiness is
/// tracked explicitly rather than inferred from `x2 < x1`, so a zero-sized
/// rectangle (`x1 == x2`) is distinct from an empty one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rect {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
  empty: bool,
}

impl Default for Rect {
  fn default() -> Self {
    Self::empty()
  }
}

impl Rect {
  #[must_use]
  pub fn empty() -> Self {
    Self { x1: 0.0, y1: 0.0, x2: 0.0, y2: 0.0, empty: true }
  }

  #[must_use]
  pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
    let (x1, x2) = (x1.min(x2), x1.max(x2));
    let (y1, y2) = (y1.min(y2), y1.max(y2));
    Self { x1, y1, x2, y2, empty: false }
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.empty
  }

  #[must_use]
  pub fn width(&self) -> f64 {
    if self.empty { 0.0 } else { self.x2 - self.x1 }
  }

  #[must_use]
  pub fn height(&self) -> f64 {
    if self.empty { 0.0 } else { self.y2 - self.y1 }
  }

  #[must_use]
  pub fn center(&self) -> Point {
    Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
  }

  #[must_use]
  pub fn contains_point(&self, p: &Point) -> bool {
    !self.empty && p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
  }

  #[must_use]
  pub fn intersects(&self, other: &Self) -> bool {
    if self.empty || other.empty {
      return false;
    }
    self.x1 <= other.x2 && self.x2 >= other.x1 && self.y1 <= other.y2 && self.y2 >= other.y1
  }

  #[must_use]
  pub fn extend(&self, other: &Self) -> Self {
    if self.empty {
      return *other;
    }
    if other.empty {
      return *self;
    }
    Self::new(self.x1.min(other.x1), self.y1.min(other.y1), self.x2.max(other.x2), self.y2.max(other.y2))
  }

  #[must_use]
  pub fn extend_point(&self, p: &Point) -> Self {
    self.extend(&Self::new(p.x, p.y, p.x, p.y))
  }

  /// Expand all sides outward by `margin` (in the rectangle's own units).
  #[must_use]
  pub fn framed(&self, margin: f64) -> Self {
    if self.empty {
      return *self;
    }
    Self::new(self.x1 - margin, self.y1 - margin, self.x2 + margin, self.y2 + margin)
  }

  #[must_use]
  pub fn corners(&self) -> [Point; 4] {
    [
      Point::new(self.x1, self.y1),
      Point::new(self.x2, self.y1),
      Point::new(self.x2, self.y2),
      Point::new(self.x1, self.y2),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_is_not_box() {
    let r = Rect::empty();
    assert!(r.is_empty());
    assert_eq!(r.width(), 0.0);
  }

  #[test]
  fn extend_with_empty_is_identity() {
    let r = Rect::new(0.0, 0.0, 1.0, 1.0);
    assert_eq!(r.extend(&Rect::empty()).x2, 1.0);
  }

  #[test]
  fn intersects_checks_overlap() {
    let a = Rect::new(0.0, 0.0, 2.0, 2.0);
    let b = Rect::new(1.0, 1.0, 3.0, 3.0);
    let c = Rect::new(5.0, 5.0, 6.0, 6.0);
    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
  }
}
