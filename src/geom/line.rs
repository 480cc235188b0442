//! Polylines and multi-polylines: sequences of [`Point`]s with the
//! geometric operations the store and renderer need (bbox, length,
//! smoothing, crop, simplification, convex hull).

use serde::{Deserialize, Serialize};

use super::point::Point;
use super::rect::Rect;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line(pub Vec<Point>);

impl Line {
  #[must_use]
  pub fn new(pts: Vec<Point>) -> Self {
    Self(pts)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.0.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  #[must_use]
  pub fn bbox(&self) -> Rect {
    self.0.iter().fold(Rect::empty(), |acc, p| acc.extend_point(p))
  }

  /// Sum of 2D segment lengths.
  #[must_use]
  pub fn length(&self) -> f64 {
    self.0.windows(2).map(|w| w[0].dist2d(&w[1])).sum()
  }

  #[must_use]
  pub fn is_closed(&self) -> bool {
    match (self.0.first(), self.0.last()) {
      (Some(a), Some(b)) if self.0.len() > 1 => a == b,
      _ => false,
    }
  }

  /// Close the line by appending the first point if it is not already
  /// closed. At most one point is added.
  #[must_use]
  pub fn closed(&self) -> Self {
    if self.0.len() < 2 || self.is_closed() {
      return self.clone();
    }
    let mut pts = self.0.clone();
    pts.push(pts[0]);
    Self(pts)
  }

  /// Remove a duplicated terminal point if the line is closed.
  #[must_use]
  pub fn opened(&self) -> Self {
    if self.0.len() < 2 || !self.is_closed() {
      return self.clone();
    }
    let mut pts = self.0.clone();
    pts.pop();
    Self(pts)
  }

  #[must_use]
  pub fn reversed(&self) -> Self {
    let mut pts = self.0.clone();
    pts.reverse();
    Self(pts)
  }

  /// Flip vertically around the line's own bounding-box center.
  #[must_use]
  pub fn flip_v(&self) -> Self {
    let bb = self.bbox();
    let cy = bb.center().y;
    Self(self.0.iter().map(|p| Point::new3(p.x, 2.0 * cy - p.y, p.z)).collect())
  }

  #[must_use]
  pub fn rotated(&self, center: &Point, angle_deg: f64) -> Self {
    Self(self.0.iter().map(|p| p.rotated(center, angle_deg)).collect())
  }

  #[must_use]
  pub fn rint(&self) -> Self {
    Self(self.0.iter().map(Point::rint).collect())
  }

  #[must_use]
  pub fn floor(&self) -> Self {
    Self(self.0.iter().map(Point::floor).collect())
  }

  #[must_use]
  pub fn ceil(&self) -> Self {
    Self(self.0.iter().map(Point::ceil).collect())
  }

  /// Nearest point on the polyline to `p`, with its squared distance.
  #[must_use]
  pub fn nearest_point(&self, p: &Point) -> Option<(Point, f64)> {
    if self.0.is_empty() {
      return None;
    }
    if self.0.len() == 1 {
      return Some((self.0[0], p.dist2d(&self.0[0]).powi(2)));
    }
    self
      .0
      .windows(2)
      .map(|w| nearest_on_segment(p, &w[0], &w[1]))
      .min_by(|a, b| a.1.total_cmp(&b.1))
  }

  /// Simple moving-average smoothing over a window of `2*radius + 1`
  /// points; endpoints are kept unchanged.
  #[must_use]
  pub fn smoothed(&self, radius: usize) -> Self {
    if radius == 0 || self.0.len() < 3 {
      return self.clone();
    }
    let n = self.0.len();
    let pts = (0..n)
      .map(|i| {
        if i == 0 || i == n - 1 {
          return self.0[i];
        }
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n - 1);
        let window = &self.0[lo..=hi];
        let (sx, sy, sz) = window.iter().fold((0.0, 0.0, 0.0), |(sx, sy, sz), p| (sx + p.x, sy + p.y, sz + p.z));
        let len = window.len() as f64;
        Point::new3(sx / len, sy / len, sz / len)
      })
      .collect();
    Self(pts)
  }

  /// Ramer-Douglas-Peucker simplification with tolerance `eps` (2D).
  #[must_use]
  pub fn simplified(&self, eps: f64) -> Self {
    if self.0.len() < 3 {
      return self.clone();
    }
    let mut keep = vec![false; self.0.len()];
    keep[0] = true;
    keep[self.0.len() - 1] = true;
    rdp_mark(&self.0, 0, self.0.len() - 1, eps, &mut keep);
    Self(self.0.iter().zip(keep).filter_map(|(p, k)| k.then_some(*p)).collect())
  }

  /// Crop this line against `rect`, producing zero or more segments that
  /// lie inside it. Endpoints introduced by the crop land exactly on the
  /// rectangle boundary (Liang-Barsky per segment, segments re-chained when
  /// consecutive).
  #[must_use]
  pub fn crop_rect(&self, rect: &Rect) -> Vec<Line> {
    if self.0.len() < 2 || rect.is_empty() {
      return Vec::new();
    }
    let mut segments: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    for w in self.0.windows(2) {
      if let Some((a, b)) = clip_segment(w[0], w[1], rect) {
        if let Some(last) = current.last() {
          if *last != a {
            if current.len() >= 2 {
              segments.push(std::mem::take(&mut current));
            } else {
              current.clear();
            }
          }
        }
        if current.is_empty() {
          current.push(a);
        }
        current.push(b);
      } else if current.len() >= 2 {
        segments.push(std::mem::take(&mut current));
      } else {
        current.clear();
      }
    }
    if current.len() >= 2 {
      segments.push(current);
    }
    segments.into_iter().map(Line).collect()
  }
}

fn nearest_on_segment(p: &Point, a: &Point, b: &Point) -> (Point, f64) {
  let dx = b.x - a.x;
  let dy = b.y - a.y;
  let len_sq = dx * dx + dy * dy;
  if len_sq < 1e-12 {
    return (*a, p.dist2d(a).powi(2));
  }
  let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
  let proj = Point::new(a.x + t * dx, a.y + t * dy);
  (proj, p.dist2d(&proj).powi(2))
}

fn rdp_mark(pts: &[Point], lo: usize, hi: usize, eps: f64, keep: &mut [bool]) {
  if hi <= lo + 1 {
    return;
  }
  let (a, b) = (pts[lo], pts[hi]);
  let (mut max_d, mut max_i) = (0.0, lo);
  for i in (lo + 1)..hi {
    let (_, d2) = nearest_on_segment(&pts[i], &a, &b);
    let d = d2.sqrt();
    if d > max_d {
      max_d = d;
      max_i = i;
    }
  }
  if max_d > eps {
    keep[max_i] = true;
    rdp_mark(pts, lo, max_i, eps, keep);
    rdp_mark(pts, max_i, hi, eps, keep);
  }
}

/// Liang-Barsky line clipping against an axis-aligned rectangle; returns
/// the clipped segment endpoints, with points on the cutter landing exactly
/// on the rectangle boundary.
fn clip_segment(a: Point, b: Point, rect: &Rect) -> Option<(Point, Point)> {
  let (dx, dy) = (b.x - a.x, b.y - a.y);
  let mut t0 = 0.0f64;
  let mut t1 = 1.0f64;
  let checks = [(-dx, a.x - rect.x1), (dx, rect.x2 - a.x), (-dy, a.y - rect.y1), (dy, rect.y2 - a.y)];
  for (p, q) in checks {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
      continue;
    }
    let r = q / p;
    if p < 0.0 {
      if r > t1 {
        return None;
      }
      if r > t0 {
        t0 = r;
      }
    } else {
      if r < t0 {
        return None;
      }
      if r < t1 {
        t1 = r;
      }
    }
  }
  if t0 > t1 {
    return None;
  }
  let interp = |t: f64| Point::new3(a.x + t * dx, a.y + t * dy, a.z + t * (b.z - a.z));
  Some((interp(t0), interp(t1)))
}

/// Andrew's monotone-chain convex hull over the 2D projection of `pts`.
#[must_use]
pub fn convex_hull(pts: &[Point]) -> Vec<Point> {
  let mut sorted: Vec<Point> = pts.to_vec();
  sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
  sorted.dedup_by(|a, b| a.x == b.x && a.y == b.y);
  if sorted.len() < 3 {
    return sorted;
  }

  fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
  }

  let mut lower: Vec<Point> = Vec::new();
  for p in &sorted {
    while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
      lower.pop();
    }
    lower.push(*p);
  }
  let mut upper: Vec<Point> = Vec::new();
  for p in sorted.iter().rev() {
    while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
      upper.pop();
    }
    upper.push(*p);
  }
  lower.pop();
  upper.pop();
  lower.extend(upper);
  lower
}

/// An ordered sequence of [`Line`]s. For polygons, the first entry is the
/// outer ring and the rest are holes (interpreted with the even-odd rule).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLine(pub Vec<Line>);

impl MultiLine {
  #[must_use]
  pub fn new(lines: Vec<Line>) -> Self {
    Self(lines)
  }

  #[must_use]
  pub fn single_point(p: Point) -> Self {
    Self(vec![Line(vec![p])])
  }

  #[must_use]
  pub fn bbox(&self) -> Rect {
    self.0.iter().fold(Rect::empty(), |acc, l| acc.extend(&l.bbox()))
  }

  #[must_use]
  pub fn length(&self) -> f64 {
    self.0.iter().map(Line::length).sum()
  }

  #[must_use]
  pub fn crop_rect(&self, rect: &Rect) -> Self {
    Self(self.0.iter().flat_map(|l| l.crop_rect(rect)).collect())
  }

  #[must_use]
  pub fn rotated(&self, center: &Point, angle_deg: f64) -> Self {
    Self(self.0.iter().map(|l| l.rotated(center, angle_deg)).collect())
  }

  /// Even-odd point-in-polygon test treating the first ring as outer and
  /// the rest as holes.
  #[must_use]
  pub fn contains_point(&self, p: &Point) -> bool {
    let mut inside = false;
    for ring in &self.0 {
      if point_in_ring(p, &ring.0) {
        inside = !inside;
      }
    }
    inside
  }
}

fn point_in_ring(p: &Point, ring: &[Point]) -> bool {
  if ring.len() < 3 {
    return false;
  }
  let mut inside = false;
  let mut j = ring.len() - 1;
  for i in 0..ring.len() {
    let (pi, pj) = (ring[i], ring[j]);
    if ((pi.y > p.y) != (pj.y > p.y))
      && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
    {
      inside = !inside;
    }
    j = i;
  }
  inside
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn close_adds_at_most_one_point() {
    let l = Line::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)]);
    let closed = l.closed();
    assert_eq!(closed.len(), 4);
    assert_eq!(closed.closed().len(), 4);
  }

  #[test]
  fn open_removes_duplicated_terminal_point() {
    let l = Line::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.0)]);
    let opened = l.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened.opened().len(), 2);
  }

  #[test]
  fn crop_endpoints_land_on_cutter() {
    let l = Line::new(vec![Point::new(-1.0, 0.5), Point::new(2.0, 0.5)]);
    let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
    let pieces = l.crop_rect(&rect);
    assert_eq!(pieces.len(), 1);
    assert_approx_eq::assert_approx_eq!(pieces[0].0[0].x, 0.0);
    assert_approx_eq::assert_approx_eq!(pieces[0].0[1].x, 1.0);
  }

  #[test]
  fn crop_preserves_connectivity_for_multiple_crossings() {
    let l = Line::new(vec![
      Point::new(-1.0, 0.5),
      Point::new(0.5, 0.5),
      Point::new(2.0, 0.5),
      Point::new(0.5, -1.0),
    ]);
    let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
    let pieces = l.crop_rect(&rect);
    assert_eq!(pieces.len(), 1);
    assert_eq!(pieces[0].len(), 3);
  }

  #[test]
  fn simplify_keeps_endpoints() {
    let l = Line::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.01), Point::new(2.0, 0.0)]);
    let simplified = l.simplified(1.0);
    assert_eq!(simplified.len(), 2);
  }

  #[test]
  fn convex_hull_of_square_with_interior_point() {
    let pts = vec![
      Point::new(0.0, 0.0),
      Point::new(1.0, 0.0),
      Point::new(1.0, 1.0),
      Point::new(0.0, 1.0),
      Point::new(0.5, 0.5),
    ];
    let hull = convex_hull(&pts);
    assert_eq!(hull.len(), 4);
  }

  #[test]
  fn even_odd_with_hole() {
    let outer = Line::new(vec![
      Point::new(0.0, 0.0),
      Point::new(4.0, 0.0),
      Point::new(4.0, 4.0),
      Point::new(0.0, 4.0),
      Point::new(0.0, 0.0),
    ]);
    let hole = Line::new(vec![
      Point::new(1.0, 1.0),
      Point::new(3.0, 1.0),
      Point::new(3.0, 3.0),
      Point::new(1.0, 3.0),
      Point::new(1.0, 1.0),
    ]);
    let poly = MultiLine::new(vec![outer, hole]);
    assert!(poly.contains_point(&Point::new(0.5, 0.5)));
    assert!(!poly.contains_point(&Point::new(2.0, 2.0)));
  }
}
