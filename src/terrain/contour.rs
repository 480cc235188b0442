//! Raster contour extraction (§4.5), ported from `image_cnt.cpp`'s
//! per-cell crossing algorithm: walk every grid cell, find where its four
//! sides cross each requested level, and merge the resulting oriented
//! segments into polylines (or, in closed mode, polygons that also follow
//! the grid boundary).

use std::collections::HashMap;

use crate::geom::{Line, MultiLine, Point};

/// Segment endpoints are snapped to this many grid units before merging,
/// so floating-point noise from two different edges never splits what
/// should be one shared vertex.
const PT_ACC: f64 = 1e-4;

/// A regular scalar grid, row-major with y increasing downward.
#[derive(Debug, Clone)]
pub struct Grid {
  pub width: usize,
  pub height: usize,
  values: Vec<f64>,
}

impl Grid {
  /// # Panics
  /// If `values.len() != width * height`.
  #[must_use]
  pub fn new(width: usize, height: usize, values: Vec<f64>) -> Self {
    assert_eq!(values.len(), width * height, "grid values must be width*height long");
    Self { width, height, values }
  }

  #[must_use]
  pub fn get(&self, x: usize, y: usize) -> f64 {
    self.values[y * self.width + x]
  }
}

fn corner(k: usize) -> (i64, i64) {
  let k = k % 4;
  (if k / 2 == 1 { 1 } else { 0 }, if k % 3 > 0 { 1 } else { 0 })
}

fn scale(v: f64) -> i64 {
  (v / PT_ACC).round() as i64
}

fn unscale(p: (i64, i64)) -> Point {
  Point::new(p.0 as f64 * PT_ACC, p.1 as f64 * PT_ACC)
}

/// The level sequence crossing one cell edge: explicit bounds if given,
/// otherwise the edge's own value range rounded out to `step` multiples.
fn levels_for(v1: f64, v2: f64, vmin: Option<f64>, vmax: Option<f64>, step: f64) -> Vec<f64> {
  let lo = vmin.unwrap_or_else(|| (v1.min(v2) / step).floor() * step);
  let hi = vmax.unwrap_or_else(|| (v1.max(v2) / step).ceil() * step);
  if lo > hi {
    return Vec::new();
  }
  let n = ((hi - lo) / step).floor() as i64;
  (0..=n).map(|i| lo + i as f64 * step).collect()
}

/// Oriented segments keyed by their scaled start point; several segments
/// can share a start point (e.g. a contour that touches itself).
type SegMap = HashMap<(i64, i64), Vec<(i64, i64)>>;

fn push_seg(segs: &mut SegMap, p1: Point, p2: Point) {
  segs.entry((scale(p1.x), scale(p1.y))).or_default().push((scale(p2.x), scale(p2.y)));
}

fn pop_any(segs: &mut SegMap, key: (i64, i64)) -> Option<(i64, i64)> {
  let v = segs.get_mut(&key)?;
  let next = v.pop();
  if v.is_empty() {
    segs.remove(&key);
  }
  next
}

fn norm(p: Point) -> Point {
  let len = (p.x * p.x + p.y * p.y).sqrt();
  if len < 1e-12 { Point::new(0.0, 0.0) } else { Point::new(p.x / len, p.y / len) }
}

/// Chains oriented segments sharing endpoints into polylines, dropping a
/// middle vertex whenever its neighbors keep the same direction.
fn merge_segments(mut segs: SegMap) -> MultiLine {
  let mut lines = Vec::new();
  while let Some(&start) = segs.keys().next() {
    let Some(mut cur) = pop_any(&mut segs, start) else { continue };
    let mut pts = vec![unscale(start), unscale(cur)];
    let mut prev = start;
    while let Some(next) = pop_any(&mut segs, cur) {
      let a = unscale(prev);
      let b = unscale(cur);
      let c = unscale(next);
      if norm(b - a).dist2d(&norm(c - b)) < PT_ACC {
        pts.pop();
      }
      pts.push(c);
      prev = cur;
      cur = next;
    }
    lines.push(Line::new(pts));
  }
  MultiLine::new(lines)
}

/// Extracts contour lines (or, with `closed`, polygons bounded by the grid
/// edge) from `grid`. `vmin`/`vmax` fix the level range explicitly; `None`
/// auto-ranges from each cell edge's own values, rounded out to `step`.
/// Returns `(level, geometry)` pairs sorted by level.
///
/// # Panics
/// If `step` is not positive.
#[must_use]
pub fn extract(grid: &Grid, vmin: Option<f64>, vmax: Option<f64>, step: f64, closed: bool) -> Vec<(f64, MultiLine)> {
  assert!(step > 0.0, "contour step must be positive");
  let w = grid.width;
  let h = grid.height;
  let level_key = |v: f64| (v / PT_ACC).round() as i64;
  let mut segs: HashMap<i64, SegMap> = HashMap::new();

  if w < 2 || h < 2 {
    return Vec::new();
  }

  for y in 0..h - 1 {
    for x in 0..w - 1 {
      let mut pending: HashMap<i64, Point> = HashMap::new();
      for k in 0..4 {
        let (dx1, dy1) = corner(k);
        let (dx2, dy2) = corner(k + 1);
        let (x1, y1) = (x as i64 + dx1, y as i64 + dy1);
        let (x2, y2) = (x as i64 + dx2, y as i64 + dy2);
        let on_edge = |px: i64, py: i64| px == 0 || px as usize == w - 1 || py == 0 || py as usize == h - 1;
        let brd = on_edge(x1, y1) && on_edge(x2, y2);
        let p1 = Point::new(x1 as f64, y1 as f64);
        let p2 = Point::new(x2 as f64, y2 as f64);
        let v1 = grid.get(x1 as usize, y1 as usize);
        let v2 = grid.get(x2 as usize, y2 as usize);

        for vv in levels_for(v1, v2, vmin, vmax, step) {
          let lvl = level_key(vv);
          let entry = segs.entry(lvl).or_default();
          if brd && closed && v1 >= vv && v2 >= vv {
            push_seg(entry, p1, p2);
          }
          if (v1 - v2).abs() < f64::EPSILON {
            continue;
          }
          let d = (vv - v1) / (v2 - v1);
          if !(0.0..1.0).contains(&d) {
            continue;
          }
          let cr = Point::new(p1.x + (p2.x - p1.x) * d, p1.y + (p2.y - p1.y) * d);
          if let Some(prev) = pending.remove(&lvl) {
            if v1 > vv {
              push_seg(entry, cr, prev);
            }
            if v2 > vv {
              push_seg(entry, prev, cr);
            }
          } else {
            pending.insert(lvl, cr);
          }
          if brd && closed {
            if v1 > vv {
              push_seg(entry, p1, cr);
            }
            if v2 > vv {
              push_seg(entry, cr, p2);
            }
          }
        }
      }
    }
  }

  let mut out: Vec<(f64, MultiLine)> = segs.into_iter().map(|(lvl, s)| (lvl as f64 * PT_ACC, merge_segments(s))).collect();
  out.sort_by(|a, b| a.0.total_cmp(&b.0));
  out
}

/// How far a vertex pinned to grid column `x` may drift from `y0` towards
/// `target_dy` while every sample it passes stays within `vtol` of `v0`,
/// found by walking the column and linearly interpolating the exact
/// crossing of the tolerance band. Ported from `image_cnt.cpp`'s
/// `filter_line` (y-branch only: this crate's vertical-tolerance filter
/// only ever shifts vertices vertically, never horizontally).
fn clamp_vertical_drift(grid: &Grid, x: i64, y0: f64, target_dy: f64, v0: f64, vtol: f64) -> f64 {
  if target_dy == 0.0 || x < 0 || x as usize >= grid.width {
    return 0.0;
  }
  let dir = if target_dy > 0.0 { 1i64 } else { -1 };
  let y_limit = if dir > 0 { (y0 + target_dy).ceil() as i64 + 1 } else { (y0 + target_dy).floor() as i64 - 1 };
  let mut allowed = 0.0;
  let mut yy = if dir > 0 { y0.floor() as i64 + 1 } else { y0.ceil() as i64 - 1 };
  while yy != y_limit {
    if yy < 0 || yy as usize >= grid.height {
      break;
    }
    let v2 = grid.get(x as usize, yy as usize);
    if (v2 - v0).abs() < vtol {
      allowed = yy as f64 - y0;
    } else {
      let vv = v2 + if v2 - v0 > vtol { vtol } else { -vtol };
      let prev_yy = yy - dir;
      if prev_yy >= 0 && (prev_yy as usize) < grid.height {
        let v1 = grid.get(x as usize, prev_yy as usize);
        let d = (vv - v1) / (v2 - v1);
        if (0.0..1.0).contains(&d) {
          allowed = prev_yy as f64 + d - y0;
        }
      }
      break;
    }
    yy += dir;
  }
  if allowed.abs() > target_dy.abs() { target_dy } else { allowed }
}

/// Shifts vertices of `line` that sit exactly on a grid column towards the
/// straight path between their neighbors, by as much as the raster allows
/// while staying within `vtol` of the contour's own level `v0`. A no-op
/// for `vtol <= 0.0`.
pub fn smooth_to_tolerance(line: &mut Line, grid: &Grid, v0: f64, vtol: f64) {
  if vtol <= 0.0 || line.0.len() < 3 {
    return;
  }
  let n = line.0.len();
  let original = line.0.clone();
  for i in 0..n {
    let p0 = original[i];
    if (p0.x - p0.x.round()).abs() >= PT_ACC {
      continue;
    }
    let p1 = original[if i == 0 { n - 1 } else { i - 1 }];
    let p2 = original[if i + 1 == n { 0 } else { i + 1 }];
    let mut target_dy = (p1.y + p2.y) / 2.0 - p0.y;
    if (p2.x - p1.x).abs() > PT_ACC && (p2.x - p0.x) * (p0.x - p1.x) > 0.0 {
      target_dy = p1.y + (p2.y - p1.y) * (p0.x - p1.x) / (p2.x - p1.x) - p0.y;
    }
    let dy = clamp_vertical_drift(grid, p0.x.round() as i64, p0.y, target_dy, v0, vtol);
    if dy != 0.0 {
      line.0[i].y += dy;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pyramid(n: usize) -> Grid {
    let mut values = vec![0.0; n * n];
    let c = (n - 1) as f64 / 2.0;
    for y in 0..n {
      for x in 0..n {
        let d = ((x as f64 - c).abs()).max((y as f64 - c).abs());
        values[y * n + x] = (c - d).max(0.0);
      }
    }
    Grid::new(n, n, values)
  }

  #[test]
  fn extracts_a_nonempty_contour_through_a_pyramid() {
    let grid = pyramid(9);
    let levels = extract(&grid, Some(1.0), Some(1.0), 1.0, false);
    assert_eq!(levels.len(), 1);
    assert!(!levels[0].1.0.is_empty());
  }

  #[test]
  fn closed_mode_produces_longer_boundary_following_rings() {
    let grid = pyramid(9);
    let open = extract(&grid, Some(1.0), Some(1.0), 1.0, false);
    let closed = extract(&grid, Some(1.0), Some(1.0), 1.0, true);
    let open_len: f64 = open[0].1.length();
    let closed_len: f64 = closed[0].1.length();
    assert!(closed_len >= open_len);
  }

  #[test]
  fn auto_range_covers_the_grids_value_span() {
    let grid = pyramid(9);
    let levels = extract(&grid, None, None, 1.0, false);
    assert!(levels.len() >= 3);
  }

  #[test]
  fn zero_tolerance_smoothing_is_a_no_op() {
    let grid = pyramid(9);
    let mut line = Line::new(vec![Point::new(1.0, 2.0), Point::new(1.0, 3.0), Point::new(2.0, 4.0)]);
    let before = line.clone();
    smooth_to_tolerance(&mut line, &grid, 1.0, 0.0);
    assert_eq!(line.0[0], before.0[0]);
  }
}
