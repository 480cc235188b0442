//! The renderer (§4.4 Execution): walks a compiled [`Stylesheet`] against a
//! [`VMap2`] store and a pixel/WGS84 [`Conv`], producing an ordered
//! [`DrawCommand`] stream. The Cairo-like backend that would actually paint
//! those commands is out of scope here; this module's contract ends at the
//! command stream.

use crate::catalogue::TypeCatalogue;
use crate::conv::{Conv, Conversion, DEFAULT_ACCURACY};
use crate::error::Error;
use crate::geom::{Line, MultiLine, Point, Rect};
use crate::store::{VMap2, VMap2objAlign, VMap2objClass};
use crate::style::{CapStyle, Color, Feature, JoinStyle, StepHeader, Stylesheet};

/// One unit of drawing work. Paths are already in the target pixel space
/// (post [`Conv::bck_pt`]); a backend only has to rasterize them.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
  /// Emitted instead of any step when the scale fallback (`minsc`) trips.
  FillBackground { color: Color },
  SetClip { path: MultiLine },
  ClearClip,
  PatternFill { path: MultiLine, file: String, scale: f64 },
  FillPath { path: MultiLine, color: Color },
  StrokePath { path: MultiLine, color: Color, width: f64, dash: Vec<f64>, cap: CapStyle, join: JoinStyle },
  Image { at: Point, file: String, scale: f64, angle_deg: f64 },
  Text { at: Point, text: String, size: f64, family: String, color: Color, align: VMap2objAlign, angle_deg: f64 },
  /// `lines`/`circles`/`draw_pos` forward their raw config arguments; the
  /// path is already transformed, the arguments are whatever the backend's
  /// own geometry generator expects.
  RawLines { path: MultiLine, args: Vec<String> },
  RawCircles { path: MultiLine, args: Vec<String> },
  RawDrawPos { path: MultiLine, args: Vec<String> },
}

/// Meters per pixel at `pixel_point`, via an equirectangular approximation
/// around the point's own latitude. Used only to compare against `minsc`,
/// which is itself a ratio rather than an absolute distance, so the
/// approximation's error cancels out at the scales `minsc` cares about.
fn meters_per_pixel(conv: &Conv, pixel_point: Point) -> Result<f64, Error> {
  let here = conv.frw_pt(pixel_point)?;
  let east = conv.frw_pt(Point::new(pixel_point.x + 1.0, pixel_point.y))?;
  let dlon = (east.x - here.x).abs();
  let dlat = (east.y - here.y).abs();
  let dx_m = dlon * here.y.to_radians().cos() * 111_320.0;
  let dy_m = dlat * 111_320.0;
  Ok((dx_m * dx_m + dy_m * dy_m).sqrt())
}

fn translate(ml: &MultiLine, delta: Point) -> MultiLine {
  MultiLine::new(ml.0.iter().map(|l| Line::new(l.0.iter().map(|p| *p + delta).collect())).collect())
}

fn anchor_of(ml: &MultiLine) -> Point {
  ml.0.first().and_then(|l| l.0.first()).copied().unwrap_or_default()
}

/// `point:5` / `line:0x2` style tokens, or a bare number meaning a point
/// type of that `tnum` (the common case for benchmark/survey-point
/// targets a `move_to`/`rotate_to` snaps onto).
fn parse_target_type(tok: &str) -> Option<u32> {
  use crate::store::obj::{make_type, parse_type, parse_type_num};
  parse_type(tok).or_else(|| parse_type_num(tok).map(|n| make_type(VMap2objClass::Point, n)))
}

/// Brute-force nearest-point search among objects of the given target
/// types, within `dist` pixels of `from_pixel`. Mirrors the search in
/// `VMap2::find_refs`: the store has no radius index beyond the geohash
/// cell grid, so candidates are queried by a padded WGS rectangle around
/// the anchor and then checked exactly.
fn nearest_target(store: &VMap2, conv: &Conv, from_pixel: Point, wgs_near: Point, types: &[String], dist: f64) -> Option<Point> {
  // Derive the search margin in the store's own coordinate units by
  // transforming a `dist`-pixel offset through the same conversion, rather
  // than assuming a fixed pixel/degree ratio.
  let shifted = conv.frw_pt(Point::new(from_pixel.x + dist, from_pixel.y)).ok()?;
  let margin = (shifted.x - wgs_near.x).abs().max(1e-9) * 2.0;
  let rect = Rect::new(wgs_near.x - margin, wgs_near.y - margin, wgs_near.x + margin, wgs_near.y + margin);
  let mut best: Option<(Point, f64)> = None;
  for tok in types {
    let Some(type_) = parse_target_type(tok) else { continue };
    for id in store.find(type_, &rect) {
      let Ok(cand) = store.get(id) else { continue };
      let Ok(cand_pixel) = conv.bck_acc_multiline(&cand.coords, DEFAULT_ACCURACY) else { continue };
      for line in &cand_pixel.0 {
        if let Some((pt, dist2)) = line.nearest_point(&from_pixel) {
          let d = dist2.sqrt();
          if d <= dist && best.is_none_or(|(_, bd)| d < bd) {
            best = Some((pt, d));
          }
        }
      }
    }
  }
  best.map(|(p, _)| p)
}

fn bearing_deg(from: Point, to: Point) -> f64 {
  let dx = to.x - from.x;
  let dy = to.y - from.y;
  let deg = dx.atan2(-dy).to_degrees();
  if deg < 0.0 { deg + 360.0 } else { deg }
}

/// Grid lines of a named projection (`SU` for `pulk_grid`, `FI` for
/// `fi_grid`) at `step`-sized intervals, covering `wgs_rect`, returned in
/// WGS84 so the caller can transform them into pixel space like any other
/// geometry.
fn named_grid_lines(wgs_rect: &Rect, proj_name: &str, step: f64) -> Result<Vec<Line>, Error> {
  if step <= 0.0 || wgs_rect.is_empty() {
    return Ok(Vec::new());
  }
  let proj = Conv::proj("WGS", proj_name)?;
  let mut proj_rect = Rect::empty();
  for c in wgs_rect.corners() {
    proj_rect = proj_rect.extend_point(&proj.frw_pt(c)?);
  }
  let mut lines = Vec::new();
  let mut x = (proj_rect.x1 / step).floor() * step;
  while x <= proj_rect.x2 {
    lines.push(Line::new(vec![Point::new(x, proj_rect.y1), Point::new(x, proj_rect.y2)]));
    x += step;
  }
  let mut y = (proj_rect.y1 / step).floor() * step;
  while y <= proj_rect.y2 {
    lines.push(Line::new(vec![Point::new(proj_rect.x1, y), Point::new(proj_rect.x2, y)]));
    y += step;
  }
  lines.iter().map(|l| proj.bck_acc_line(l, DEFAULT_ACCURACY)).collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Executes a [`Stylesheet`] against a store, producing the draw commands
/// visible within `draw_range` (pixel space).
pub struct Renderer<'a> {
  stylesheet: &'a Stylesheet,
  catalogue: &'a TypeCatalogue,
  /// Meters-per-pixel of the stylesheet's "natural" reference scale.
  /// `0.0` disables the `minsc` scale fallback entirely.
  ptsize0: f64,
}

impl<'a> Renderer<'a> {
  #[must_use]
  pub fn new(stylesheet: &'a Stylesheet, catalogue: &'a TypeCatalogue) -> Self {
    Self { stylesheet, catalogue, ptsize0: 0.0 }
  }

  #[must_use]
  pub fn with_ptsize0(mut self, ptsize0: f64) -> Self {
    self.ptsize0 = ptsize0;
    self
  }

  pub fn render(&self, store: &VMap2, conv: &Conv, draw_range: Rect) -> Result<Vec<DrawCommand>, Error> {
    let mut out = Vec::new();

    if self.ptsize0 > 0.0 {
      let mpp = meters_per_pixel(conv, draw_range.center())?;
      if mpp / self.ptsize0 < self.stylesheet.config.minsc {
        out.push(DrawCommand::FillBackground { color: self.stylesheet.config.minsc_color });
        return Ok(out);
      }
    }

    let wgs_rect = conv.frw_acc_rect(&draw_range, DEFAULT_ACCURACY)?;

    for step in &self.stylesheet.steps {
      match step.header {
        StepHeader::Type(type_) => {
          for id in store.find(type_, &wgs_rect) {
            let obj = store.get(id)?;
            let pixel = conv.bck_acc_multiline(&obj.coords, DEFAULT_ACCURACY)?;
            self.emit_object(&mut out, store, conv, &step.features, pixel, f64::from(obj.angle), f64::from(obj.scale) * self.stylesheet.config.obj_scale, &obj.name, obj.type_, obj.align)?;
          }
        }
        StepHeader::Brd => {
          let pixel = conv.bck_acc_multiline(&store.border, DEFAULT_ACCURACY)?;
          self.emit_object(&mut out, store, conv, &step.features, pixel, 0.0, self.stylesheet.config.obj_scale, "", 0, VMap2objAlign::SW)?;
        }
        StepHeader::Map => self.emit_map(&mut out, conv, &wgs_rect, &step.features)?,
      }
    }
    Ok(out)
  }

  #[allow(clippy::too_many_arguments)]
  fn emit_object(
    &self,
    out: &mut Vec<DrawCommand>,
    store: &VMap2,
    conv: &Conv,
    features: &[Feature],
    mut path: MultiLine,
    mut angle: f64,
    scale: f64,
    name: &str,
    type_: u32,
    align: VMap2objAlign,
  ) -> Result<(), Error> {
    let anchor = anchor_of(&path);
    let wgs_anchor = conv.frw_pt(anchor)?;

    for feature in features {
      match feature {
        Feature::MoveTo { dist, types } => {
          if let Some(target) = nearest_target(store, conv, anchor, wgs_anchor, types, *dist) {
            path = translate(&path, target - anchor);
          }
        }
        Feature::MoveFrom { dist, types } => {
          if let Some(target) = nearest_target(store, conv, anchor, wgs_anchor, types, *dist) {
            let away = anchor - target;
            let len = (away.x * away.x + away.y * away.y).sqrt().max(1e-9);
            let unit = Point::new(away.x / len, away.y / len);
            let new_anchor = target + unit * *dist;
            path = translate(&path, new_anchor - anchor);
          }
        }
        Feature::RotateTo { dist, types } => {
          if let Some(target) = nearest_target(store, conv, anchor, wgs_anchor, types, *dist) {
            angle = bearing_deg(anchor, target);
          }
        }
        Feature::Rotate { angle_deg } => angle += angle_deg,
        _ => {}
      }
    }
    if !angle.is_nan() && angle != 0.0 {
      path = path.rotated(&anchor_of(&path), angle);
    }

    let clipped = features.iter().any(|f| matches!(f, Feature::Clip));
    if clipped {
      out.push(DrawCommand::SetClip { path: path.clone() });
    }

    for feature in features {
      if let Feature::Patt { file, scale: patt_scale } = feature {
        out.push(DrawCommand::PatternFill { path: path.clone(), file: file.clone(), scale: patt_scale * scale });
      }
    }
    for feature in features {
      if let Feature::Fill { color } = feature {
        out.push(DrawCommand::FillPath { path: path.clone(), color: *color });
      }
    }
    for feature in features {
      if let Feature::Stroke { color, width } = feature {
        let dash = features.iter().find_map(|f| if let Feature::Dash { lengths } = f { Some(lengths.clone()) } else { None }).unwrap_or_default();
        let cap = features.iter().find_map(|f| if let Feature::Cap(c) = f { Some(*c) } else { None }).unwrap_or(CapStyle::Round);
        let join = features.iter().find_map(|f| if let Feature::Join(j) = f { Some(*j) } else { None }).unwrap_or(JoinStyle::Round);
        out.push(DrawCommand::StrokePath { path: path.clone(), color: *color, width: width * scale, dash, cap, join });
      }
    }
    for feature in features {
      if let Feature::Img { file, scale: img_scale } = feature {
        out.push(DrawCommand::Image { at: anchor_of(&path), file: file.clone(), scale: img_scale * scale, angle_deg: angle });
      }
    }
    for feature in features {
      if let Feature::Write { color } = feature {
        let (size, family) = features
          .iter()
          .find_map(|f| if let Feature::Font { size, family } = f { Some((*size, family.clone())) } else { None })
          .unwrap_or((10.0, String::new()));
        let text = if name.is_empty() {
          self.catalogue.get(type_).map(|info| info.name.clone()).unwrap_or_default()
        } else {
          name.to_string()
        };
        out.push(DrawCommand::Text { at: anchor_of(&path), text, size: size * scale, family, color: *color, align, angle_deg: angle });
      }
    }
    for feature in features {
      match feature {
        Feature::Lines { args } => out.push(DrawCommand::RawLines { path: path.clone(), args: args.clone() }),
        Feature::Circles { args } => out.push(DrawCommand::RawCircles { path: path.clone(), args: args.clone() }),
        Feature::DrawPos { args } => out.push(DrawCommand::RawDrawPos { path: path.clone(), args: args.clone() }),
        _ => {}
      }
    }

    if clipped {
      out.push(DrawCommand::ClearClip);
    }
    Ok(())
  }

  fn emit_map(&self, out: &mut Vec<DrawCommand>, conv: &Conv, wgs_rect: &Rect, features: &[Feature]) -> Result<(), Error> {
    for feature in features {
      match feature {
        Feature::PulkGrid { step, color, width } => {
          self.emit_named_grid(out, conv, wgs_rect, "SU", *step, *color, *width)?;
        }
        Feature::FiGrid { step, color, width } => {
          self.emit_named_grid(out, conv, wgs_rect, "FI", *step, *color, *width)?;
        }
        // `grid_labels` needs a companion pulk_grid/fi_grid in the same
        // step to know which projection's coordinate values to print;
        // without one there is nothing meaningful to label.
        Feature::GridLabels { .. } => {}
        _ => {}
      }
    }
    Ok(())
  }

  fn emit_named_grid(&self, out: &mut Vec<DrawCommand>, conv: &Conv, wgs_rect: &Rect, proj_name: &str, step: f64, color: Color, width: f64) -> Result<(), Error> {
    let wgs_lines = named_grid_lines(wgs_rect, proj_name, step)?;
    if wgs_lines.is_empty() {
      return Ok(());
    }
    let pixel_lines = wgs_lines.iter().map(|l| conv.bck_acc_line(l, DEFAULT_ACCURACY)).collect::<Result<Vec<_>, _>>()?;
    out.push(DrawCommand::StrokePath {
      path: MultiLine::new(pixel_lines),
      color,
      width,
      dash: Vec::new(),
      cap: CapStyle::Butt,
      join: JoinStyle::Miter,
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalogue::TypeCatalogue;
  use crate::conv::Affine2D;
  use crate::store::obj::{make_type, VMap2obj, VMap2objClass};

  fn identity_conv() -> Conv {
    Conv::affine(Affine2D::from_point_pairs(&[
      (Point::new(0.0, 0.0), Point::new(0.0, 0.0)),
      (Point::new(1.0, 0.0), Point::new(1.0, 0.0)),
      (Point::new(0.0, 1.0), Point::new(0.0, 1.0)),
    ]).unwrap())
  }

  fn write_sheet(contents: &str) -> Stylesheet {
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("vmap2-render-test-{}-{n}.cfg", std::process::id()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    let sheet = Stylesheet::load(&path).unwrap();
    let _ = std::fs::remove_file(path);
    sheet
  }

  #[test]
  fn below_minsc_fills_background_instead_of_objects() {
    let sheet = write_sheet("minsc 1e9\nminsc_color 0xFF112233\npoint:1 fill 0xFFFFFFFF\n");
    let cat = TypeCatalogue::new();
    let store = VMap2::new_in_memory();
    let conv = identity_conv();
    let renderer = Renderer::new(&sheet, &cat).with_ptsize0(1.0);
    let cmds = renderer.render(&store, &conv, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert_eq!(cmds, vec![DrawCommand::FillBackground { color: Color(0xFF11_2233) }]);
  }

  #[test]
  fn point_step_emits_fill_then_stroke() {
    let sheet = write_sheet("point:1 fill 0xFFFFFFFF\n+ stroke 0xFF000000 2\n");
    let cat = TypeCatalogue::new();
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = MultiLine::single_point(Point::new(5.0, 5.0));
    store.add(obj).unwrap();
    let conv = identity_conv();
    let renderer = Renderer::new(&sheet, &cat);
    let cmds = renderer.render(&store, &conv, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert!(matches!(cmds[0], DrawCommand::FillPath { .. }));
    assert!(matches!(cmds[1], DrawCommand::StrokePath { .. }));
  }

  #[test]
  fn clip_feature_wraps_the_objects_commands() {
    let sheet = write_sheet("area:1 clip\n+ fill 0xFFFFFFFF\n");
    let cat = TypeCatalogue::new();
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Polygon, 1);
    obj.coords = MultiLine::new(vec![Line::new(vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0), Point::new(2.0, 2.0), Point::new(1.0, 1.0)])]);
    store.add(obj).unwrap();
    let conv = identity_conv();
    let renderer = Renderer::new(&sheet, &cat);
    let cmds = renderer.render(&store, &conv, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert!(matches!(cmds.first(), Some(DrawCommand::SetClip { .. })));
    assert!(matches!(cmds.last(), Some(DrawCommand::ClearClip)));
  }

  #[test]
  fn move_to_snaps_object_onto_nearby_target() {
    let sheet = write_sheet("point:1 move_to 5 point:2\n+ fill 0xFFFFFFFF\n");
    let cat = TypeCatalogue::new();
    let mut store = VMap2::new_in_memory();
    let mut target = VMap2obj::new(VMap2objClass::Point, 2);
    target.coords = MultiLine::single_point(Point::new(5.0, 5.0));
    store.add(target).unwrap();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = MultiLine::single_point(Point::new(5.001, 5.001));
    store.add(obj).unwrap();
    let conv = identity_conv();
    let renderer = Renderer::new(&sheet, &cat);
    let cmds = renderer.render(&store, &conv, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    let DrawCommand::FillPath { path, .. } = &cmds[0] else { panic!("expected a fill command") };
    assert_approx_eq::assert_approx_eq!(path.0[0].0[0].x, 5.0, 1e-6);
  }

  #[test]
  fn brd_step_strokes_the_store_border() {
    let sheet = write_sheet("brd stroke 0xFF000000 1\n");
    let cat = TypeCatalogue::new();
    let mut store = VMap2::new_in_memory();
    store.border = MultiLine::new(vec![Line::new(vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)])]);
    let conv = identity_conv();
    let renderer = Renderer::new(&sheet, &cat);
    let cmds = renderer.render(&store, &conv, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert!(matches!(cmds[0], DrawCommand::StrokePath { .. }));
  }

  #[test]
  fn pulk_grid_emits_a_stroke_command() {
    let sheet = write_sheet("map pulk_grid 1000 0xFF808080 1\n");
    let cat = TypeCatalogue::new();
    let store = VMap2::new_in_memory();
    let conv = Conv::proj("SU39", "WGS").unwrap();
    let renderer = Renderer::new(&sheet, &cat);
    let cmds = renderer.render(&store, &conv, Rect::new(6_500_000.0, 6_000_000.0, 6_501_000.0, 6_001_000.0)).unwrap();
    assert!(!cmds.is_empty());
  }
}
