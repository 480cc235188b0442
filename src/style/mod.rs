//! Stylesheet parser (§4.4): a line-oriented description of an ordered
//! sequence of drawing steps, grounded on
//! `original_source/vmap2/vmap2gobj.h`'s config-file grammar and the
//! `load_conf` parser in `vmap2gobj.cpp`. The renderer (`crate::render`)
//! walks the resulting `Vec<DrawingStep>`; this module only compiles text
//! into that structure.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalogue::{apply_defines, tokenize};
use crate::error::{Error, StylesheetError};
use crate::store::obj::{make_type, VMap2objClass};

const MAX_INCLUDE_DEPTH: usize = 64;

/// Packed ARGB color. Config tokens are read the same way the original
/// parses `uint32_t` colors: decimal or `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color(pub u32);

impl Color {
  #[must_use]
  pub fn a(self) -> u8 {
    (self.0 >> 24) as u8
  }
  #[must_use]
  pub fn r(self) -> u8 {
    (self.0 >> 16) as u8
  }
  #[must_use]
  pub fn g(self) -> u8 {
    (self.0 >> 8) as u8
  }
  #[must_use]
  pub fn b(self) -> u8 {
    self.0 as u8
  }

  fn parse(tok: &str) -> Option<Self> {
    parse_u32(tok).map(Self)
  }
}

fn parse_u32(tok: &str) -> Option<u32> {
  if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
    u32::from_str_radix(hex, 16).ok()
  } else {
    tok.parse::<u32>().ok()
  }
}

/// `cap round|butt|square` (original: `vmap2gobj.cpp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStyle {
  Round,
  Butt,
  Square,
}

/// `join round|miter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
  Round,
  Miter,
}

/// One `+ feature args...` line, already type-checked against its step.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
  Stroke { color: Color, width: f64 },
  Fill { color: Color },
  Clip,
  Patt { file: String, scale: f64 },
  Img { file: String, scale: f64 },
  Smooth { dist: f64 },
  Dash { lengths: Vec<f64> },
  Cap(CapStyle),
  Join(JoinStyle),
  Operator(String),
  Font { size: f64, family: String },
  Write { color: Color },
  Lines { args: Vec<String> },
  Circles { args: Vec<String> },
  DrawPos { args: Vec<String> },
  MoveTo { dist: f64, types: Vec<String> },
  RotateTo { dist: f64, types: Vec<String> },
  MoveFrom { dist: f64, types: Vec<String> },
  Rotate { angle_deg: f64 },
  PulkGrid { step: f64, color: Color, width: f64 },
  FiGrid { step: f64, color: Color, width: f64 },
  GridLabels { size: f64, font: String, color: Color },
  Group(String),
  Name(String),
}

/// A selector kind, used both as the step header and to type-check
/// features against the table in §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
  Point,
  Line,
  Area,
  Text,
  Map,
  Brd,
}

/// `(point|line|area|text):<N>`, `map`, or `brd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepHeader {
  /// Packed `(class << 24) | tnum`, as produced by [`make_type`].
  Type(u32),
  Map,
  Brd,
}

impl StepHeader {
  #[must_use]
  pub fn kind(self) -> StepKind {
    match self {
      Self::Map => StepKind::Map,
      Self::Brd => StepKind::Brd,
      Self::Type(t) => match crate::store::obj::class_of(t) {
        VMap2objClass::Point => StepKind::Point,
        VMap2objClass::Line => StepKind::Line,
        VMap2objClass::Polygon => StepKind::Area,
        VMap2objClass::Text | VMap2objClass::None => StepKind::Text,
      },
    }
  }
}

#[derive(Debug, Clone)]
pub struct DrawingStep {
  pub header: StepHeader,
  pub name: String,
  pub group: String,
  pub features: Vec<Feature>,
}

/// `set_ref file|nom|nom_fi|none`.
#[derive(Debug, Clone, PartialEq)]
pub enum SetRef {
  File(PathBuf),
  NomSu { name: String, dpi: f64 },
  NomFi { name: String, dpi: f64 },
  None,
}

/// `set_brd file|none`.
#[derive(Debug, Clone, PartialEq)]
pub enum SetBrd {
  File(PathBuf),
  None,
}

/// Global directives that are not drawing steps, with the same defaults
/// the original CLI options used.
#[derive(Debug, Clone)]
pub struct StyleConfig {
  pub set_ref: Option<SetRef>,
  pub set_brd: Option<SetBrd>,
  pub max_text_size: f64,
  pub fit_patt_size: bool,
  pub minsc: f64,
  pub minsc_color: Color,
  pub obj_scale: f64,
}

impl Default for StyleConfig {
  fn default() -> Self {
    Self {
      set_ref: None,
      set_brd: None,
      max_text_size: 1024.0,
      fit_patt_size: false,
      minsc: 0.01,
      minsc_color: Color(0xFFDB_5A00),
      obj_scale: 1.0,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
  pub steps: Vec<DrawingStep>,
  pub config: StyleConfig,
}

impl Stylesheet {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let mut steps = Vec::new();
    let mut config = StyleConfig::default();
    let mut defines: BTreeMap<String, String> = BTreeMap::new();
    load_into(path.as_ref(), &mut defines, &mut steps, &mut config, 0)?;
    Ok(Self { steps, config })
  }
}

fn load_into(
  path: &Path,
  defines: &mut BTreeMap<String, String>,
  steps: &mut Vec<DrawingStep>,
  config: &mut StyleConfig,
  depth: usize,
) -> Result<(), Error> {
  if depth > MAX_INCLUDE_DEPTH {
    return Err(StylesheetError::UnknownCommand { file: path.to_path_buf(), line: 0, command: "include (too deep, possible cycle)".into() }.into());
  }
  let text = fs::read_to_string(path)?;
  let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

  // active = conjunction of every enclosing if/else branch's truth value.
  let mut stack: Vec<bool> = Vec::new();
  let mut current: Option<usize> = None; // index into `steps` of the open step

  for (idx, raw_line) in text.lines().enumerate() {
    let line_num = idx + 1;
    let trimmed = raw_line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
      continue;
    }
    let raw_tokens = tokenize(trimmed);
    let tokens: Vec<String> = raw_tokens.iter().map(|t| apply_defines(t, defines)).collect();
    let head = tokens[0].as_str();

    if head == "if" {
      if tokens.len() != 4 || tokens[2] != "==" && tokens[2] != "!=" {
        return Err(StylesheetError::WrongArgCount { file: path.to_path_buf(), line: line_num, command: "if".into(), expected: 3, got: tokens.len() - 1 }.into());
      }
      let eq = tokens[1] == tokens[3];
      stack.push(if tokens[2] == "==" { eq } else { !eq });
      current = None;
      continue;
    }
    if head == "else" {
      let Some(top) = stack.last_mut() else {
        return Err(StylesheetError::UnmatchedEndif { file: path.to_path_buf(), line: line_num }.into());
      };
      *top = !*top;
      current = None;
      continue;
    }
    if head == "endif" {
      if stack.pop().is_none() {
        return Err(StylesheetError::UnmatchedEndif { file: path.to_path_buf(), line: line_num }.into());
      }
      current = None;
      continue;
    }

    let active = stack.iter().all(|&b| b);
    if !active {
      continue;
    }

    if head == "include" {
      current = None;
      if tokens.len() != 2 {
        return Err(StylesheetError::WrongArgCount { file: path.to_path_buf(), line: line_num, command: "include".into(), expected: 1, got: tokens.len() - 1 }.into());
      }
      let inc = Path::new(&tokens[1]);
      let inc = if inc.is_absolute() { inc.to_path_buf() } else { dir.join(inc) };
      load_into(&inc, defines, steps, config, depth + 1)?;
      continue;
    }

    if head == "define" {
      current = None;
      if tokens.len() != 3 {
        return Err(StylesheetError::WrongArgCount { file: path.to_path_buf(), line: line_num, command: "define".into(), expected: 2, got: tokens.len() - 1 }.into());
      }
      defines.insert(tokens[1].clone(), tokens[2].clone());
      continue;
    }

    if head == "set_ref" || head == "set_brd" {
      current = None;
      apply_set_ref_brd(head, &tokens, &dir, config, path, line_num)?;
      continue;
    }

    if head == "max_text_size" {
      current = None;
      config.max_text_size = parse_f64(&tokens, 1, "max_text_size", path, line_num)?;
      continue;
    }
    if head == "fit_patt_size" {
      current = None;
      if tokens.len() != 2 {
        return Err(arg_err("fit_patt_size", 1, tokens.len() - 1, path, line_num));
      }
      config.fit_patt_size = tokens[1] == "1" || tokens[1].eq_ignore_ascii_case("true");
      continue;
    }
    if head == "minsc" {
      current = None;
      config.minsc = parse_f64(&tokens, 1, "minsc", path, line_num)?;
      continue;
    }
    if head == "minsc_color" {
      current = None;
      if tokens.len() != 2 {
        return Err(arg_err("minsc_color", 1, tokens.len() - 1, path, line_num));
      }
      config.minsc_color = Color::parse(&tokens[1]).ok_or_else(|| token_parse_err(path, line_num, "minsc_color"))?;
      continue;
    }
    if head == "obj_scale" {
      current = None;
      config.obj_scale = parse_f64(&tokens, 1, "obj_scale", path, line_num)?;
      continue;
    }

    // A new drawing step, or a feature line on the currently open one.
    if tokens.len() > 1 && tokens[0].contains(':') {
      let header = parse_type_selector(&tokens[0]).ok_or_else(|| StylesheetError::UnknownCommand { file: path.to_path_buf(), line: line_num, command: tokens[0].clone() })?;
      steps.push(DrawingStep { header, name: tokens[0].clone(), group: String::new(), features: Vec::new() });
      let step_idx = steps.len() - 1;
      current = Some(step_idx);
      apply_feature(&mut steps[step_idx], &tokens[1..], path, line_num)?;
    } else if tokens.len() > 1 && tokens[0] == "map" {
      steps.push(DrawingStep { header: StepHeader::Map, name: "map".into(), group: String::new(), features: Vec::new() });
      let step_idx = steps.len() - 1;
      current = Some(step_idx);
      apply_feature(&mut steps[step_idx], &tokens[1..], path, line_num)?;
    } else if tokens.len() > 1 && tokens[0] == "brd" {
      steps.push(DrawingStep { header: StepHeader::Brd, name: "brd".into(), group: String::new(), features: Vec::new() });
      let step_idx = steps.len() - 1;
      current = Some(step_idx);
      apply_feature(&mut steps[step_idx], &tokens[1..], path, line_num)?;
    } else if tokens.len() > 1 && tokens[0] == "+" {
      let Some(step_idx) = current else {
        return Err(StylesheetError::UnknownCommand { file: path.to_path_buf(), line: line_num, command: "+ (no open step)".into() }.into());
      };
      apply_feature(&mut steps[step_idx], &tokens[1..], path, line_num)?;
    } else {
      return Err(StylesheetError::UnknownCommand { file: path.to_path_buf(), line: line_num, command: head.to_string() }.into());
    }
  }

  if !stack.is_empty() {
    return Err(StylesheetError::UnmatchedIf { file: path.to_path_buf() }.into());
  }
  Ok(())
}

fn parse_type_selector(tok: &str) -> Option<StepHeader> {
  crate::store::obj::parse_type(tok).map(StepHeader::Type)
}

fn parse_f64(tokens: &[String], idx: usize, name: &str, file: &Path, line: usize) -> Result<f64, Error> {
  if tokens.len() != idx + 1 {
    return Err(arg_err(name, 1, tokens.len().saturating_sub(1), file, line));
  }
  tokens[idx].parse().map_err(|_| StylesheetError::WrongArgCount { file: file.to_path_buf(), line, command: format!("{name} (not a number)"), expected: 1, got: 1 }.into())
}

fn arg_err(command: &str, expected: usize, got: usize, file: &Path, line: usize) -> Error {
  StylesheetError::WrongArgCount { file: file.to_path_buf(), line, command: command.into(), expected, got }.into()
}

fn token_parse_err(file: &Path, line: usize, command: &str) -> Error {
  StylesheetError::WrongArgCount { file: file.to_path_buf(), line, command: format!("{command} (bad token)"), expected: 1, got: 1 }.into()
}

fn apply_set_ref_brd(head: &str, tokens: &[String], dir: &Path, config: &mut StyleConfig, file: &Path, line: usize) -> Result<(), Error> {
  if tokens.len() < 2 {
    return Err(arg_err(head, 2, tokens.len().saturating_sub(1), file, line));
  }
  match (head, tokens[1].as_str()) {
    ("set_ref", "file") => {
      if tokens.len() != 3 {
        return Err(arg_err("set_ref file", 2, tokens.len() - 1, file, line));
      }
      config.set_ref = Some(SetRef::File(resolve(dir, &tokens[2])));
    }
    ("set_ref", "nom") => {
      if tokens.len() != 4 {
        return Err(arg_err("set_ref nom", 3, tokens.len() - 1, file, line));
      }
      let dpi = tokens[3].parse().map_err(|_| token_parse_err(file, line, "set_ref nom <dpi>"))?;
      config.set_ref = Some(SetRef::NomSu { name: tokens[2].clone(), dpi });
    }
    ("set_ref", "nom_fi") => {
      if tokens.len() != 4 {
        return Err(arg_err("set_ref nom_fi", 3, tokens.len() - 1, file, line));
      }
      let dpi = tokens[3].parse().map_err(|_| token_parse_err(file, line, "set_ref nom_fi <dpi>"))?;
      config.set_ref = Some(SetRef::NomFi { name: tokens[2].clone(), dpi });
    }
    ("set_ref", "none") => config.set_ref = Some(SetRef::None),
    ("set_brd", "file") => {
      if tokens.len() != 3 {
        return Err(arg_err("set_brd file", 2, tokens.len() - 1, file, line));
      }
      config.set_brd = Some(SetBrd::File(resolve(dir, &tokens[2])));
    }
    ("set_brd", "none") => config.set_brd = Some(SetBrd::None),
    _ => return Err(StylesheetError::UnknownCommand { file: file.to_path_buf(), line, command: format!("{head} {}", tokens[1]) }.into()),
  }
  Ok(())
}

fn resolve(dir: &Path, file: &str) -> PathBuf {
  let p = Path::new(file);
  if p.is_absolute() { p.to_path_buf() } else { dir.join(p) }
}

/// Features valid on a given step kind, mirroring the "Applicable steps"
/// column in §4.4. `cap`/`join`/`operator`/`group`/`name` apply anywhere.
fn kind_allows(kind: StepKind, feature: &str) -> bool {
  use StepKind::{Area, Brd, Line, Map, Point, Text};
  match feature {
    "stroke" => matches!(kind, Point | Line | Area | Text | Brd),
    "fill" => true,
    "clip" => matches!(kind, Area | Map | Text | Brd),
    "patt" => matches!(kind, Line | Area | Map | Text | Brd),
    "img" => matches!(kind, Point | Area),
    "smooth" => matches!(kind, Line | Area | Brd),
    "dash" => matches!(kind, Line | Area | Text | Brd),
    "cap" | "join" | "operator" | "group" | "name" => true,
    "font" | "write" => matches!(kind, Text),
    "lines" | "circles" => matches!(kind, Point | Line | Area),
    "draw_pos" => matches!(kind, Line | Area),
    "move_to" | "move_from" => matches!(kind, Point | Line | Area),
    "rotate_to" => matches!(kind, Point),
    "rotate" => matches!(kind, Point | Line | Area | Text),
    "pulk_grid" | "fi_grid" | "grid_labels" => matches!(kind, Map),
    _ => false,
  }
}

fn apply_feature(step: &mut DrawingStep, tokens: &[String], file: &Path, line: usize) -> Result<(), Error> {
  let feature = tokens[0].as_str();
  let args = &tokens[1..];
  if !kind_allows(step.header.kind(), feature) {
    return Err(StylesheetError::UnknownFeature { file: file.to_path_buf(), line, feature: format!("{feature} (not valid for this step)") }.into());
  }
  let need = |n: usize| -> Result<(), Error> {
    if args.len() != n {
      return Err(arg_err(feature, n, args.len(), file, line));
    }
    Ok(())
  };
  let color_at = |i: usize| -> Result<Color, Error> { Color::parse(&args[i]).ok_or_else(|| token_parse_err(file, line, feature)) };
  let f64_at = |i: usize| -> Result<f64, Error> { args[i].parse().map_err(|_| token_parse_err(file, line, feature)) };

  let parsed = match feature {
    "stroke" => {
      need(2)?;
      Feature::Stroke { color: color_at(0)?, width: f64_at(1)? }
    }
    "fill" => {
      need(1)?;
      Feature::Fill { color: color_at(0)? }
    }
    "clip" => {
      need(0)?;
      Feature::Clip
    }
    "patt" => {
      need(2)?;
      Feature::Patt { file: args[0].clone(), scale: f64_at(1)? }
    }
    "img" => {
      need(2)?;
      Feature::Img { file: args[0].clone(), scale: f64_at(1)? }
    }
    "smooth" => {
      need(1)?;
      Feature::Smooth { dist: f64_at(0)? }
    }
    "dash" => {
      if args.is_empty() {
        return Err(arg_err("dash", 1, 0, file, line));
      }
      let lengths = args.iter().map(|s| s.parse().map_err(|_| token_parse_err(file, line, "dash"))).collect::<Result<Vec<f64>, Error>>()?;
      Feature::Dash { lengths }
    }
    "cap" => {
      need(1)?;
      let cap = match args[0].as_str() {
        "round" => CapStyle::Round,
        "butt" => CapStyle::Butt,
        "square" => CapStyle::Square,
        _ => return Err(StylesheetError::UnknownFeature { file: file.to_path_buf(), line, feature: format!("cap {}", args[0]) }.into()),
      };
      Feature::Cap(cap)
    }
    "join" => {
      need(1)?;
      let join = match args[0].as_str() {
        "round" => JoinStyle::Round,
        "miter" => JoinStyle::Miter,
        _ => return Err(StylesheetError::UnknownFeature { file: file.to_path_buf(), line, feature: format!("join {}", args[0]) }.into()),
      };
      Feature::Join(join)
    }
    "operator" => {
      need(1)?;
      Feature::Operator(args[0].clone())
    }
    "font" => {
      need(2)?;
      Feature::Font { size: f64_at(0)?, family: args[1].clone() }
    }
    "write" => {
      need(1)?;
      Feature::Write { color: color_at(0)? }
    }
    "lines" => Feature::Lines { args: args.to_vec() },
    "circles" => Feature::Circles { args: args.to_vec() },
    "draw_pos" => {
      if args.is_empty() {
        return Err(arg_err("draw_pos", 1, 0, file, line));
      }
      Feature::DrawPos { args: args.to_vec() }
    }
    "move_to" => {
      if args.len() < 2 {
        return Err(arg_err("move_to", 2, args.len(), file, line));
      }
      Feature::MoveTo { dist: f64_at(0)?, types: args[1..].to_vec() }
    }
    "rotate_to" => {
      if args.len() < 2 {
        return Err(arg_err("rotate_to", 2, args.len(), file, line));
      }
      Feature::RotateTo { dist: f64_at(0)?, types: args[1..].to_vec() }
    }
    "move_from" => {
      if args.len() < 2 {
        return Err(arg_err("move_from", 2, args.len(), file, line));
      }
      Feature::MoveFrom { dist: f64_at(0)?, types: args[1..].to_vec() }
    }
    "rotate" => {
      need(1)?;
      Feature::Rotate { angle_deg: f64_at(0)? }
    }
    "pulk_grid" => {
      need(3)?;
      Feature::PulkGrid { step: f64_at(0)?, color: color_at(1)?, width: f64_at(2)? }
    }
    "fi_grid" => {
      need(3)?;
      Feature::FiGrid { step: f64_at(0)?, color: color_at(1)?, width: f64_at(2)? }
    }
    "grid_labels" => {
      need(3)?;
      Feature::GridLabels { size: f64_at(0)?, font: args[1].clone(), color: color_at(2)? }
    }
    "group" => {
      need(1)?;
      step.group = args[0].clone();
      return Ok(());
    }
    "name" => {
      need(1)?;
      Feature::Name(args[0].clone())
    }
    other => return Err(StylesheetError::UnknownFeature { file: file.to_path_buf(), line, feature: other.to_string() }.into()),
  };
  step.features.push(parsed);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn write_temp(contents: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("vmap2-style-test-{}-{n}.cfg", std::process::id()));
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
  }

  #[test]
  fn parses_a_point_step_with_features() {
    let path = write_temp("point:0x1 stroke 0xFF000000 2\n+ fill 0xFFFFFFFF\n");
    let sheet = Stylesheet::load(&path).unwrap();
    assert_eq!(sheet.steps.len(), 1);
    assert_eq!(sheet.steps[0].features.len(), 2);
    let _ = fs::remove_file(path);
  }

  #[test]
  fn rejects_a_feature_not_valid_for_its_step() {
    let path = write_temp("point:0x1 font 10 sans\n");
    assert!(Stylesheet::load(&path).is_err());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn rejects_unknown_feature() {
    let path = write_temp("point:0x1 bogus 1 2\n");
    assert!(Stylesheet::load(&path).is_err());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn if_else_endif_toggles_active_branch() {
    let path = write_temp(
      "define V a\n\
       if ${V} == a\n\
       point:0x1 fill 0xFFFFFFFF\n\
       else\n\
       point:0x2 fill 0xFFFFFFFF\n\
       endif\n",
    );
    let sheet = Stylesheet::load(&path).unwrap();
    assert_eq!(sheet.steps.len(), 1);
    assert_eq!(sheet.steps[0].header, StepHeader::Type(make_type(VMap2objClass::Point, 1)));
    let _ = fs::remove_file(path);
  }

  #[test]
  fn unmatched_endif_is_an_error() {
    let path = write_temp("endif\n");
    assert!(Stylesheet::load(&path).is_err());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn unmatched_if_is_an_error() {
    let path = write_temp("if a == a\n");
    assert!(Stylesheet::load(&path).is_err());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn set_ref_nom_directive_is_parsed() {
    let path = write_temp("set_ref nom p-36-00 1200\n");
    let sheet = Stylesheet::load(&path).unwrap();
    assert_eq!(sheet.config.set_ref, Some(SetRef::NomSu { name: "p-36-00".into(), dpi: 1200.0 }));
    let _ = fs::remove_file(path);
  }

  #[test]
  fn minsc_color_overrides_default() {
    let path = write_temp("minsc_color 0xFF112233\n");
    let sheet = Stylesheet::load(&path).unwrap();
    assert_eq!(sheet.config.minsc_color, Color(0xFF11_2233));
    let _ = fs::remove_file(path);
  }
}
