//! The type catalogue: short name, description, and format/label hints for
//! every object type a store may hold (§3.5), loaded from the text DSL
//! `original_source/mapdb/mapdb_types.cpp` defines (`point|line|area|text
//! <type>` headers, `+ <feature> <args>` lines, `define` substitution).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, FormatError};
use crate::store::obj::{make_type, VMap2objAlign, VMap2objClass};

/// Per-type metadata: format-adapter hints plus label placement policy.
#[derive(Debug, Clone)]
pub struct TypeInfo {
  pub name: String,
  pub comm: String,
  /// FIG template string; empty means "no FIG rendering hint".
  pub fig_mask: String,
  /// Optional FIG picture file, when `fig_mask` embeds one.
  pub fig_patt: Option<String>,
  pub mp_start: i32,
  pub mp_end: i32,
  /// Preferred label object type; `None` = no labels for this type.
  pub label_type: Option<u32>,
  pub label_scale: f32,
  pub label_align: VMap2objAlign,
  /// If set, a label close to exhausting its placement turns into a point
  /// of this type instead of being dropped.
  pub label_as_point: Option<u32>,
  /// Maximum number of labels placed per object; `None` = no fixed limit.
  pub max_labels: Option<u32>,
}

impl Default for TypeInfo {
  fn default() -> Self {
    Self {
      name: String::new(),
      comm: String::new(),
      fig_mask: String::new(),
      fig_patt: None,
      mp_start: 0,
      mp_end: 0,
      label_type: None,
      label_scale: 1.0,
      label_align: VMap2objAlign::C,
      label_as_point: None,
      max_labels: None,
    }
  }
}

/// `type -> TypeInfo`, keyed by the same packed `(class<<24)|tnum` value
/// `VMap2obj::type_` uses.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalogue {
  types: BTreeMap<u32, TypeInfo>,
}

fn parse_type_num(tok: &str, file: &Path, line: usize) -> Result<u32, Error> {
  let parsed = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
    u32::from_str_radix(hex, 16)
  } else {
    tok.parse::<u32>()
  };
  parsed.map_err(|_| FormatError::new(file, line, format!("not a valid type number: {tok:?}")).into())
}

pub(crate) fn apply_defines(tok: &str, defines: &BTreeMap<String, String>) -> String {
  let mut out = tok.to_string();
  for (k, v) in defines {
    out = out.replace(&format!("${{{k}}}"), v);
  }
  out
}

/// Splits a line into whitespace-separated tokens, treating a
/// double-quoted span as a single token (so `+ comm "two words"` keeps the
/// description intact).
pub(crate) fn tokenize(line: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut chars = line.chars().peekable();
  while let Some(&c) = chars.peek() {
    if c.is_whitespace() {
      chars.next();
      continue;
    }
    if c == '"' {
      chars.next();
      let mut tok = String::new();
      for c in chars.by_ref() {
        if c == '"' {
          break;
        }
        tok.push(c);
      }
      tokens.push(tok);
      continue;
    }
    let mut tok = String::new();
    while let Some(&c) = chars.peek() {
      if c.is_whitespace() {
        break;
      }
      tok.push(c);
      chars.next();
    }
    tokens.push(tok);
  }
  tokens
}

impl TypeCatalogue {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn get(&self, type_: u32) -> Option<&TypeInfo> {
    self.types.get(&type_)
  }

  pub fn insert(&mut self, type_: u32, info: TypeInfo) {
    self.types.insert(type_, info);
  }

  #[must_use]
  pub fn iter(&self) -> impl Iterator<Item = (&u32, &TypeInfo)> {
    self.types.iter()
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut catalogue = Self::new();
    let mut defines: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<u32> = None;

    for (idx, raw_line) in text.lines().enumerate() {
      let line_num = idx + 1;
      let trimmed = raw_line.trim();
      if trimmed.is_empty() || trimmed.starts_with('#') {
        continue;
      }
      let tokens: Vec<String> = tokenize(trimmed).into_iter().map(|t| apply_defines(&t, &defines)).collect();
      let head = tokens[0].as_str();

      match head {
        "define" => {
          current = None;
          if tokens.len() != 3 {
            return Err(FormatError::new(path, line_num, "define: 2 arguments expected: <key> <value>").into());
          }
          defines.insert(tokens[1].clone(), tokens[2].clone());
        }
        "point" | "line" | "area" | "text" => {
          if tokens.len() != 2 {
            return Err(FormatError::new(path, line_num, format!("{head}: 1 argument expected: <type>")).into());
          }
          let class = match head {
            "point" => VMap2objClass::Point,
            "line" => VMap2objClass::Line,
            "area" => VMap2objClass::Polygon,
            _ => VMap2objClass::Text,
          };
          let tnum = parse_type_num(&tokens[1], path, line_num)?;
          let type_ = make_type(class, tnum);
          catalogue.types.entry(type_).or_default();
          current = Some(type_);
        }
        "+" => {
          let Some(type_) = current else {
            return Err(FormatError::new(path, line_num, "+ expected after point, line, area, or text").into());
          };
          if tokens.len() < 2 {
            return Err(FormatError::new(path, line_num, "+: at least one argument expected").into());
          }
          let info = catalogue.types.get_mut(&type_).expect("current type was inserted on its header line");
          apply_feature(info, &tokens, path, line_num)?;
        }
        other => return Err(FormatError::new(path, line_num, format!("unknown command: {other:?}")).into()),
      }
    }
    Ok(catalogue)
  }
}

fn apply_feature(info: &mut TypeInfo, tokens: &[String], file: &Path, line: usize) -> Result<(), Error> {
  let feature = tokens[1].as_str();
  let args = &tokens[2..];
  let need = |n: usize| -> Result<(), Error> {
    if args.len() != n {
      return Err(FormatError::new(file, line, format!("+ {feature}: {n} argument(s) expected")).into());
    }
    Ok(())
  };
  match feature {
    "name" => {
      need(1)?;
      info.name = args[0].clone();
    }
    "comm" => {
      need(1)?;
      info.comm = args[0].clone();
    }
    "fig_mask" => {
      need(1)?;
      info.fig_mask = args[0].clone();
    }
    "fig_patt" => {
      need(1)?;
      info.fig_patt = Some(args[0].clone());
    }
    "mp_levels" => {
      need(2)?;
      info.mp_start = args[0]
        .parse()
        .map_err(|_| Error::from(FormatError::new(file, line, "mp_levels: <start> must be an integer")))?;
      info.mp_end = args[1]
        .parse()
        .map_err(|_| Error::from(FormatError::new(file, line, "mp_levels: <end> must be an integer")))?;
    }
    "text_type" => {
      need(1)?;
      info.label_type = Some(make_type(VMap2objClass::Text, parse_type_num(&args[0], file, line)?));
    }
    "label_scale" => {
      need(1)?;
      info.label_scale = args[0].parse().map_err(|_| Error::from(FormatError::new(file, line, "label_scale: not a number")))?;
    }
    "label_align" => {
      need(1)?;
      info.label_align = parse_align(&args[0]).ok_or_else(|| FormatError::new(file, line, format!("unknown align: {:?}", args[0])))?;
    }
    "label_as_point" => {
      need(1)?;
      info.label_as_point = Some(make_type(VMap2objClass::Point, parse_type_num(&args[0], file, line)?));
    }
    "max_labels" => {
      need(1)?;
      info.max_labels = if args[0] == "auto" { None } else { Some(args[0].parse().map_err(|_| Error::from(FormatError::new(file, line, "max_labels: not a number or 'auto'")))?) };
    }
    other => return Err(FormatError::new(file, line, format!("unknown feature: {other:?}")).into()),
  }
  Ok(())
}

fn parse_align(s: &str) -> Option<VMap2objAlign> {
  Some(match s {
    "SW" => VMap2objAlign::SW,
    "W" => VMap2objAlign::W,
    "NW" => VMap2objAlign::NW,
    "N" => VMap2objAlign::N,
    "NE" => VMap2objAlign::NE,
    "E" => VMap2objAlign::E,
    "SE" => VMap2objAlign::SE,
    "S" => VMap2objAlign::S,
    "C" => VMap2objAlign::C,
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_temp(contents: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("vmap2-catalogue-test-{}-{n}.txt", std::process::id()));
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
  }

  #[test]
  fn loads_point_with_features() {
    let path = write_temp(
      "point 0x1\n\
       + name peak\n\
       + comm \"mountain peak\"\n\
       + text_type 0x2\n",
    );
    let cat = TypeCatalogue::load(&path).unwrap();
    let t = make_type(VMap2objClass::Point, 1);
    let info = cat.get(t).unwrap();
    assert_eq!(info.name, "peak");
    assert_eq!(info.label_type, Some(make_type(VMap2objClass::Text, 2)));
    let _ = fs::remove_file(path);
  }

  #[test]
  fn define_substitutes_into_later_lines() {
    let path = write_temp(
      "define PEAK_TYPE 0x5\n\
       point ${PEAK_TYPE}\n\
       + name peak\n",
    );
    let cat = TypeCatalogue::load(&path).unwrap();
    assert!(cat.get(make_type(VMap2objClass::Point, 5)).is_some());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn mp_levels_sets_start_and_end() {
    let path = write_temp("area 1\n+ mp_levels 2 4\n");
    let cat = TypeCatalogue::load(&path).unwrap();
    let info = cat.get(make_type(VMap2objClass::Polygon, 1)).unwrap();
    assert_eq!((info.mp_start, info.mp_end), (2, 4));
    let _ = fs::remove_file(path);
  }

  #[test]
  fn feature_before_any_header_is_an_error() {
    let path = write_temp("+ name oops\n");
    assert!(TypeCatalogue::load(&path).is_err());
    let _ = fs::remove_file(path);
  }

  #[test]
  fn unknown_command_is_an_error() {
    let path = write_temp("bogus 1\n");
    assert!(TypeCatalogue::load(&path).is_err());
    let _ = fs::remove_file(path);
  }
}
