//! Edit-script runner (§4.7): a small DSL of `if`/`and`/`or` condition
//! groups followed by commands, applied to every object of an open store,
//! grounded on `vmap2edit/vmap2edit.h`'s statement grammar and
//! `vmap2edit/actions.h`'s per-command dispatch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::catalogue::tokenize;
use crate::conv::Conversion;
use crate::error::{EditError, Error};
use crate::geom::{Point, Rect};
use crate::store::obj::{class_from_word, make_type, parse_type, parse_type_num, print_type, VMap2objClass};
use crate::store::VMap2;

/// One condition of an `if`/`and`/`or` clause.
#[derive(Debug, Clone)]
pub enum Condition {
  ClassEq(VMap2objClass),
  ClassNe(VMap2objClass),
  TypeEq(u32),
  TypeNe(u32),
  RefTypeEq(u32),
  RefTypeNe(u32),
}

impl Condition {
  fn matches(&self, obj: &crate::store::obj::VMap2obj) -> bool {
    match self {
      Self::ClassEq(c) => obj.class() == *c,
      Self::ClassNe(c) => obj.class() != *c,
      Self::TypeEq(t) => obj.type_ == *t,
      Self::TypeNe(t) => obj.type_ != *t,
      Self::RefTypeEq(t) => obj.ref_type == *t,
      Self::RefTypeNe(t) => obj.ref_type != *t,
    }
  }
}

/// One `delete`/`set_type`/... command.
#[derive(Debug, Clone)]
pub enum Command {
  Delete,
  Print(String),
  SetType(u32),
  SetRefType(u32),
  SetScale(f32),
  SetAngle(f32),
  SetName(String),
  ReName(Regex, String),
  TrName(String, String),
  CropRect(Rect),
  CropNom(String),
  CropNomFi(String),
  SetAltName(PathBuf),
  MoveEnds(f64, Vec<u32>),
  RemShort(usize, f64),
  RemDupPts(f64),
  Translate(PathBuf),
}

#[derive(Debug, Clone)]
enum Line {
  If(Vec<Condition>, Option<Command>),
  And(Vec<Condition>),
  Or(Vec<Condition>),
  Cmd(Command),
}

/// A parsed edit script.
#[derive(Debug, Clone, Default)]
pub struct Script {
  lines: Vec<Line>,
}

fn parse_condition(tok: &str, file: &Path, line: usize) -> Result<Condition, Error> {
  let syntax_err = |message: &str| Error::from(EditError::Syntax { file: file.to_path_buf(), line, message: message.to_string() });
  let (lhs, op, rhs) = if let Some(rhs) = tok.strip_prefix("ref_type==") {
    ("ref_type", "==", rhs)
  } else if let Some(rhs) = tok.strip_prefix("ref_type!=") {
    ("ref_type", "!=", rhs)
  } else if let Some(rhs) = tok.strip_prefix("type==") {
    ("type", "==", rhs)
  } else if let Some(rhs) = tok.strip_prefix("type!=") {
    ("type", "!=", rhs)
  } else {
    return Err(syntax_err(&format!("unrecognized condition: {tok:?}")));
  };

  let type_value = |rhs: &str| -> Result<(Option<VMap2objClass>, Option<u32>), Error> {
    if let Some(class) = class_from_word(rhs) {
      return Ok((Some(class), None));
    }
    if let Some(t) = parse_type(rhs) {
      return Ok((None, Some(t)));
    }
    let Some(t) = parse_type_num(rhs) else {
      return Err(syntax_err(&format!("not a class or type: {rhs:?}")));
    };
    Ok((None, Some(t)))
  };

  match lhs {
    "type" => {
      let (class, t) = type_value(rhs)?;
      match (class, t, op) {
        (Some(c), _, "==") => Ok(Condition::ClassEq(c)),
        (Some(c), _, _) => Ok(Condition::ClassNe(c)),
        (None, Some(t), "==") => Ok(Condition::TypeEq(t)),
        (None, Some(t), _) => Ok(Condition::TypeNe(t)),
        (None, None, _) => Err(syntax_err("type condition needs a class or a concrete type")),
      }
    }
    _ => {
      let (_, t) = type_value(rhs)?;
      let t = t.ok_or_else(|| syntax_err("ref_type condition needs a concrete type, not a bare class"))?;
      Ok(if op == "==" { Condition::RefTypeEq(t) } else { Condition::RefTypeNe(t) })
    }
  }
}

fn parse_command(tokens: &[String], file: &Path, line: usize) -> Result<Command, Error> {
  let syntax_err = |message: String| Error::from(EditError::Syntax { file: file.to_path_buf(), line, message });
  let need = |n: usize| -> Result<(), Error> {
    if tokens.len() != n + 1 {
      return Err(syntax_err(format!("{}: {n} argument(s) expected", tokens[0])));
    }
    Ok(())
  };
  let num = |s: &str| -> Result<f64, Error> { s.parse().map_err(|_| syntax_err(format!("not a number: {s:?}"))) };
  let type_of = |s: &str| -> Result<u32, Error> {
    parse_type(s).or_else(|| parse_type_num(s)).ok_or_else(|| syntax_err(format!("not a type: {s:?}")))
  };

  Ok(match tokens[0].as_str() {
    "delete" => {
      need(0)?;
      Command::Delete
    }
    "print" => Command::Print(tokens[1..].join(" ")),
    "set_type" => {
      need(1)?;
      Command::SetType(type_of(&tokens[1])?)
    }
    "set_ref_type" => {
      need(1)?;
      Command::SetRefType(type_of(&tokens[1])?)
    }
    "set_scale" => {
      need(1)?;
      Command::SetScale(num(&tokens[1])? as f32)
    }
    "set_angle" => {
      need(1)?;
      Command::SetAngle(num(&tokens[1])? as f32)
    }
    "set_name" => {
      need(1)?;
      Command::SetName(tokens[1].clone())
    }
    "re_name" => {
      need(2)?;
      let re = Regex::new(&tokens[1]).map_err(|e| syntax_err(format!("bad regex {:?}: {e}", tokens[1])))?;
      Command::ReName(re, tokens[2].clone())
    }
    "tr_name" => {
      need(2)?;
      Command::TrName(tokens[1].clone(), tokens[2].clone())
    }
    "crop_rect" => {
      need(4)?;
      Command::CropRect(Rect::new(num(&tokens[1])?, num(&tokens[2])?, num(&tokens[3])?, num(&tokens[4])?))
    }
    "crop_nom" => {
      need(1)?;
      Command::CropNom(tokens[1].clone())
    }
    "crop_nom_fi" => {
      need(1)?;
      Command::CropNomFi(tokens[1].clone())
    }
    "set_alt_name" => {
      need(1)?;
      Command::SetAltName(PathBuf::from(&tokens[1]))
    }
    "move_ends" => {
      if tokens.len() < 3 {
        return Err(syntax_err("move_ends: <dist> <type>... expected".into()));
      }
      let dist = num(&tokens[1])?;
      let types = tokens[2..].iter().map(|t| type_of(t)).collect::<Result<Vec<_>, _>>()?;
      Command::MoveEnds(dist, types)
    }
    "rem_short" => {
      need(2)?;
      Command::RemShort(num(&tokens[1])? as usize, num(&tokens[2])?)
    }
    "rem_dup_pts" => {
      need(1)?;
      Command::RemDupPts(num(&tokens[1])?)
    }
    "translate" => {
      need(1)?;
      Command::Translate(PathBuf::from(&tokens[1]))
    }
    other => return Err(syntax_err(format!("unknown command: {other:?}"))),
  })
}

impl Script {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    Self::parse(&text, path)
  }

  pub fn parse(text: &str, file: &Path) -> Result<Self, Error> {
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
      let line_num = idx + 1;
      let trimmed = raw.trim();
      if trimmed.is_empty() || trimmed.starts_with('#') {
        continue;
      }
      let tokens = tokenize(trimmed);
      let head = tokens[0].as_str();
      match head {
        "if" | "and" | "or" => {
          let rest = &tokens[1..];
          let then_idx = rest.iter().position(|t| t == "then");
          let (cond_tokens, then_cmd) = match then_idx {
            Some(i) => {
              if i + 1 >= rest.len() {
                return Err(Error::from(EditError::Syntax { file: file.to_path_buf(), line: line_num, message: "then: command expected".into() }));
              }
              (&rest[..i], Some(parse_command(&rest[i + 1..], file, line_num)?))
            }
            None => (rest, None),
          };
          if cond_tokens.is_empty() {
            return Err(Error::from(EditError::Syntax { file: file.to_path_buf(), line: line_num, message: format!("{head}: at least one condition expected") }));
          }
          let conds = cond_tokens.iter().map(|t| parse_condition(t, file, line_num)).collect::<Result<Vec<_>, _>>()?;
          lines.push(match head {
            "if" => Line::If(conds, then_cmd),
            "and" => Line::And(conds),
            _ => Line::Or(conds),
          });
        }
        _ => lines.push(Line::Cmd(parse_command(&tokens, file, line_num)?)),
      }
    }
    Ok(Self { lines })
  }
}

/// Resolves a Soviet (`crop_nom`) or Finnish (`crop_nom_fi`) map sheet
/// name to its WGS84 bounding box, reusing the same nomenclature decoders
/// `georef::builders` uses to seed a [`crate::georef::GeoMap`] from a
/// sheet name.
fn nomenclature_rect(name: &str, finnish: bool) -> Result<Rect, Error> {
  if finnish {
    let rect_m = crate::georef::builders::nom_to_range_fi(name)?;
    let conv = crate::conv::Conv::proj("FI", "WGS")?;
    Ok(conv.frw_acc_rect(&rect_m, crate::conv::DEFAULT_ACCURACY)?)
  } else {
    Ok(crate::georef::builders::nom_to_range_su(name)?.0)
  }
}

/// Expands `${name}`, `${type}`, `${ref_type}`, `${angle}`, `${scale}` in a
/// `print` command's message against the matching object's own fields.
fn substitute_print_template(msg: &str, obj: &crate::store::obj::VMap2obj) -> String {
  let format_f32 = |v: f32| if v.is_nan() { "nan".to_string() } else { v.to_string() };
  msg
    .replace("${name}", &obj.name)
    .replace("${type}", &print_type(obj.type_))
    .replace("${ref_type}", &print_type(obj.ref_type))
    .replace("${angle}", &format_f32(obj.angle))
    .replace("${scale}", &format_f32(obj.scale))
}

fn dedup_points(pts: &[Point], dist: f64) -> Vec<Point> {
  let mut out: Vec<Point> = Vec::with_capacity(pts.len());
  for &p in pts {
    if out.last().is_some_and(|last: &Point| last.dist2d(&p) < dist) {
      continue;
    }
    out.push(p);
  }
  out
}

fn apply_command(store: &mut VMap2, id: u32, obj: &mut crate::store::obj::VMap2obj, cmd: &Command, log: &mut Vec<String>, deleted: &mut bool) -> Result<(), Error> {
  match cmd {
    Command::Delete => *deleted = true,
    Command::Print(msg) => log.push(format!("{id}: {}", substitute_print_template(msg, obj))),
    Command::SetType(t) => obj.type_ = *t,
    Command::SetRefType(t) => obj.ref_type = *t,
    Command::SetScale(s) => obj.scale = *s,
    Command::SetAngle(a) => obj.angle = *a,
    Command::SetName(n) => obj.name = n.clone(),
    Command::ReName(re, repl) => obj.name = re.replace_all(&obj.name, repl.as_str()).into_owned(),
    Command::TrName(old, new) => {
      if obj.name == *old {
        obj.name = new.clone();
      }
    }
    Command::CropRect(rect) => {
      obj.coords = obj.coords.crop_rect(rect);
      if obj.coords.0.is_empty() {
        *deleted = true;
      }
    }
    Command::CropNom(name) => {
      let rect = nomenclature_rect(name, false)?;
      obj.coords = obj.coords.crop_rect(&rect);
      if obj.coords.0.is_empty() {
        *deleted = true;
      }
    }
    Command::CropNomFi(name) => {
      let rect = nomenclature_rect(name, true)?;
      obj.coords = obj.coords.crop_rect(&rect);
      if obj.coords.0.is_empty() {
        *deleted = true;
      }
    }
    Command::SetAltName(dir) => {
      let path = dir.join(&obj.name);
      if let Ok(alt) = fs::read_to_string(&path) {
        obj.comm = alt.trim().to_string();
      }
    }
    Command::MoveEnds(dist, types) => {
      for line in &mut obj.coords.0 {
        if let Some(first) = line.0.first().copied() {
          if let Some(target) = nearest_of_types(store, first, *dist, types) {
            line.0[0] = target;
          }
        }
        if line.0.len() > 1 {
          let last_idx = line.0.len() - 1;
          let last = line.0[last_idx];
          if let Some(target) = nearest_of_types(store, last, *dist, types) {
            line.0[last_idx] = target;
          }
        }
      }
    }
    Command::RemShort(npts, len) => {
      obj.coords.0.retain(|line| line.0.len() >= *npts && line.length() >= *len);
    }
    Command::RemDupPts(dist) => {
      for line in &mut obj.coords.0 {
        line.0 = dedup_points(&line.0, *dist);
      }
    }
    Command::Translate(dict_path) => {
      if let Ok(text) = fs::read_to_string(dict_path) {
        let dict: BTreeMap<String, String> = text
          .lines()
          .filter_map(|l| l.split_once('='))
          .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
          .collect();
        if let Some(new_name) = dict.get(&obj.name) {
          obj.name = new_name.clone();
        }
      }
    }
  }
  Ok(())
}

fn nearest_of_types(store: &VMap2, from: Point, dist: f64, types: &[u32]) -> Option<Point> {
  let margin = dist.max(1e-9);
  let rect = Rect::new(from.x - margin, from.y - margin, from.x + margin, from.y + margin);
  let mut best: Option<(Point, f64)> = None;
  for &t in types {
    for cand_id in store.find(t, &rect) {
      let Ok(cand) = store.get(cand_id) else { continue };
      for line in &cand.coords.0 {
        for &p in &line.0 {
          let d2 = from.dist2d(&p);
          if d2 <= dist && best.is_none_or(|(_, bd)| d2 < bd) {
            best = Some((p, d2));
          }
        }
      }
    }
  }
  best.map(|(p, _)| p)
}

/// Runs `script` against every object currently in `store`, applying
/// commands to objects whose accumulated condition group evaluates true,
/// and returns the `print` command's log lines in object id order.
pub fn run(store: &mut VMap2, script: &Script) -> Result<Vec<String>, Error> {
  let mut ids = Vec::new();
  store.iter_start();
  while let Some((id, _)) = store.iter_get_next()? {
    ids.push(id);
  }

  let mut log = Vec::new();
  for id in ids {
    if !store.contains(id) {
      continue;
    }
    let mut obj = store.get(id)?;
    let mut global = true;
    let mut deleted = false;

    for line in &script.lines {
      match line {
        Line::If(conds, then) => {
          global = conds.iter().all(|c| c.matches(&obj));
          if global {
            if let Some(cmd) = then {
              apply_command(store, id, &mut obj, cmd, &mut log, &mut deleted)?;
            }
          }
        }
        Line::And(conds) => global = global && conds.iter().all(|c| c.matches(&obj)),
        Line::Or(conds) => global = global || conds.iter().all(|c| c.matches(&obj)),
        Line::Cmd(cmd) => {
          if global {
            apply_command(store, id, &mut obj, cmd, &mut log, &mut deleted)?;
          }
        }
      }
      if deleted {
        break;
      }
    }

    if deleted {
      store.del(id)?;
    } else {
      store.put(id, obj)?;
    }
  }
  Ok(log)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::obj::{VMap2obj, VMap2objClass};
  use std::path::PathBuf;

  fn script(text: &str) -> Script {
    Script::parse(text, &PathBuf::from("<test>")).unwrap()
  }

  #[test]
  fn delete_removes_matching_objects() {
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = crate::geom::MultiLine::single_point(Point::new(10.0, 20.0));
    let id = store.add(obj).unwrap();

    let s = script("if type==1\ndelete\n");
    run(&mut store, &s).unwrap();
    assert!(!store.contains(id));
  }

  #[test]
  fn non_matching_type_is_untouched() {
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = crate::geom::MultiLine::single_point(Point::new(10.0, 20.0));
    let id = store.add(obj).unwrap();

    let s = script("if type==2\ndelete\n");
    run(&mut store, &s).unwrap();
    assert!(store.contains(id));
  }

  #[test]
  fn set_type_inline_via_then() {
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = crate::geom::MultiLine::single_point(Point::new(10.0, 20.0));
    let id = store.add(obj).unwrap();

    let s = script("if type==1 then set_type point:9\n");
    run(&mut store, &s).unwrap();
    assert_eq!(store.get(id).unwrap().type_, make_type(VMap2objClass::Point, 9));
  }

  #[test]
  fn or_widens_the_match() {
    let mut store = VMap2::new_in_memory();
    let mut a = VMap2obj::new(VMap2objClass::Point, 1);
    a.coords = crate::geom::MultiLine::single_point(Point::new(0.0, 0.0));
    let mut b = VMap2obj::new(VMap2objClass::Point, 2);
    b.coords = crate::geom::MultiLine::single_point(Point::new(0.0, 0.0));
    let id_a = store.add(a).unwrap();
    let id_b = store.add(b).unwrap();

    let s = script("if type==1\nor type==2\ndelete\n");
    run(&mut store, &s).unwrap();
    assert!(!store.contains(id_a));
    assert!(!store.contains(id_b));
  }

  #[test]
  fn print_logs_one_line_per_matching_object() {
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.name = "peak".into();
    obj.coords = crate::geom::MultiLine::single_point(Point::new(0.0, 0.0));
    store.add(obj).unwrap();

    let s = script("if type==1\nprint hello ${name} type=${type}\n");
    let log = run(&mut store, &s).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("hello peak"));
    assert!(log[0].contains("type=point:0x1"));
  }

  #[test]
  fn crop_rect_deletes_objects_entirely_outside() {
    let mut store = VMap2::new_in_memory();
    let mut obj = VMap2obj::new(VMap2objClass::Point, 1);
    obj.coords = crate::geom::MultiLine::single_point(Point::new(100.0, 100.0));
    let id = store.add(obj).unwrap();

    let s = script("if type==1\ncrop_rect 0 0 10 10\n");
    run(&mut store, &s).unwrap();
    assert!(!store.contains(id));
  }

  #[test]
  fn unknown_command_is_a_syntax_error() {
    assert!(Script::parse("bogus\n", &PathBuf::from("<test>")).is_err());
  }
}
