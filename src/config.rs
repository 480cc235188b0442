//! Runtime configuration (§6.3): recognized options merged from the
//! environment, an on-disk JSON file, and hardcoded defaults, in that
//! priority order — the same `from_env`/`from_file`/`merge` layering the
//! teacher's own `Config` uses.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use crate::style::Color;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
  /// Path to the stylesheet (`config` option).
  pub config: Option<PathBuf>,
  /// Path to the type catalogue (`types` option).
  pub types: Option<PathBuf>,
  /// `${name}` substitutions applied when loading the stylesheet.
  #[serde(default)]
  pub define: BTreeMap<String, String>,
  /// Global multiplier for stroke widths, font sizes, image sizes.
  pub obj_scale: f32,
  /// Minimum effective scale; below it `vmap_minsc_color` is painted.
  pub vmap_minsc: f64,
  #[serde(with = "color_as_u32")]
  pub vmap_minsc_color: Color,
  /// When true, pattern scale is adjusted so a tile is covered by an
  /// integer number of pattern cells.
  pub fit_patt_size: bool,
}

mod color_as_u32 {
  use super::Color;
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<S: Serializer>(c: &Color, s: S) -> Result<S::Ok, S::Error> {
    c.0.serialize(s)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Color, D::Error> {
    Ok(Color(u32::deserialize(d)?))
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      config: None,
      types: None,
      define: BTreeMap::new(),
      obj_scale: 1.0,
      vmap_minsc: 0.01,
      vmap_minsc_color: Color(0xFFDB_5A00),
      fit_patt_size: false,
    }
  }
}

impl Config {
  /// Builds the effective configuration: environment overrides win, then
  /// the on-disk file, then the hardcoded defaults fill in anything still
  /// unset.
  #[must_use]
  pub fn new() -> Self {
    let mut merged = Self::from_env();
    if let Some(from_file) = Self::from_file() {
      merged = merged.merge(from_file);
    }
    merged.merge(Self::default())
  }

  fn from_env() -> Self {
    let mut cfg = Self { config: None, types: None, define: BTreeMap::new(), obj_scale: f32::NAN, vmap_minsc: f64::NAN, vmap_minsc_color: Color(0), fit_patt_size: false };
    if let Ok(v) = std::env::var("VMAP2_CONFIG") {
      cfg.config = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("VMAP2_TYPES") {
      cfg.types = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("VMAP2_OBJ_SCALE") {
      if let Ok(v) = v.parse() {
        cfg.obj_scale = v;
      }
    }
    cfg
  }

  fn config_file_path() -> Option<PathBuf> {
    std::env::var("VMAP2_CONFIG_FILE").ok().map(PathBuf::from).or_else(|| dirs::home_dir().map(|p| p.join(".config/vmap2/config.json")))
  }

  fn from_file() -> Option<Self> {
    let path = Self::config_file_path()?;
    let text = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&text).inspect_err(|e| warn!("failed to parse config file {}: {e}", path.display())).ok()
  }

  /// Fills every field this config left unset (`None`, empty map, or
  /// `NaN` for the numeric options) with `other`'s value.
  #[must_use]
  fn merge(mut self, other: Self) -> Self {
    self.config = self.config.or(other.config);
    self.types = self.types.or(other.types);
    for (k, v) in other.define {
      self.define.entry(k).or_insert(v);
    }
    if self.obj_scale.is_nan() {
      self.obj_scale = other.obj_scale;
    }
    if self.vmap_minsc.is_nan() {
      self.vmap_minsc = other.vmap_minsc;
    }
    if self.vmap_minsc_color.0 == 0 {
      self.vmap_minsc_color = other.vmap_minsc_color;
    }
    if !self.fit_patt_size {
      self.fit_patt_size = other.fit_patt_size;
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_matches_the_stylesheets_own_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.obj_scale, 1.0);
    assert_eq!(cfg.vmap_minsc, 0.01);
  }

  #[test]
  fn merge_fills_unset_numeric_fields_from_the_fallback() {
    let partial = Config { obj_scale: 2.0, ..Config::default() };
    let merged = Config { obj_scale: f32::NAN, vmap_minsc: f64::NAN, vmap_minsc_color: Color(0), fit_patt_size: false, ..Config::default() }.merge(partial);
    assert_eq!(merged.obj_scale, 2.0);
  }
}
