//! Xfig (`.fig`) format contract, grounded on `vmap2io_fig.cpp`: numeric
//! object records, with map-related metadata (reference points, border,
//! waypoints, tracks) carried in comment lines prefixed by a fixed
//! keyword rather than as native Fig fields.

/// Recognized comment-line prefixes that encode map metadata instead of a
/// plain object annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigCommentKind {
  /// `REF x y lon lat` — one [`crate::georef::GeoMap`] reference point.
  Ref,
  /// `BRD` — marks the following polyline as the map border.
  Brd,
  /// `WPT name` — a waypoint label for the following point object.
  Wpt,
  /// `TRK name` — a track label for the following polyline object.
  Trk,
  /// `MAP key value` — free-form map-level metadata.
  Map,
}

impl FigCommentKind {
  #[must_use]
  pub fn from_prefix(word: &str) -> Option<Self> {
    Some(match word {
      "REF" => Self::Ref,
      "BRD" => Self::Brd,
      "WPT" => Self::Wpt,
      "TRK" => Self::Trk,
      "MAP" => Self::Map,
      _ => return None,
    })
  }
}

/// One Fig object record carrying its own class/type plus any metadata
/// comment lines that preceded it in the file.
#[derive(Debug, Clone, Default)]
pub struct FigObject {
  pub fig_type: i32,
  pub points: Vec<(f64, f64)>,
  pub comments: Vec<String>,
}
