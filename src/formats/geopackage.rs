//! GeoPackage contract: SQLite tables enumerated via `gpkg_contents` and
//! `gpkg_geometry_columns`, geometries decoded as (E)WKB with an optional
//! envelope header and CRS id. No SQLite driver is wired in here; this
//! module fixes the row shapes a real adapter would map `rusqlite` query
//! results into.

/// One row of `gpkg_contents` naming a feature table.
#[derive(Debug, Clone)]
pub struct ContentsRow {
  pub table_name: String,
  pub data_type: String,
  pub srs_id: i64,
}

/// One row of `gpkg_geometry_columns` naming the geometry column and its
/// type for a feature table.
#[derive(Debug, Clone)]
pub struct GeometryColumnRow {
  pub table_name: String,
  pub column_name: String,
  pub geometry_type_name: String,
  pub srs_id: i64,
}

/// GeoPackage binary geometry header flags (envelope presence/size, byte
/// order) that precede the WKB body in every geometry blob.
#[derive(Debug, Clone, Copy)]
pub struct GeometryHeader {
  pub little_endian: bool,
  pub envelope_words: u8,
  pub srs_id: i32,
}

impl GeometryHeader {
  /// Parses the fixed 8-byte-aligned header (magic `GP`, version byte,
  /// flags byte, 4-byte srs id) preceding a GeoPackage geometry blob's
  /// envelope and WKB payload.
  pub fn parse(bytes: &[u8]) -> Option<(Self, usize)> {
    if bytes.len() < 8 || &bytes[0..2] != b"GP" {
      return None;
    }
    let flags = bytes[3];
    let little_endian = flags & 0x01 != 0;
    let envelope_words = match (flags >> 1) & 0x07 {
      0 => 0,
      1 => 4,
      2 | 3 => 6,
      _ => 8,
    };
    let srs_id = if little_endian { i32::from_le_bytes(bytes[4..8].try_into().unwrap()) } else { i32::from_be_bytes(bytes[4..8].try_into().unwrap()) };
    let header_len = 8 + envelope_words as usize * 8;
    Some((Self { little_endian, envelope_words, srs_id }, header_len))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_header_with_no_envelope() {
    let mut bytes = vec![b'G', b'P', 0, 0b0000_0001, 0, 0, 0, 0];
    bytes[4..8].copy_from_slice(&4326i32.to_le_bytes());
    let (hdr, len) = GeometryHeader::parse(&bytes).unwrap();
    assert!(hdr.little_endian);
    assert_eq!(hdr.srs_id, 4326);
    assert_eq!(len, 8);
  }
}
