//! OSM XML format contract, grounded on `vmap2io_osm.cpp`: nodes, ways,
//! and relations carrying free-form tags, translated into VMap2 types via
//! a tag-set -> type config file rather than a built-in mapping.

use std::collections::BTreeMap;

/// One `<tag k="..." v="...">` pair, kept as strings until a
/// [`TagRule`] resolves it to a type.
pub type Tags = BTreeMap<String, String>;

/// `node` / `way` / `relation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsmElementKind {
  Node,
  Way,
  Relation,
}

/// One parsed OSM element before type resolution.
#[derive(Debug, Clone)]
pub struct OsmElement {
  pub kind: OsmElementKind,
  pub id: i64,
  pub tags: Tags,
  /// Node: a single coordinate. Way: resolved node coordinates in member
  /// order. Relation: left empty; relations are not geometry-bearing on
  /// their own in this contract.
  pub points: Vec<(f64, f64)>,
}

/// One line of the tag-set -> type mapping config: every `(key, value)`
/// in `when` must be present on the element for `type_` to apply; the
/// first matching rule in file order wins.
#[derive(Debug, Clone)]
pub struct TagRule {
  pub when: Vec<(String, String)>,
  pub type_: u32,
}

#[must_use]
pub fn resolve_type(tags: &Tags, rules: &[TagRule]) -> Option<u32> {
  rules.iter().find(|r| r.when.iter().all(|(k, v)| tags.get(k).is_some_and(|tv| tv == v))).map(|r| r.type_)
}
