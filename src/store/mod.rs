//! `VMap2`: the typed object store (§3.4, §4.3). Objects live keyed by a
//! 32-bit id in one of two interchangeable backends (in-memory or a plain
//! file), with a geohash reverse index kept in lockstep for spatial
//! queries.

pub mod geohash;
pub mod obj;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, StoreError};
use crate::geom::{MultiLine, Rect};
use geohash::GeoHashIndex;
pub use obj::{VMap2obj, VMap2objAlign, VMap2objClass, NONE_ID};

/// The lowest id `add` ever assigns; `0..=99` is reserved for metadata
/// records (§3.4, §6.4).
const FIRST_USER_ID: u32 = 100;

/// Byte storage keyed by id, with ordered iteration. Both backends commit a
/// mutation before `put`/`del` return (§4.3 "in-memory vs file-backed").
trait Backend: std::fmt::Debug {
  fn get(&self, id: u32) -> Option<&[u8]>;
  fn put(&mut self, id: u32, bytes: Vec<u8>) -> Result<(), Error>;
  fn del(&mut self, id: u32) -> Result<(), Error>;
  fn ids(&self) -> Vec<u32>;
}

#[derive(Debug, Default)]
struct MemoryBackend {
  records: BTreeMap<u32, Vec<u8>>,
}

impl Backend for MemoryBackend {
  fn get(&self, id: u32) -> Option<&[u8]> {
    self.records.get(&id).map(Vec::as_slice)
  }

  fn put(&mut self, id: u32, bytes: Vec<u8>) -> Result<(), Error> {
    self.records.insert(id, bytes);
    Ok(())
  }

  fn del(&mut self, id: u32) -> Result<(), Error> {
    self.records.remove(&id);
    Ok(())
  }

  fn ids(&self) -> Vec<u32> {
    self.records.keys().copied().collect()
  }
}

/// A plain, dependency-free on-disk format: a flat sequence of
/// `id(u32 LE) len(u32 LE) bytes` records, rewritten in full on every
/// mutation. There is no external embedded-database crate in the dependency
/// stack this was built from, so this stands in for the original's
/// keyed-file backend (see the project notes on that substitution).
#[derive(Debug)]
struct FileBackend {
  path: PathBuf,
  records: BTreeMap<u32, Vec<u8>>,
}

impl FileBackend {
  fn open(path: impl Into<PathBuf>, create: bool) -> Result<Self, Error> {
    let path = path.into();
    let mut records = BTreeMap::new();
    match fs::read(&path) {
      Ok(bytes) => records = parse_records(&bytes)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {}
      Err(e) => return Err(e.into()),
    }
    let backend = Self { path, records };
    backend.flush()?;
    Ok(backend)
  }

  fn flush(&self) -> Result<(), Error> {
    let mut out = Vec::new();
    for (id, bytes) in &self.records {
      out.extend_from_slice(&id.to_le_bytes());
      out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
      out.extend_from_slice(bytes);
    }
    fs::write(&self.path, out)?;
    Ok(())
  }
}

fn parse_records(bytes: &[u8]) -> Result<BTreeMap<u32, Vec<u8>>, Error> {
  let mut records = BTreeMap::new();
  let mut pos = 0;
  while pos + 8 <= bytes.len() {
    let id = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
    let len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
    pos += 8;
    if pos + len > bytes.len() {
      return Err(StoreError::CorruptRecord(id, "record length overruns the file".into()).into());
    }
    records.insert(id, bytes[pos..pos + len].to_vec());
    pos += len;
  }
  Ok(records)
}

impl Backend for FileBackend {
  fn get(&self, id: u32) -> Option<&[u8]> {
    self.records.get(&id).map(Vec::as_slice)
  }

  fn put(&mut self, id: u32, bytes: Vec<u8>) -> Result<(), Error> {
    self.records.insert(id, bytes);
    self.flush()
  }

  fn del(&mut self, id: u32) -> Result<(), Error> {
    self.records.remove(&id);
    self.flush()
  }

  fn ids(&self) -> Vec<u32> {
    self.records.keys().copied().collect()
  }
}

fn gh_sidecar_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
  name.push("_gh");
  path.with_file_name(name)
}

/// The typed object store. Spatial queries are always served from the
/// in-memory geohash index, never from stale results a caller might be
/// holding onto (§4.3: "callers must never assume cached results survive a
/// subsequent add/put/del").
#[derive(Debug)]
pub struct VMap2 {
  backend: Box<dyn Backend>,
  index: GeoHashIndex,
  index_path: Option<PathBuf>,
  /// Store-level map name (§3.4 per-store singleton).
  pub name: String,
  pub comm: String,
  /// Store-level border, WGS84 (§3.4).
  pub border: MultiLine,
  iter_cursor: Option<u32>,
}

impl VMap2 {
  /// An in-memory store with no backing file.
  #[must_use]
  pub fn new_in_memory() -> Self {
    Self {
      backend: Box::new(MemoryBackend::default()),
      index: GeoHashIndex::new(),
      index_path: None,
      name: String::new(),
      comm: String::new(),
      border: MultiLine::default(),
      iter_cursor: None,
    }
  }

  /// Opens (or creates) a file-backed store at `path`. The geohash sidecar
  /// (`<path>_gh`) is loaded if present; otherwise the index is rebuilt from
  /// the objects themselves.
  pub fn open_file(path: impl AsRef<Path>, create: bool) -> Result<Self, Error> {
    let path = path.as_ref();
    let backend = FileBackend::open(path, create)?;
    let index_path = gh_sidecar_path(path);
    let index = match fs::read_to_string(&index_path) {
      Ok(text) => GeoHashIndex::from_lines(&text.lines().map(str::to_string).collect::<Vec<_>>()),
      Err(_) => rebuild_index(&backend)?,
    };
    Ok(Self {
      backend: Box::new(backend),
      index,
      index_path: Some(index_path),
      name: String::new(),
      comm: String::new(),
      border: MultiLine::default(),
      iter_cursor: None,
    })
  }

  fn persist_index(&self) -> Result<(), Error> {
    if let Some(path) = &self.index_path {
      fs::write(path, self.index.to_lines().join("\n"))?;
    }
    Ok(())
  }

  /// Assigns a fresh id (`max(last, 99) + 1`), writes the packed object, and
  /// updates the geohash index.
  pub fn add(&mut self, obj: VMap2obj) -> Result<u32, Error> {
    let id = self.backend.ids().into_iter().filter(|id| *id >= FIRST_USER_ID).max().map_or(FIRST_USER_ID, |max| max + 1);
    self.put(id, obj)?;
    Ok(id)
  }

  /// Replaces (or creates) the record at `id`. Fails for ids reserved for
  /// metadata or the "invalid" sentinel.
  pub fn put(&mut self, id: u32, obj: VMap2obj) -> Result<(), Error> {
    if id < FIRST_USER_ID || id == NONE_ID {
      return Err(StoreError::ReservedId(id).into());
    }
    obj.check_invariants()?;
    if let Some(old_bytes) = self.backend.get(id) {
      match VMap2obj::unpack(old_bytes) {
        Ok(old) => self.index.remove(old.type_, &old.coords.bbox(), id),
        Err(e) => warn!(id, error = %e, "dropping corrupt record found while overwriting"),
      }
    }
    let bbox = obj.coords.bbox();
    let type_ = obj.type_;
    self.backend.put(id, obj.pack())?;
    self.index.insert(type_, &bbox, id);
    self.persist_index()
  }

  #[must_use]
  pub fn contains(&self, id: u32) -> bool {
    self.backend.get(id).is_some()
  }

  pub fn get(&self, id: u32) -> Result<VMap2obj, Error> {
    let bytes = self.backend.get(id).ok_or(StoreError::MissingId(id))?;
    VMap2obj::unpack(bytes)
  }

  pub fn del(&mut self, id: u32) -> Result<(), Error> {
    let obj = self.get(id)?;
    self.index.remove(obj.type_, &obj.coords.bbox(), id);
    self.backend.del(id)?;
    self.persist_index()
  }

  /// Ids of exactly `type_` intersecting `rect` (empty rect matches all).
  #[must_use]
  pub fn find(&self, type_: u32, rect: &Rect) -> BTreeSet<u32> {
    self.index.find_type(type_, rect)
  }

  /// Ids whose class matches, intersecting `rect`.
  #[must_use]
  pub fn find_class(&self, class: VMap2objClass, rect: &Rect) -> BTreeSet<u32> {
    self.index.find_class(class, rect)
  }

  #[must_use]
  pub fn types(&self) -> BTreeSet<u32> {
    self.index.types()
  }

  /// Aggregate bbox in WGS84 from the geohash index.
  #[must_use]
  pub fn bbox(&self) -> Rect {
    self.index.bbox()
  }

  /// Resets the single store-wide iteration cursor.
  pub fn iter_start(&mut self) {
    self.iter_cursor = None;
  }

  /// Returns the next `(id, object)` pair in id order and advances the
  /// cursor, or `None` once exhausted.
  pub fn iter_get_next(&mut self) -> Result<Option<(u32, VMap2obj)>, Error> {
    let mut ids = self.backend.ids();
    ids.sort_unstable();
    let next_id = match self.iter_cursor {
      None => ids.into_iter().find(|id| *id >= FIRST_USER_ID),
      Some(cursor) => ids.into_iter().find(|id| *id > cursor),
    };
    match next_id {
      Some(id) => {
        self.iter_cursor = Some(id);
        Ok(Some((id, self.get(id)?)))
      }
      None => Ok(None),
    }
  }

  #[must_use]
  pub fn iter_end(&self) -> bool {
    let mut ids = self.backend.ids();
    ids.retain(|id| *id >= FIRST_USER_ID);
    match self.iter_cursor {
      None => ids.is_empty(),
      Some(cursor) => !ids.iter().any(|id| *id > cursor),
    }
  }

  fn iter_all(&self) -> Result<Vec<(u32, VMap2obj)>, Error> {
    let mut ids = self.backend.ids();
    ids.retain(|id| *id >= FIRST_USER_ID);
    ids.sort_unstable();
    ids.into_iter().map(|id| Ok((id, self.get(id)?))).collect()
  }

  /// Snaps each Text object's `ref_pt` to the nearest object of its
  /// `ref_type` within `[d1, d2]`, returning `object_id -> [label_id, ...]`.
  pub fn find_refs(&self, d1: f64, d2: f64) -> Result<BTreeMap<u32, Vec<u32>>, Error> {
    let objects = self.iter_all()?;
    let mut out: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (label_id, label) in &objects {
      if label.class() != VMap2objClass::Text || label.ref_type == NONE_ID {
        continue;
      }
      let mut best: Option<(u32, f64)> = None;
      for (cand_id, cand) in &objects {
        if cand.type_ != label.ref_type {
          continue;
        }
        let Some((_, dist2)) = cand.coords.0.iter().filter_map(|l| l.nearest_point(&label.ref_pt)).min_by(|a, b| a.1.total_cmp(&b.1)) else {
          continue;
        };
        let dist = dist2.sqrt();
        if dist >= d1 && dist <= d2 && best.is_none_or(|(_, best_dist)| dist < best_dist) {
          best = Some((*cand_id, dist));
        }
      }
      if let Some((obj_id, _)) = best {
        out.entry(obj_id).or_default().push(*label_id);
      }
    }
    Ok(out)
  }
}

fn rebuild_index(backend: &FileBackend) -> Result<GeoHashIndex, Error> {
  let mut index = GeoHashIndex::new();
  for id in backend.ids() {
    if id < FIRST_USER_ID {
      continue;
    }
    let Some(bytes) = backend.get(id) else { continue };
    match VMap2obj::unpack(bytes) {
      Ok(obj) => index.insert(obj.type_, &obj.coords.bbox(), id),
      Err(e) => warn!(id, error = %e, "skipping corrupt record while rebuilding the geohash index"),
    }
  }
  Ok(index)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geom::{MultiLine, Point};

  fn point_obj(tnum: u32, lon: f64, lat: f64) -> VMap2obj {
    let mut obj = VMap2obj::new(VMap2objClass::Point, tnum);
    obj.coords = MultiLine::single_point(Point::new(lon, lat));
    obj
  }

  #[test]
  fn add_assigns_ids_from_100() {
    let mut store = VMap2::new_in_memory();
    let id1 = store.add(point_obj(1, 10.0, 20.0)).unwrap();
    let id2 = store.add(point_obj(1, 11.0, 21.0)).unwrap();
    assert_eq!(id1, 100);
    assert_eq!(id2, 101);
  }

  #[test]
  fn put_rejects_reserved_id() {
    let mut store = VMap2::new_in_memory();
    let err = store.put(5, point_obj(1, 0.0, 0.0)).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::ReservedId(5))));
  }

  #[test]
  fn get_del_roundtrip() {
    let mut store = VMap2::new_in_memory();
    let id = store.add(point_obj(2, 1.0, 1.0)).unwrap();
    assert!(store.get(id).is_ok());
    store.del(id).unwrap();
    assert!(matches!(store.get(id).unwrap_err(), Error::Store(StoreError::MissingId(_))));
  }

  #[test]
  fn find_by_type_and_bbox() {
    let mut store = VMap2::new_in_memory();
    let t = obj::make_type(VMap2objClass::Point, 3);
    let inside = store.add(point_obj(3, 24.9, 60.1)).unwrap();
    let outside = store.add(point_obj(3, -50.0, -10.0)).unwrap();
    let hits = store.find(t, &Rect::new(24.0, 60.0, 25.0, 61.0));
    assert!(hits.contains(&inside));
    assert!(!hits.contains(&outside));
  }

  #[test]
  fn iteration_visits_every_user_record_once() {
    let mut store = VMap2::new_in_memory();
    for i in 0..3 {
      store.add(point_obj(1, f64::from(i), f64::from(i))).unwrap();
    }
    store.iter_start();
    let mut seen = Vec::new();
    while let Some((id, _)) = store.iter_get_next().unwrap() {
      seen.push(id);
    }
    assert_eq!(seen, vec![100, 101, 102]);
    assert!(store.iter_end());
  }

  #[test]
  fn find_refs_snaps_label_to_nearest_in_range() {
    let mut store = VMap2::new_in_memory();
    let peak_type = obj::make_type(VMap2objClass::Point, 10);
    let peak_id = store.add(point_obj(10, 24.9, 60.17)).unwrap();

    let mut label = VMap2obj::new(VMap2objClass::Text, 1);
    label.ref_type = peak_type;
    label.ref_pt = Point::new(24.9005, 60.1701);
    label.coords = MultiLine::single_point(Point::new(24.9005, 60.1705));
    let label_id = store.add(label).unwrap();

    let refs = store.find_refs(0.0, 1.0).unwrap();
    assert_eq!(refs.get(&peak_id), Some(&vec![label_id]));
  }

  #[test]
  fn bbox_aggregates_across_records() {
    let mut store = VMap2::new_in_memory();
    store.add(point_obj(1, 0.0, 0.0)).unwrap();
    store.add(point_obj(1, 10.0, 10.0)).unwrap();
    let bbox = store.bbox();
    assert!(bbox.width() > 0.0);
  }

  #[test]
  fn file_backend_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("vmap2-store-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("test.vmap2");
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(gh_sidecar_path(&path));

    {
      let mut store = VMap2::open_file(&path, true).unwrap();
      store.add(point_obj(4, 5.0, 6.0)).unwrap();
    }
    let mut reopened = VMap2::open_file(&path, false).unwrap();
    let (id, obj) = reopened.iter_get_next().unwrap().unwrap();
    assert_eq!(id, 100);
    assert_eq!(obj.tnum(), 4);

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(gh_sidecar_path(&path));
  }
}
