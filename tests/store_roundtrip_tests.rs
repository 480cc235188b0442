use std::sync::atomic::{AtomicU32, Ordering};

use vmap2::geom::{MultiLine, Point};
use vmap2::store::obj::VMap2objDir;
use vmap2::store::{VMap2, VMap2obj, VMap2objClass};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn scratch_path(name: &str) -> std::path::PathBuf {
  let n = COUNTER.fetch_add(1, Ordering::Relaxed);
  std::env::temp_dir().join(format!("vmap2-integration-{}-{n}-{name}", std::process::id()))
}

#[test]
fn file_backed_store_survives_add_put_del_and_reopen() {
  let path = scratch_path("roundtrip.vmap2");
  let _ = std::fs::remove_file(&path);

  let (peak_id, trail_id) = {
    let mut store = VMap2::open_file(&path, true).unwrap();

    let mut peak = VMap2obj::new(VMap2objClass::Point, 10);
    peak.name = "peak".into();
    peak.src = "survey.gpx".into();
    peak.coords = MultiLine::single_point(Point::new(24.9, 60.17));
    let peak_id = store.add(peak).unwrap();

    let mut trail = VMap2obj::new(VMap2objClass::Line, 1);
    trail.dir = VMap2objDir::Frw;
    trail.coords = MultiLine::single_point(Point::new(24.9, 60.17));
    let trail_id = store.add(trail).unwrap();

    // put() overwrites the peak's name in place.
    let mut updated = store.get(peak_id).unwrap();
    updated.name = "named peak".into();
    store.put(peak_id, updated).unwrap();

    store.del(trail_id).unwrap();

    (peak_id, trail_id)
  };

  let mut reopened = VMap2::open_file(&path, false).unwrap();
  assert!(reopened.contains(peak_id));
  assert!(!reopened.contains(trail_id));

  let peak = reopened.get(peak_id).unwrap();
  assert_eq!(peak.name, "named peak");
  assert_eq!(peak.src, "survey.gpx");
  assert_eq!(peak.tnum(), 10);

  let _ = std::fs::remove_file(&path);
}

#[test]
fn in_memory_store_iterates_every_surviving_object() {
  let mut store = VMap2::new_in_memory();
  for i in 0..5 {
    let mut obj = VMap2obj::new(VMap2objClass::Point, i);
    obj.coords = MultiLine::single_point(Point::new(f64::from(i), f64::from(i)));
    let id = store.add(obj).unwrap();
    if i == 2 {
      store.del(id).unwrap();
    }
  }

  store.iter_start();
  let mut seen = Vec::new();
  while let Some((_, obj)) = store.iter_get_next().unwrap() {
    seen.push(obj.tnum());
  }
  seen.sort_unstable();
  assert_eq!(seen, vec![0, 1, 3, 4]);
}
