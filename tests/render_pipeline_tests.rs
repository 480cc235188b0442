use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

use vmap2::catalogue::TypeCatalogue;
use vmap2::conv::Conv;
use vmap2::geom::{MultiLine, Point, Rect};
use vmap2::render::{DrawCommand, Renderer};
use vmap2::store::{VMap2, VMap2obj, VMap2objClass};
use vmap2::style::Stylesheet;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn write_stylesheet(contents: &str) -> Stylesheet {
  let n = COUNTER.fetch_add(1, Ordering::Relaxed);
  let path = std::env::temp_dir().join(format!("vmap2-integration-style-{}-{n}.cfg", std::process::id()));
  let mut f = std::fs::File::create(&path).unwrap();
  f.write_all(contents.as_bytes()).unwrap();
  let sheet = Stylesheet::load(&path).unwrap();
  let _ = std::fs::remove_file(&path);
  sheet
}

/// Loads a stylesheet, builds a store with one object of the styled type,
/// and checks the renderer walks it into a fill-then-stroke command pair
/// with no pixel backend involved.
#[test]
fn stylesheet_store_and_renderer_compose_end_to_end() {
  let sheet = write_stylesheet("point:5 fill 0xFFAABBCC\n+ stroke 0xFF000000 1.5\n");
  let catalogue = TypeCatalogue::new();

  let mut store = VMap2::new_in_memory();
  let mut summit = VMap2obj::new(VMap2objClass::Point, 5);
  summit.name = "summit".into();
  summit.coords = MultiLine::single_point(Point::new(5.0, 5.0));
  store.add(summit).unwrap();

  let mut off_map = VMap2obj::new(VMap2objClass::Point, 5);
  off_map.coords = MultiLine::single_point(Point::new(500.0, 500.0));
  store.add(off_map).unwrap();

  let renderer = Renderer::new(&sheet, &catalogue);
  let commands = renderer.render(&store, &Conv::Identity, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();

  assert_eq!(commands.len(), 2);
  assert!(matches!(commands[0], DrawCommand::FillPath { .. }));
  assert!(matches!(commands[1], DrawCommand::StrokePath { .. }));
}

#[test]
fn untyped_objects_produce_no_draw_commands() {
  let sheet = write_stylesheet("point:5 fill 0xFFAABBCC\n");
  let catalogue = TypeCatalogue::new();

  let mut store = VMap2::new_in_memory();
  let mut unrelated = VMap2obj::new(VMap2objClass::Point, 99);
  unrelated.coords = MultiLine::single_point(Point::new(5.0, 5.0));
  store.add(unrelated).unwrap();

  let renderer = Renderer::new(&sheet, &catalogue);
  let commands = renderer.render(&store, &Conv::Identity, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
  assert!(commands.is_empty());
}
