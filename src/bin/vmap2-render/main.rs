//! CLI front end for the rendering pipeline: opens a store, a stylesheet,
//! and a type catalogue, then dumps the resulting `DrawCommand` stream.
//! The Cairo-like backend that would actually rasterize those commands is
//! out of scope for this crate; this binary's job ends at printing them.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use vmap2::catalogue::TypeCatalogue;
use vmap2::conv::Conv;
use vmap2::geom::Rect;
use vmap2::render::Renderer;
use vmap2::store::VMap2;
use vmap2::style::Stylesheet;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// VMap2 store file to render.
  store: PathBuf,

  /// Stylesheet describing the drawing steps.
  #[arg(short, long)]
  config: PathBuf,

  /// Type catalogue; defaults to an empty one if omitted.
  #[arg(short, long)]
  types: Option<PathBuf>,

  /// Draw range, in WGS84 degrees: min-lon min-lat max-lon max-lat.
  #[arg(long, num_args = 4)]
  range: Vec<f64>,

  /// Reference ground scale (meters per pixel at zoom 1) for the minsc
  /// fallback; 0 disables it.
  #[arg(long, default_value_t = 0.0)]
  ptsize0: f64,

  /// Global object-size multiplier.
  #[arg(long, default_value_t = 1.0)]
  obj_scale: f64,
}

fn main() {
  tracing_subscriber::fmt::init();
  let args = Args::parse();

  if let Err(e) = run(&args) {
    error!("{e}");
    std::process::exit(1);
  }
}

fn run(args: &Args) -> Result<(), vmap2::Error> {
  let store = VMap2::open_file(&args.store, false)?;
  let mut stylesheet = Stylesheet::load(&args.config)?;
  stylesheet.config.obj_scale = args.obj_scale;
  let catalogue = match &args.types {
    Some(path) => TypeCatalogue::load(path)?,
    None => TypeCatalogue::new(),
  };

  let draw_range = Rect::new(args.range[0], args.range[1], args.range[2], args.range[3]);
  let renderer = Renderer::new(&stylesheet, &catalogue).with_ptsize0(args.ptsize0);
  let commands = renderer.render(&store, &Conv::Identity, draw_range)?;

  info!("emitted {} draw commands", commands.len());
  for cmd in &commands {
    println!("{cmd:?}");
  }
  Ok(())
}
