use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tilewarp::{
    Affine, BlendMode, ControlPoint, ImageTile, InMemoryIndex, InMemoryUndoLog, LayerId,
    PixelFormat, RasterBuffer, RecordingCanvas, Tile, TileId, Viewport, WarpSession,
    WarpSessionOpts,
};

#[derive(Parser, Debug)]
#[command(name = "tilewarp", version)]
struct Cli {
    /// Log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the warped preview of a scene as a PNG.
    Preview(PreviewArgs),
    /// Bake the scene's control points into its tiles and write them as PNGs.
    Bake(BakeArgs),
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Seconds to wait for the background warp.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct BakeArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Directory receiving one `tile-<id>.png` per baked tile.
    #[arg(long)]
    out_dir: PathBuf,

    /// Also bake every tile of these layers.
    #[arg(long = "layer")]
    layers: Vec<u32>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Scene {
    viewport: Viewport,
    #[serde(default)]
    opts: WarpSessionOpts,
    tiles: Vec<SceneTile>,
    #[serde(default)]
    points: Vec<ControlPoint>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SceneTile {
    id: u64,
    #[serde(default)]
    layer: u32,
    source: TileSource,
    /// Pixel -> world placement.
    #[serde(default = "identity_placement")]
    placement: Affine,
    #[serde(default)]
    blend: BlendMode,
    #[serde(default = "default_true")]
    selected: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
enum TileSource {
    /// Image path, relative to the scene file.
    Image(PathBuf),
    Solid {
        width: u32,
        height: u32,
        /// Straight-alpha RGBA.
        rgba: [u8; 4],
    },
}

fn identity_placement() -> Affine {
    Affine::IDENTITY
}

fn default_true() -> bool {
    true
}

struct Loaded {
    scene_viewport: Viewport,
    opts: WarpSessionOpts,
    points: Vec<ControlPoint>,
    all: Vec<Arc<dyn Tile>>,
    selection: Vec<Arc<dyn Tile>>,
    images: Vec<ImageTile>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Preview(args) => cmd_preview(args),
        Command::Bake(args) => cmd_bake(args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_scene(path: &Path) -> anyhow::Result<Scene> {
    let f = File::open(path).with_context(|| format!("open scene '{}'", path.display()))?;
    let scene: Scene =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse scene JSON")?;
    Ok(scene)
}

fn load(path: &Path) -> anyhow::Result<Loaded> {
    let scene = read_scene(path)?;
    scene.opts.validate()?;
    let root = path.parent().unwrap_or_else(|| Path::new("."));

    let mut all: Vec<Arc<dyn Tile>> = Vec::with_capacity(scene.tiles.len());
    let mut selection = Vec::new();
    let mut images = Vec::with_capacity(scene.tiles.len());
    for t in scene.tiles {
        let (id, layer) = (TileId(t.id), LayerId(t.layer));
        let tile = match &t.source {
            TileSource::Image(p) => ImageTile::open(id, layer, &root.join(p), t.placement)?,
            TileSource::Solid {
                width,
                height,
                rgba,
            } => {
                let img = image::RgbaImage::from_pixel(*width, *height, image::Rgba(*rgba));
                ImageTile::from_image(id, layer, &image::DynamicImage::ImageRgba8(img), t.placement)?
            }
        };
        let tile = tile.with_blend_mode(t.blend)?;
        let shared: Arc<dyn Tile> = Arc::new(tile.clone());
        if t.selected {
            selection.push(Arc::clone(&shared));
        }
        all.push(shared);
        images.push(tile);
    }

    Ok(Loaded {
        scene_viewport: scene.viewport,
        opts: scene.opts,
        points: scene.points,
        all,
        selection,
        images,
    })
}

fn start_session(loaded: &Loaded) -> anyhow::Result<(WarpSession, Arc<InMemoryUndoLog>)> {
    let index = Arc::new(InMemoryIndex::new());
    for t in &loaded.all {
        index.push(Arc::clone(t));
    }
    let viewport = Viewport::new(loaded.scene_viewport.rect, loaded.scene_viewport.zoom)?;
    let canvas = Arc::new(RecordingCanvas::new(viewport));
    let undo = Arc::new(InMemoryUndoLog::new());
    let session = WarpSession::start(
        loaded.selection.clone(),
        index,
        canvas,
        undo.clone(),
        loaded.opts.clone(),
    )?;
    session.set_control_points(loaded.points.clone());
    Ok((session, undo))
}

fn write_png(buf: &RasterBuffer, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    buf.to_rgba_image()?
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", out.display()))?;
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let loaded = load(&args.in_path)?;
    let (session, _undo) = start_session(&loaded)?;
    if !session.wait_idle(Duration::from_secs(args.timeout_secs)) {
        anyhow::bail!("warp preview did not settle within {}s", args.timeout_secs);
    }

    let viewport = session.viewport();
    let (w, h) = viewport.screen_size();
    let mut target = RasterBuffer::new(w, h, PixelFormat::Rgba8Premul);
    let items = session.graphics_source(&loaded.all);
    tilewarp::paint_all(&items, &mut target, &viewport)?;
    session.cancel()?;

    write_png(&target, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_bake(args: BakeArgs) -> anyhow::Result<()> {
    let loaded = load(&args.in_path)?;
    let (session, undo) = start_session(&loaded)?;
    let layers: Vec<LayerId> = args.layers.iter().copied().map(LayerId).collect();
    let report = session.apply(Some(&layers))?;

    for f in &report.failed {
        eprintln!("tile {} failed: {}", f.tile.0, f.reason);
    }
    for tile in loaded
        .images
        .iter()
        .filter(|t| report.succeeded.contains(&t.id()))
    {
        let Some(level) = tile.pyramid_level(0) else {
            continue;
        };
        let out = args.out_dir.join(format!("tile-{}.png", tile.id().0));
        write_png(&level, &out)?;
        eprintln!("wrote {}", out.display());
    }
    eprintln!(
        "baked {} tiles ({} failed, {} undo steps)",
        report.succeeded.len(),
        report.failed.len(),
        undo.steps().len()
    );
    if report.is_complete() {
        Ok(())
    } else {
        anyhow::bail!("{} tiles failed to bake", report.failed.len())
    }
}
