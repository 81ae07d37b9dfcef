//! durometer CLI: hardness arithmetic, tables and heat maps from saved projects.

use clap::{Args, Parser, Subcommand};
use durometer::core::{init_with_level, level_from_verbosity, CalibrationState, Point2};
use durometer::image_io::{adjust, load_rgba, save_png};
use durometer::map::{ColorScale, InterpolationMethod};
use durometer::project::{AppConfig, PreferencesStore, CONFIG_FILE};
use durometer::vickers::{vickers_hardness, VickersRepetition};
use durometer::Workbench;
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "durometer")]
#[command(about = "Vickers hardness calculation and hardness heat maps for mapped specimens")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Application config (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Emit JSON logs through `tracing` instead of the plain logger.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vickers hardness from a load and either two diagonals or four vertices.
    Hv(HvArgs),

    /// Scale (units per pixel) from two pixel positions and their real distance.
    Calibrate {
        /// First point, `x,y` in pixels.
        #[arg(long, value_parser = parse_point)]
        from: Point2<f64>,
        /// Second point, `x,y` in pixels.
        #[arg(long, value_parser = parse_point)]
        to: Point2<f64>,
        /// Real distance between the two points.
        #[arg(long)]
        distance: f64,
    },

    /// Print the hardness table of a project.
    Table {
        /// Project file (JSON).
        project: PathBuf,
        /// Rebuild rows from the marked points first.
        #[arg(long)]
        sync: bool,
        /// Look for `{n} 400x.<ext>` micrographs in the images folder.
        #[arg(long)]
        default_images: bool,
        /// Write the updated project back.
        #[arg(long)]
        save: bool,
    },

    /// Interpolate the hardness table of a project into a PNG heat map.
    Heatmap(HeatmapArgs),

    /// Draw the marked points over the project's surface image.
    Overlay {
        /// Project file (JSON).
        project: PathBuf,
        /// Output PNG (default `<project dir>/maps/mapping_with_points.png`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Grayscale and/or invert an image.
    Adjust {
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        grayscale: bool,
        #[arg(long)]
        invert: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Debug, Clone, Args)]
struct HvArgs {
    /// Test load in grams-force.
    #[arg(long, default_value_t = durometer::vickers::DEFAULT_LOAD_GRAMS)]
    load: f64,

    /// Diagonals in micrometres.
    #[arg(long, num_args = 2, value_names = ["D1", "D2"], conflicts_with = "vertex")]
    diagonals: Option<Vec<f64>>,

    /// Indentation corner, `x,y` in micrometres; give it four times in click order.
    #[arg(long, value_parser = parse_point)]
    vertex: Vec<Point2<f64>>,
}

#[derive(Debug, Clone, Args)]
struct HeatmapArgs {
    /// Project file (JSON).
    project: PathBuf,

    /// Output PNG (default `<project dir>/maps/heatmap.png`).
    #[arg(long)]
    out: Option<PathBuf>,

    /// linear, cubic or nearest.
    #[arg(long)]
    method: Option<InterpolationMethod>,

    #[arg(long)]
    colorscale: Option<ColorScale>,

    /// Lattice nodes per axis.
    #[arg(long)]
    resolution: Option<usize>,

    /// Number of colour bands.
    #[arg(long)]
    levels: Option<usize>,

    /// Draw band boundaries.
    #[arg(long)]
    lines: bool,

    /// Output pixels per lattice node.
    #[arg(long)]
    figure_scale: Option<f64>,

    /// Print the field statistics as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_point(s: &str) -> Result<Point2<f64>, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in `{s}`: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in `{s}`: {e}"))?;
    Ok(Point2::new(x, y))
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    if cli.json_logs {
        durometer::core::init_tracing(true);
        return Ok(());
    }
    init_with_level(level_from_verbosity(cli.verbose))?;
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    init_with_level(level_from_verbosity(cli.verbose))?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Hv(args) => run_hv(&args),
        Commands::Calibrate { from, to, distance } => run_calibrate(from, to, distance),
        Commands::Table {
            project,
            sync,
            default_images,
            save,
        } => run_table(config, &project, sync, default_images, save),
        Commands::Heatmap(args) => run_heatmap(config, &args),
        Commands::Overlay { project, out } => run_overlay(config, &project, out),
        Commands::Adjust {
            image,
            out,
            grayscale,
            invert,
        } => run_adjust(&image, &out, grayscale, invert),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_workbench(config: AppConfig, project: &Path) -> CliResult<Workbench> {
    let dir = project.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut wb = Workbench::new(config, PreferencesStore::in_memory(), dir)?;
    wb.open_project(project)?;
    Ok(wb)
}

// ── hv ────────────────────────────────────────────────────────────────

fn run_hv(args: &HvArgs) -> CliResult<()> {
    if let Some(d) = &args.diagonals {
        let d_avg = (d[0] + d[1]) / 2.0;
        let hv = vickers_hardness(args.load, d_avg);
        println!("d1 = {:.2} um, d2 = {:.2} um, d = {d_avg:.2} um", d[0], d[1]);
        println!("HV = {hv:.1}");
        return Ok(());
    }
    let vertices: [Point2<f64>; 4] = args
        .vertex
        .as_slice()
        .try_into()
        .map_err(|_| format!("need --diagonals or exactly 4 --vertex (got {})", args.vertex.len()))?;
    let rep = VickersRepetition::from_vertices(vertices, args.load);
    println!(
        "d1 = {:.2} um, d2 = {:.2} um, d = {:.2} um",
        rep.d1(),
        rep.d2(),
        rep.d_avg()
    );
    println!("HV = {:.1}", rep.hv());
    Ok(())
}

// ── calibrate ─────────────────────────────────────────────────────────

fn run_calibrate(from: Point2<f64>, to: Point2<f64>, distance: f64) -> CliResult<()> {
    let mut state = CalibrationState::default();
    let scale = state.calibrate_from_two_points(from, to, distance)?;
    println!("{scale:.6} units/px");
    Ok(())
}

// ── table ─────────────────────────────────────────────────────────────

fn run_table(
    config: AppConfig,
    project: &Path,
    sync: bool,
    default_images: bool,
    save: bool,
) -> CliResult<()> {
    let mut wb = open_workbench(config, project)?;
    if sync {
        wb.sync_table();
    }
    if default_images {
        let found = wb.load_default_images();
        eprintln!("default images found for {found}/{} points", wb.dataset().len());
    }

    println!("id\tx\ty\thv\tstd_dev\timage");
    let fmt = |v: Option<f64>| v.map(|v| format!("{v:.1}")).unwrap_or_default();
    for row in wb.dataset().rows() {
        println!(
            "{}\t{:.4}\t{:.4}\t{}\t{}\t{}",
            row.id,
            row.x,
            row.y,
            fmt(row.hv),
            fmt(row.std_dev),
            row.image_path.display()
        );
    }

    if save {
        let path = wb.save_project(project)?;
        eprintln!("saved {}", path.display());
    }
    Ok(())
}

// ── heatmap ───────────────────────────────────────────────────────────

fn run_heatmap(config: AppConfig, args: &HeatmapArgs) -> CliResult<()> {
    let mut wb = open_workbench(config, &args.project)?;
    let plot = wb.plot_mut();
    if let Some(method) = args.method {
        plot.interpolation = method;
    }
    if let Some(scale) = args.colorscale {
        plot.colorscale = scale;
    }
    if let Some(n) = args.resolution {
        plot.grid_resolution = n;
    }
    if let Some(n) = args.levels {
        plot.contour_levels = n;
    }
    if let Some(s) = args.figure_scale {
        plot.figure_scale = s;
    }
    plot.show_lines |= args.lines;

    let output = wb.build_heatmap()?;
    let image = match output.image {
        Some(img) => img,
        None => durometer::map::render_field(&output.field, &wb.plot().render_options())?,
    };
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| wb.maps_dir().join(durometer::HEATMAP_FILE));
    save_png(&image, &out)?;

    let stats = &output.field.stats;
    if args.json {
        println!("{}", serde_json::to_string_pretty(stats)?);
    } else {
        println!(
            "{} points, HV {:.1}..{:.1} (mean {:.1}) -> {}",
            stats.count,
            stats.min,
            stats.max,
            stats.mean,
            out.display()
        );
    }
    Ok(())
}

// ── overlay ───────────────────────────────────────────────────────────

fn run_overlay(config: AppConfig, project: &Path, out: Option<PathBuf>) -> CliResult<()> {
    let mut wb = open_workbench(config, project)?;
    let source = wb
        .surface_image()
        .map(Path::to_path_buf)
        .ok_or("project has no surface image")?;
    let info = durometer::image_io::load_image_info(&source)?;
    wb.attach_surface(&info);
    let surface = load_rgba(&source)?;
    let overlay = wb.mapping_overlay(&surface)?;
    let out = out.unwrap_or_else(|| wb.maps_dir().join(durometer::MAPPING_FILE));
    save_png(&overlay, &out)?;
    println!("{} points -> {}", wb.registry().len(), out.display());
    Ok(())
}

// ── adjust ────────────────────────────────────────────────────────────

fn run_adjust(image: &Path, out: &Path, grayscale: bool, invert: bool) -> CliResult<()> {
    let img = adjust(&load_rgba(image)?, grayscale, invert)?;
    save_png(&img, out)?;
    println!("{}", out.display());
    Ok(())
}
