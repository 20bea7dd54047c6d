//! Astrotile: deterministic tiling for georeferenced satellite imagery.
//!
//! Astrotile cuts scenes into fixed-size square tiles, keeps labels aligned
//! with the pixels they describe, reduces per-pixel labels to image-level
//! classes, and reassembles tiles into mosaics. Every tile carries its own
//! affine transform, so the georeferencing of a mosaic is recovered from
//! its tiles alone.
//!
//! # Modules
//!
//! - [`raster`]: Images, labels and georeferencing types
//! - [`tiling`]: Tile border generation and splitting
//! - [`mosaic`]: Reassembly of tiles into one image
//! - [`filter`]: Cloud, corruption and area-of-interest filters
//! - [`validation`]: Scene and tile-set validation and error reporting
//! - [`error`]: Error types for astrotile operations

pub mod error;
pub mod filter;
pub mod mosaic;
pub mod raster;
pub mod tiling;
pub mod validation;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flexi_logger::Logger;

pub use error::AstrotileError;

use raster::io_json::{self, SceneDocument};
use raster::{AggregationPolicy, BoundingBox, Coord, Crs, LabeledImage, SatelliteImage, World};

/// The astrotile CLI application.
#[derive(Parser)]
#[command(name = "astrotile")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level or module filter (e.g. 'info' or 'astrotile::mosaic=debug').
    #[arg(long, global = true, env = "ASTROTILE_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the tile grid of a scene as a CSV manifest.
    Tiles(TilesArgs),
    /// Split a scene (and its segmentation label) into tiles.
    Split(SplitArgs),
    /// Assemble tiles back into a single scene.
    Mosaic(MosaicArgs),
    /// Reduce a scene label to a binary class.
    Classify(ClassifyArgs),
    /// List the scenes that pass the corruption, cloud and area filters.
    Filter(FilterArgs),
    /// Validate a scene, or a set of tiles, for errors and warnings.
    Validate(ValidateArgs),
}

/// Arguments for the tiles subcommand.
#[derive(clap::Args)]
struct TilesArgs {
    /// Scene JSON file.
    input: PathBuf,

    /// Side of each square tile, in pixels.
    #[arg(short = 't', long)]
    tile_length: usize,

    /// Write the manifest here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Arguments for the split subcommand.
#[derive(clap::Args)]
struct SplitArgs {
    /// Scene JSON file.
    input: PathBuf,

    /// Side of each square tile, in pixels.
    #[arg(short = 't', long)]
    tile_length: usize,

    /// Directory that receives one scene JSON per tile and a manifest.
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Keep only these bands, in this order (e.g. '2,1,0').
    #[arg(long, value_delimiter = ',')]
    bands: Option<Vec<usize>>,

    /// Normalize every band to [0, 1], clipping at this quantile.
    #[arg(long, num_args = 0..=1, default_missing_value = "0.97")]
    normalize: Option<f64>,
}

/// Arguments for the mosaic subcommand.
#[derive(clap::Args)]
struct MosaicArgs {
    /// Tile scene JSON files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output scene JSON file.
    #[arg(short, long)]
    output: PathBuf,

    /// Which tile wins where tiles overlap ('first' or 'last').
    #[arg(long, default_value = "first")]
    merge: String,
}

/// Arguments for the classify subcommand.
#[derive(clap::Args)]
struct ClassifyArgs {
    /// Labeled scene JSON file.
    input: PathBuf,

    /// How a segmentation mask is reduced ('any', 'majority' or 'weighted').
    #[arg(long, default_value = "any")]
    policy: String,

    /// Also write the classified scene here.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Arguments for the filter subcommand.
#[derive(clap::Args)]
struct FilterArgs {
    /// Scene JSON files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Grayscale intensity below which a pixel counts as black.
    #[arg(long, default_value_t = 25.0)]
    black_value: f64,

    /// Fraction of black pixels at which a scene counts as corrupted.
    #[arg(long, default_value_t = 0.5)]
    black_area: f64,

    /// Cloud masks (scene JSON, band 0), one per input.
    #[arg(long, num_args = 1..)]
    cloud_masks: Option<Vec<PathBuf>>,

    /// Scenes with this cloud coverage or more are dropped.
    #[arg(long, default_value_t = filter::DEFAULT_CLOUD_THRESHOLD)]
    cloud_threshold: f64,

    /// Keep scenes intersecting 'left,bottom,right,top'.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, requires = "crs")]
    within: Option<Vec<f64>>,

    /// Keep scenes containing the point 'x,y'.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true, requires = "crs")]
    contains: Option<Coord<World>>,

    /// CRS of the --within box and the --contains point.
    #[arg(long)]
    crs: Option<String>,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Scene JSON file(s) to validate.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Validate the inputs as one tile set instead of a single scene.
    #[arg(long)]
    tiles: bool,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Output formats of the validate subcommand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = AstrotileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(AstrotileError::InvalidArgument(format!(
                "unknown report format '{}' (supported: text, json)",
                other
            ))),
        }
    }
}

/// Run the astrotile CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), AstrotileError> {
    let cli = Cli::parse();
    let _logger = Logger::try_with_str(&cli.log_level)?.start()?;

    match cli.command {
        Some(Commands::Tiles(args)) => run_tiles(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Mosaic(args)) => run_mosaic(args),
        Some(Commands::Classify(args)) => run_classify(args),
        Some(Commands::Filter(args)) => run_filter(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => {
            // No subcommand: print a short banner and exit successfully
            println!("astrotile {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Deterministic tiling for georeferenced satellite imagery.");
            println!();
            println!("Run 'astrotile --help' for usage information.");
            Ok(())
        }
    }
}

fn read_scene(path: &Path) -> Result<SceneDocument, AstrotileError> {
    let scene = io_json::read_scene_json(path)?;
    let (bands, height, width) = scene.array.dim();
    log::info!(
        "read {} ({} band(s), {}x{} pixels)",
        path.display(),
        bands,
        height,
        width
    );
    Ok(scene)
}

/// Execute the tiles subcommand.
fn run_tiles(args: TilesArgs) -> Result<(), AstrotileError> {
    let image = read_scene(&args.input)?.into_image()?;
    let borders = tiling::generate_tile_borders(image.height(), image.width(), args.tile_length)?;
    let records = tiling::manifest::tile_records(image.transform(), &borders);

    match &args.output {
        Some(path) => {
            tiling::manifest::write_tile_manifest_csv(path, &records)?;
            log::info!("wrote {} tile record(s) to {}", records.len(), path.display());
        }
        None => print!("{}", tiling::manifest::to_tile_manifest_csv_string(&records)?),
    }
    Ok(())
}

/// Applies the optional band selection and normalization of `split`.
fn prepare_image(
    image: &SatelliteImage<f64>,
    args: &SplitArgs,
) -> Result<SatelliteImage<f64>, AstrotileError> {
    let selected = match &args.bands {
        Some(bands) => image.select_bands(bands)?,
        None => image.clone(),
    };
    match args.normalize {
        Some(quantile) => selected.normalize(quantile),
        None => Ok(selected),
    }
}

/// Execute the split subcommand.
fn run_split(args: SplitArgs) -> Result<(), AstrotileError> {
    let scene = read_scene(&args.input)?;

    let (parent, documents) = if scene.label.is_some() {
        let labeled = scene.into_labeled()?;
        let image = prepare_image(labeled.image(), &args)?;
        let parent = (*image.transform(), image.height(), image.width());
        let tiles = labeled.with_image(image)?.split(args.tile_length)?;
        (parent, tiles.iter().map(SceneDocument::from_labeled).collect::<Vec<_>>())
    } else {
        let image = prepare_image(&scene.into_image()?, &args)?;
        let parent = (*image.transform(), image.height(), image.width());
        let tiles = image.split(args.tile_length)?;
        (parent, tiles.iter().map(SceneDocument::from_image).collect())
    };

    fs::create_dir_all(&args.output_dir)?;
    for (index, document) in documents.iter().enumerate() {
        let path = args.output_dir.join(format!("tile_{:04}.json", index));
        io_json::write_scene_json(&path, document)?;
    }

    // Same borders, same order as the tiles written above.
    let (transform, height, width) = parent;
    let borders = tiling::generate_tile_borders(height, width, args.tile_length)?;
    let records = tiling::manifest::tile_records(&transform, &borders);
    tiling::manifest::write_tile_manifest_csv(&args.output_dir.join("manifest.csv"), &records)?;

    println!(
        "Split {} into {} tile(s) in {}",
        args.input.display(),
        documents.len(),
        args.output_dir.display()
    );
    Ok(())
}

/// Execute the mosaic subcommand.
fn run_mosaic(args: MosaicArgs) -> Result<(), AstrotileError> {
    let method: mosaic::MergeMethod = args.merge.parse()?;
    let scenes = args
        .inputs
        .iter()
        .map(|path| read_scene(path))
        .collect::<Result<Vec<_>, _>>()?;

    let all_segmentation = scenes.iter().all(|s| {
        matches!(
            s.label,
            Some(raster::io_json::LabelRecord::Segmentation { .. })
        )
    });

    let document = if all_segmentation {
        let tiles = scenes
            .into_iter()
            .map(|scene| match scene.into_labeled()? {
                LabeledImage::Segmentation(l) => Ok(l),
                other => Err(AstrotileError::InvalidLabel(format!(
                    "expected a segmentation label, found {}",
                    other.kind()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mosaic = mosaic::assemble_labeled_with(&tiles, method)?;
        SceneDocument::from_labeled(&LabeledImage::Segmentation(mosaic))
    } else {
        if scenes.iter().any(|s| s.label.is_some()) {
            log::warn!("only segmentation labels can be assembled; labels are dropped");
        }
        let tiles = scenes
            .into_iter()
            .map(SceneDocument::into_image)
            .collect::<Result<Vec<_>, _>>()?;
        SceneDocument::from_image(&mosaic::assemble_with(&tiles, method)?)
    };

    io_json::write_scene_json(&args.output, &document)?;
    let (_, height, width) = document.array.dim();
    println!(
        "Assembled {} tile(s) into a {}x{} mosaic: {}",
        args.inputs.len(),
        height,
        width,
        args.output.display()
    );
    Ok(())
}

/// Execute the classify subcommand.
fn run_classify(args: ClassifyArgs) -> Result<(), AstrotileError> {
    let policy: AggregationPolicy = args.policy.parse()?;
    let labeled = read_scene(&args.input)?.into_labeled()?;
    let classified = labeled.to_classification(policy)?;

    println!("{}", classified.label());

    if let Some(path) = &args.output {
        let document = SceneDocument::from_labeled(&LabeledImage::Classification(classified));
        io_json::write_scene_json(path, &document)?;
    }
    Ok(())
}

fn parse_point(value: &str) -> Result<Coord<World>, String> {
    value.parse().map_err(|err: AstrotileError| err.to_string())
}

/// Reads band 0 of a scene as a cloud mask.
fn read_cloud_mask(path: &Path) -> Result<ndarray::Array2<f64>, AstrotileError> {
    let scene = read_scene(path)?;
    if scene.array.dim().0 == 0 {
        return Err(AstrotileError::InvalidArgument(format!(
            "cloud mask {} has no bands",
            path.display()
        )));
    }
    Ok(scene.array.index_axis_move(ndarray::Axis(0), 0))
}

/// Execute the filter subcommand.
fn run_filter(args: FilterArgs) -> Result<(), AstrotileError> {
    let opts = filter::CorruptionOptions {
        black_value_threshold: args.black_value,
        black_area_threshold: args.black_area,
    };

    let cloud_masks = match &args.cloud_masks {
        Some(paths) if paths.len() != args.inputs.len() => {
            return Err(AstrotileError::InvalidArgument(format!(
                "got {} scene(s) but {} cloud mask(s)",
                args.inputs.len(),
                paths.len()
            )));
        }
        Some(paths) => Some(
            paths
                .iter()
                .map(|p| read_cloud_mask(p))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };

    let crs = args.crs.as_deref().map(Crs::new);
    let area = match args.within.as_deref() {
        Some(&[left, bottom, right, top]) => Some(BoundingBox::new(left, bottom, right, top)),
        Some(values) => {
            return Err(AstrotileError::InvalidArgument(format!(
                "--within expects left,bottom,right,top, got {} value(s)",
                values.len()
            )));
        }
        None => None,
    };

    for (index, path) in args.inputs.iter().enumerate() {
        let image = read_scene(path)?.into_image()?;

        if filter::is_corrupted(&image, &opts)? {
            log::info!("{}: corrupted", path.display());
            continue;
        }
        if let Some(masks) = &cloud_masks {
            let coverage = filter::cloud_coverage(&masks[index]);
            if coverage >= args.cloud_threshold {
                log::info!("{}: cloud coverage {:.3}", path.display(), coverage);
                continue;
            }
        }
        if let (Some(bbox), Some(crs)) = (&area, &crs) {
            if !image.intersects_box(bbox, crs)? {
                log::info!("{}: outside the area of interest", path.display());
                continue;
            }
        }
        if let (Some(point), Some(crs)) = (args.contains, &crs) {
            if !image.contains(point, crs)? {
                log::info!("{}: does not contain {:?}", path.display(), point);
                continue;
            }
        }

        println!("{}", path.display());
    }
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), AstrotileError> {
    let format: ReportFormat = args.output.parse()?;
    let report = if args.tiles {
        let tiles = args
            .inputs
            .iter()
            .map(|path| read_scene(path)?.into_image())
            .collect::<Result<Vec<_>, _>>()?;
        validation::validate_tile_set(&tiles)
    } else {
        match args.inputs.as_slice() {
            [path] => validation::validate_scene(&read_scene(path)?),
            _ => {
                return Err(AstrotileError::InvalidArgument(
                    "pass --tiles to validate several scenes as one tile set".to_string(),
                ));
            }
        }
    };

    // Output results
    match format {
        ReportFormat::Json => {
            let value = serde_json::json!({
                "error_count": report.error_count(),
                "warning_count": report.warning_count(),
                "issues": report.issues,
            });
            println!("{:#}", value);
        }
        ReportFormat::Text => print!("{}", report),
    }

    // Determine exit status
    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    if opts.fails(&report) {
        Err(AstrotileError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}
