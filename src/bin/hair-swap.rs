//! Command-line front end: puts the hair of a model portrait on a target.
//!
//! Landmarks are read from CSV files holding one `x, y` pair per line, as
//! written by an external 77-point detector.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hair_swap::{
    EXAMPLE_CONFIG, FaceModel, FsImageSource, HairSwapper, Landmarks, StaticLandmarks,
    SwapConfig, SwapOutcome,
};
use image::{RgbImage, imageops};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "hair-swap")]
#[command(author, version, about = "Transplant hair between two portraits", long_about = None)]
struct Args {
    /// Portrait whose hair is taken
    #[arg(long, required_unless_present = "print_config")]
    model: Option<PathBuf>,

    /// Portrait that receives the hair
    #[arg(long, required_unless_present = "print_config")]
    target: Option<PathBuf>,

    /// Landmark CSV of the model (default: model path with `.csv` extension)
    #[arg(long)]
    model_landmarks: Option<PathBuf>,

    /// Landmark CSV of the target (default: target path with `.csv` extension)
    #[arg(long)]
    target_landmarks: Option<PathBuf>,

    /// Output image
    #[arg(short, long, default_value = "result.png")]
    output: PathBuf,

    /// Write model | target | result side by side instead of the result alone
    #[arg(long)]
    comparison: bool,

    /// Directory for intermediate images
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(level));

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => SwapConfig::default(),
    };

    let (Some(model_path), Some(target_path)) = (&args.model, &args.target) else {
        anyhow::bail!("--model and --target are required");
    };

    let swapper = HairSwapper::new(StaticLandmarks::none(), FsImageSource, config)?;
    let model = swapper
        .load(model_path)
        .with_context(|| format!("Failed to load {}", model_path.display()))?;
    let target = swapper
        .load(target_path)
        .with_context(|| format!("Failed to load {}", target_path.display()))?;

    let model_face = load_face(&model, model_path, args.model_landmarks.as_deref())?;
    let target_face = load_face(&target, target_path, args.target_landmarks.as_deref())?;

    let outcome = swapper.swap_faces(&model, &model_face, &target, &target_face)?;
    info!(
        "Placed hair at {:?} (holes={}, overlap={}) after {} candidates",
        outcome.placement,
        outcome.score.holes,
        outcome.score.overlap,
        outcome.candidates_evaluated
    );

    if let Some(dir) = &args.debug_dir {
        write_debug_images(dir, &outcome)?;
    }

    let output = if args.comparison {
        side_by_side(&[&model, &target, &outcome.composite])
    } else {
        outcome.composite
    };
    output
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote {}", args.output.display());

    Ok(())
}

fn load_config(path: &Path) -> Result<SwapConfig> {
    info!("Loading configuration from: {}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: SwapConfig =
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn load_face(image: &RgbImage, image_path: &Path, csv: Option<&Path>) -> Result<FaceModel> {
    let csv = csv.map_or_else(|| image_path.with_extension("csv"), Path::to_path_buf);
    let text =
        fs::read_to_string(&csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    let landmarks = Landmarks::from_csv_str(&text)
        .with_context(|| format!("Invalid landmarks in {}", csv.display()))?;
    FaceModel::from_landmarks(image.dimensions(), landmarks)
        .with_context(|| format!("Unusable face in {}", image_path.display()))
}

fn side_by_side(images: &[&RgbImage]) -> RgbImage {
    let width = images.iter().map(|image| image.width()).sum();
    let height = images.iter().map(|image| image.height()).max().unwrap_or(0);
    let mut canvas = RgbImage::new(width, height);
    let mut x = 0_i64;
    for image in images {
        imageops::replace(&mut canvas, *image, x, 0);
        x += i64::from(image.width());
    }
    canvas
}

fn write_debug_images(dir: &Path, outcome: &SwapOutcome) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let hair = &outcome.model_segmentation.hair;

    outcome
        .model_segmentation
        .labels_visualization()
        .save(dir.join("labels.png"))?;
    hair.hair_mask_no_matting.save(dir.join("hair_blob.png"))?;
    hair.hair_mask.save(dir.join("hair_alpha.png"))?;
    hair.hair_pixels.save(dir.join("hair_pixels.png"))?;
    outcome
        .synthesized_face
        .image
        .save(dir.join("synthesized_face.png"))?;
    outcome
        .synthesized_face
        .forehead_mask
        .save(dir.join("forehead_mask.png"))?;

    info!("Wrote intermediate images to {}", dir.display());
    Ok(())
}
