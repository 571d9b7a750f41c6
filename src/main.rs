//! plate-reader - Vietnamese license plate recognition
//!
//! Command-line front end: plate text checks, variant dumps, offline
//! vote resolution and transcript-driven recognition runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use plate_reader::config::{self, RecognizerConfig};
use plate_reader::plate::{fix_common_ocr_errors, PlateGrammar};
use plate_reader::recognition::{Observation, Recognizer, ScoringContext};
use plate_reader::storage;
use plate_reader::vision::{strategy_from_config, ImageSource, PlateRegion, ReplayOcr};

/// plate-reader - Vietnamese license plate recognition
#[derive(Parser, Debug)]
#[command(name = "plate-reader")]
#[command(about = "Multi-variant OCR voting for Vietnamese license plates")]
struct Args {
    /// Settings file (defaults to the per-user config file)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline stages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and format plate strings
    Check {
        /// Raw plate texts
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Render the OCR variants of a plate crop
    Variants {
        /// Plate crop image
        image: PathBuf,

        /// Directory to write PNG renderings into
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Resolve a JSON list of observations into one plate
    Resolve {
        /// JSON file with `[{"text", "confidence", "source"}]` entries
        observations: PathBuf,

        /// Detector confidence used by localized scoring
        #[arg(long, default_value = "1.0")]
        detector_confidence: f32,

        /// Variant count used by localized scoring (0 = observation count)
        #[arg(long, default_value = "0")]
        variant_count: usize,
    },

    /// Recognize a plate crop with recorded OCR readings
    Recognize {
        /// Plate crop image
        image: PathBuf,

        /// JSON transcript of OCR detections by variant label
        #[arg(short, long)]
        transcript: PathBuf,
    },

    /// Single OCR pass over a plate crop, no voting
    Read {
        /// Plate crop image
        image: PathBuf,

        /// JSON transcript of OCR detections
        #[arg(short, long)]
        transcript: PathBuf,
    },

    /// Write the default settings file
    InitConfig,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    input: &'a str,
    corrected: String,
    cleaned: String,
    formatted: String,
    valid: bool,
}

#[derive(Serialize)]
struct RecognizeReport<T: Serialize> {
    label: String,
    recognition: T,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::InitConfig = args.command {
        let path = storage::init_default_config()?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = load_or_create_config(args.config.as_deref())?;

    match args.command {
        Command::Check { texts } => run_check(&config, &texts),
        Command::Variants { image, out } => run_variants(&config, &image, out.as_deref()),
        Command::Resolve {
            observations,
            detector_confidence,
            variant_count,
        } => run_resolve(
            config,
            &observations,
            ScoringContext {
                detector_confidence,
                variant_count,
            },
        ),
        Command::Recognize { image, transcript } => run_recognize(config, &image, &transcript),
        Command::Read { image, transcript } => run_read(config, &image, &transcript),
        Command::InitConfig => Ok(()),
    }
}

/// Load configuration from an explicit path, the user config file, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<RecognizerConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_path) = storage::default_config_path() {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring unreadable config {:?}: {:#}", config_path, e),
            }
        }
    }
    info!("Using default configuration");
    Ok(RecognizerConfig::default())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_check(config: &RecognizerConfig, texts: &[String]) -> Result<()> {
    let grammar = PlateGrammar::new(config.validation.clone());
    let reports: Vec<CheckReport<'_>> = texts
        .iter()
        .map(|input| {
            let corrected = fix_common_ocr_errors(input.trim());
            let cleaned = PlateGrammar::clean(&corrected);
            let formatted = PlateGrammar::format(&cleaned);
            let valid = grammar.validate(&formatted);
            CheckReport {
                input,
                corrected,
                cleaned,
                formatted,
                valid,
            }
        })
        .collect();
    print_json(&reports)
}

fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageSource::from(path.to_path_buf())
        .load()
        .with_context(|| format!("Failed to load image: {:?}", path))
}

fn run_variants(config: &RecognizerConfig, image: &Path, out: Option<&Path>) -> Result<()> {
    let region = PlateRegion::full_frame(load_image(image)?);
    let strategy = strategy_from_config(&config.preprocessing);
    let variants = strategy.generate(&region);
    info!("{} produced {} variants", strategy.name(), variants.len());

    if let Some(dir) = out {
        std::fs::create_dir_all(dir)?;
    }
    for (index, variant) in variants.iter().enumerate() {
        println!(
            "{:02} {} {}x{}",
            index,
            variant.label,
            variant.image.width(),
            variant.image.height()
        );
        if let Some(dir) = out {
            let path = dir.join(format!("{:02}_{}.png", index, variant.label));
            variant
                .image
                .save(&path)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
    }
    Ok(())
}

fn run_resolve(config: RecognizerConfig, path: &Path, context: ScoringContext) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read observations: {:?}", path))?;
    let observations: Vec<Observation> =
        serde_json::from_str(&content).context("Failed to parse observations")?;

    let resolver = plate_reader::Resolver::new(config.scoring, config.ocr, config.validation);
    print_json(&resolver.resolve_with(&observations, &context))
}

fn run_recognize(config: RecognizerConfig, image: &Path, transcript: &Path) -> Result<()> {
    let engine = ReplayOcr::from_file(transcript)?;
    let recognizer = Recognizer::new(config, Box::new(engine));

    // Input is already a plate crop, so the detector geometry filter is bypassed
    let region = PlateRegion::full_frame(load_image(image)?);
    let recognition = recognizer.recognize_region(&region)?;
    print_json(&RecognizeReport {
        label: recognition.label().to_string(),
        recognition,
    })
}

fn run_read(config: RecognizerConfig, image: &Path, transcript: &Path) -> Result<()> {
    let engine = ReplayOcr::from_file(transcript)?;
    let recognizer = Recognizer::new(config, Box::new(engine));
    match recognizer.read_plate(&ImageSource::from(image.to_path_buf()))? {
        Some(extraction) => print_json(&extraction),
        None => {
            println!("{}", plate_reader::recognition::NOT_DETECTED);
            Ok(())
        }
    }
}
