use clap::Parser;
use nalgebra::{Isometry3, Matrix2, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warpmatch::image::io::load_gray_image;
use warpmatch::{
    FinderConfig, Frame, ImagePyramid, PatchFailure, PatchFinder, PixelRays, PlaneObservation,
    Pixel, PointId, PointObservation, PointQuery, SourcePatch,
};

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

/// Fronto-parallel patches are tracked with a pinhole of this focal length.
const FOCAL_PX: f64 = 500.0;
const PLANE_DEPTH: f64 = 5.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "WarpMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FinderConfigJson {
    patch_size: usize,
    max_ssd_per_pixel: i64,
    max_level: usize,
    template_refresh_limit: f64,
    memoize_templates: bool,
    convergence_limit: f64,
}

impl Default for FinderConfigJson {
    fn default() -> Self {
        let cfg = FinderConfig::default();
        Self {
            patch_size: cfg.patch_size,
            max_ssd_per_pixel: cfg.max_ssd_per_pixel,
            max_level: cfg.max_level,
            template_refresh_limit: cfg.template_refresh_limit,
            memoize_templates: cfg.memoize_templates,
            convergence_limit: cfg.convergence_limit,
        }
    }
}

impl From<&FinderConfigJson> for FinderConfig {
    fn from(value: &FinderConfigJson) -> Self {
        Self {
            patch_size: value.patch_size,
            max_ssd_per_pixel: value.max_ssd_per_pixel,
            max_level: value.max_level,
            template_refresh_limit: value.template_refresh_limit,
            memoize_templates: value.memoize_templates,
            convergence_limit: value.convergence_limit,
        }
    }
}

fn default_radius() -> u32 {
    8
}

#[derive(Debug, Deserialize)]
struct PointJson {
    id: u64,
    /// Point in the source image, at `source_level`.
    source_point: [i32; 2],
    #[serde(default)]
    source_level: usize,
    /// Predicted level-0 pixel in the current image.
    predicted: [i32; 2],
    #[serde(default = "default_radius")]
    search_radius: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    source_path: String,
    current_path: String,
    output_path: Option<String>,
    levels: usize,
    max_iterations: usize,
    finder: FinderConfigJson,
    points: Vec<PointJson>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: String::new(),
            current_path: String::new(),
            output_path: None,
            levels: 4,
            max_iterations: 10,
            finder: FinderConfigJson::default(),
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PointRecord {
    id: u64,
    ok: bool,
    level: Option<usize>,
    coarse: Option<[f64; 2]>,
    position: Option<[f64; 2]>,
    score: Option<i64>,
    iterations: Option<usize>,
    failure: Option<&'static str>,
}

impl PointRecord {
    fn new(id: u64, result: Result<PointObservation, PatchFailure>) -> Self {
        match result {
            Ok(obs) => Self {
                id,
                ok: true,
                level: Some(obs.level),
                coarse: Some([obs.coarse.x, obs.coarse.y]),
                position: Some([obs.position.x, obs.position.y]),
                score: Some(obs.score),
                iterations: Some(obs.iterations),
                failure: None,
            },
            Err(failure) => Self {
                id,
                ok: false,
                level: None,
                coarse: None,
                position: None,
                score: None,
                iterations: None,
                failure: Some(failure.as_str()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    tracked: usize,
    points: Vec<PointRecord>,
}

/// Source pixel rays of a fronto-parallel plane seen by a `FOCAL_PX` pinhole.
fn fronto_parallel(level: usize) -> PlaneObservation {
    let step = f64::from(1u32 << level) / FOCAL_PX;
    PlaneObservation {
        source_from_world: Isometry3::identity(),
        normal: Vector3::new(0.0, 0.0, -1.0),
        rays: PixelRays {
            center: Vector3::new(0.0, 0.0, 1.0),
            right: Vector3::new(step, 0.0, 1.0),
            down: Vector3::new(0.0, step, 1.0),
        },
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("warpmatch=debug".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.source_path.is_empty() || config.current_path.is_empty() {
        return Err("source_path and current_path must be set in the config".into());
    }
    if config.levels == 0 {
        return Err("levels must be at least 1".into());
    }

    let source = load_gray_image(&config.source_path)?;
    let current = load_gray_image(&config.current_path)?;
    let source_pyramid = ImagePyramid::build_u8(source.view(), config.levels)?;
    let frame = Frame::with_dense_corners(ImagePyramid::build_u8(current.view(), config.levels)?)?;

    let mut finder = PatchFinder::new(FinderConfig::from(&config.finder))?;
    let pose = Isometry3::identity();
    let cam_derivs = Matrix2::new(FOCAL_PX, 0.0, 0.0, FOCAL_PX);

    let mut records = Vec::with_capacity(config.points.len());
    for point in &config.points {
        let Some(image) = source_pyramid.level(point.source_level) else {
            return Err(format!(
                "point {}: source_level {} exceeds the pyramid",
                point.id, point.source_level
            )
            .into());
        };
        let Some(patch) = SourcePatch::from_plane(
            PointId(point.id),
            image,
            point.source_level,
            Pixel::new(point.source_point[0], point.source_point[1]),
            Vector3::new(0.0, 0.0, PLANE_DEPTH),
            &fronto_parallel(point.source_level),
        ) else {
            return Err(format!("point {}: degenerate source plane", point.id).into());
        };
        let query = PointQuery {
            patch,
            cam_derivs,
            predicted: Pixel::new(point.predicted[0], point.predicted[1]),
            search_radius: point.search_radius,
        };
        let result = finder.track_point(&query, &pose, &frame, config.max_iterations);
        records.push(PointRecord::new(point.id, result));
    }

    let tracked = records.iter().filter(|r| r.ok).count();
    tracing::info!(tracked, total = records.len(), "tracking finished");
    let output = Output {
        tracked,
        points: records,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
