use argh::FromArgs;
use log::{info, warn};
use ndarray::Array2;
use std::path::{Path, PathBuf};

use svd_pgm::pgm::RasterEncoding;
use svd_pgm::{read_pgm, to_matrix, GrayImage, PipelineConfig, SvdFactors, SvdImagePipeline};

fn parse_ranks(value: &str) -> Result<Vec<usize>, String> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid rank {:?}", s))
        })
        .collect()
}

#[derive(FromArgs)]
/// Render SVD factors, rank-k approximations and the pseudoinverse of a PGM image
struct Args {
    /// path to the input PGM image
    #[argh(positional)]
    input: PathBuf,

    /// comma-separated ranks to approximate (default 1,2,3,4,5)
    #[argh(option, short = 'k', from_str_fn(parse_ranks))]
    ranks: Option<Vec<usize>>,

    /// directory for the generated images
    #[argh(option, short = 'o')]
    output_dir: Option<PathBuf>,

    /// JSON pipeline configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// write binary (P5) instead of plain (P2) rasters
    #[argh(switch)]
    binary: bool,

    /// also dump every rendered matrix as whitespace-separated text
    #[argh(switch)]
    dump_text: bool,

    /// skip rendering the image times its pseudoinverse
    #[argh(switch)]
    no_identity_check: bool,

    /// cache file for the decomposition; reused if present and it reproduces the input
    /// image, written otherwise
    #[argh(option)]
    factors: Option<PathBuf>,
}

/// Reuses a cached decomposition only if it belongs to `image`.
fn load_cached(path: &Path, image: &GrayImage) -> Option<(Array2<f64>, SvdFactors)> {
    if !path.exists() {
        return None;
    }
    let matrix = to_matrix(image);
    match SvdFactors::load(path).and_then(|factors| factors.check_describes(&matrix).map(|()| factors)) {
        Ok(factors) => {
            info!("Loaded cached decomposition from {:?}", path);
            Some((matrix, factors))
        }
        Err(e) => {
            warn!("Ignoring cached decomposition {:?}: {}", path, e);
            None
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.binary {
        config.encoding = RasterEncoding::Binary;
    }
    if args.dump_text {
        config.write_text_dumps = true;
    }
    if args.no_identity_check {
        config.render_identity_check = false;
    }
    let ranks = args.ranks.unwrap_or_else(|| (1..=5).collect());

    let image = read_pgm(&args.input)?;
    let pipeline = SvdImagePipeline::new(config)?;

    let (matrix, factors) = match &args.factors {
        Some(path) => match load_cached(path, &image) {
            Some(cached) => cached,
            None => {
                let (matrix, factors) = pipeline.factorize(&image)?;
                factors.save(path)?;
                info!("Cached decomposition to {:?}", path);
                (matrix, factors)
            }
        },
        None => pipeline.factorize(&image)?,
    };

    let summary = pipeline.run_with_factors(&matrix, &factors, &ranks)?;
    for approximation in &summary.approximations.rendered {
        println!(
            "A{}: {:?} (Frobenius error {:.6})",
            approximation.k, approximation.path, approximation.frobenius_error
        );
    }
    for (k, e) in &summary.approximations.failures {
        warn!("Rank {} failed: {}", k, e);
    }
    println!("Pseudoinverse: {:?}", summary.pseudoinverse.path);

    if !summary.approximations.is_complete() {
        return Err(format!(
            "{} of {} approximations failed",
            summary.approximations.failures.len(),
            ranks.len()
        )
        .into());
    }
    Ok(())
}
