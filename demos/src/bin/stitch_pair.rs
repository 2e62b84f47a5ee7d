//! Stitch two overlapping photographs into one panorama.
//!
//! ```text
//! stitch_pair left.jpg right.jpg -o panorama.png --ratio 0.8
//! ```

use clap::Parser;
use cv_photo::{load_image, StitchConfig, Stitcher};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "stitch_pair")]
#[command(about = "Stitch two overlapping images into a panorama")]
#[command(version)]
struct Cli {
    /// Left image; its right edge overlaps the secondary.
    primary: PathBuf,

    /// Right image; its left edge overlaps the primary.
    secondary: PathBuf,

    /// Where to write the panorama. The format follows the extension.
    #[arg(short, long, default_value = "panorama.png")]
    output: PathBuf,

    /// JSON file with stitching parameters; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    ratio: Option<f32>,

    #[arg(long)]
    min_matches: Option<usize>,

    #[arg(long)]
    ransac_threshold: Option<f64>,

    #[arg(long)]
    smoothing_window: Option<u32>,

    #[arg(long)]
    tile_size: Option<u32>,

    #[arg(long)]
    sample_percentage: Option<u32>,

    #[arg(long)]
    features: Option<usize>,

    /// Give up after this many seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Worker threads (defaults to CV_STITCH_THREADS, then all cores).
    #[arg(long)]
    threads: Option<usize>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.print_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    cv_core::init_global_thread_pool(cli.threads)?;
    tracing::info!(threads = cv_core::current_cpu_threads(), "thread pool ready");

    run(&cli, config)
}

fn build_config(cli: &Cli) -> CliResult<StitchConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| -> CliError {
                format!("Failed to read config {}: {}", path.display(), e).into()
            })?;
            StitchConfig::from_json_str(&json)?
        }
        None => StitchConfig::default(),
    };

    if let Some(v) = cli.ratio {
        config.ratio = v;
    }
    if let Some(v) = cli.min_matches {
        config.min_matches = v;
    }
    if let Some(v) = cli.ransac_threshold {
        config.ransac_threshold = v;
    }
    if let Some(v) = cli.smoothing_window {
        config.smoothing_window = v;
    }
    if let Some(v) = cli.tile_size {
        config.tile_size = v;
    }
    if let Some(v) = cli.sample_percentage {
        config.sample_percentage = v;
    }
    if let Some(v) = cli.features {
        config.orb.n_features = v;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli, config: StitchConfig) -> CliResult<()> {
    let primary = load_image(&cli.primary)?;
    let secondary = load_image(&cli.secondary)?;
    tracing::info!(
        "Loaded {} ({}x{}) and {} ({}x{})",
        cli.primary.display(),
        primary.width(),
        primary.height(),
        cli.secondary.display(),
        secondary.width(),
        secondary.height()
    );

    let deadline = deadline_after(Instant::now(), cli.timeout)?;

    let stitcher = Stitcher::new(config)?;
    let panorama = stitcher.stitch_with_deadline(&primary, &secondary, deadline)?;

    let format = output_format(&cli.output)?;
    std::fs::write(&cli.output, panorama.encode(format)?)?;
    tracing::info!(
        "Panorama {}x{} written to {}",
        panorama.width(),
        panorama.height(),
        cli.output.display()
    );
    Ok(())
}

/// Deadline `timeout` seconds after `now`. A timeout too far out to represent
/// as an `Instant` means no deadline.
fn deadline_after(now: Instant, timeout: Option<f64>) -> CliResult<Option<Instant>> {
    let Some(secs) = timeout else {
        return Ok(None);
    };
    let budget = Duration::try_from_secs_f64(secs).map_err(|e| -> CliError {
        format!("--timeout must be a non-negative number of seconds, got {secs}: {e}").into()
    })?;
    Ok(now.checked_add(budget))
}

fn output_format(path: &Path) -> CliResult<ImageFormat> {
    ImageFormat::from_path(path).map_err(|e| -> CliError {
        format!("Cannot infer an image format for {}: {}", path.display(), e).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_becomes_deadline() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, None).unwrap(), None);
        assert_eq!(
            deadline_after(now, Some(1.5)).unwrap(),
            Some(now + Duration::from_millis(1500))
        );
    }

    #[test]
    fn bad_timeouts_are_rejected() {
        let now = Instant::now();
        assert!(deadline_after(now, Some(-1.0)).is_err());
        assert!(deadline_after(now, Some(f64::NAN)).is_err());
        assert!(deadline_after(now, Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn far_timeouts_do_not_panic() {
        let now = Instant::now();
        assert!(deadline_after(now, Some(1e300)).is_err());
        // Representable as a duration but not as an instant.
        assert_eq!(deadline_after(now, Some(u64::MAX as f64 / 2.0)).unwrap(), None);
    }

    #[test]
    fn output_format_follows_extension() {
        assert_eq!(output_format(Path::new("out.png")).unwrap(), ImageFormat::Png);
        assert!(output_format(Path::new("out.unknown")).is_err());
    }
}
