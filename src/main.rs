use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use kmeans_engine::{
    generate_points, DataLoader, DataMatrix, EngineConfig, KMeansEngine,
    Result as KMeansResult,
};

#[derive(Parser, Debug)]
#[command(name = "kmeans-engine")]
#[command(about = "Partitional k-means clustering over file-based or synthetic datasets", long_about = None)]
struct Args {
    /// Number of clusters
    #[arg(short, long, default_value_t = 3)]
    k: usize,

    /// Number of assign/recompute rounds to execute
    #[arg(short, long, default_value_t = 10)]
    iterations: usize,

    /// Number of points to generate when not using --input
    #[arg(short = 'n', long, default_value_t = 100_000)]
    points: usize,

    /// Dimensionality of points when generating
    #[arg(short, long, default_value_t = 2)]
    dim: usize,

    /// RNG seed for centroid initialisation and synthetic data
    #[arg(long, default_value_t = 42u64)]
    seed: u64,

    /// Input dataset (whitespace text, CSV, or Parquet)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Explicitly specify the input file format (default: auto-detect from extension)
    #[arg(long, value_enum)]
    format: Option<InputFormat>,

    /// Output file for centroids and cluster statistics (JSON)
    #[arg(short, long, default_value = "clusters.json")]
    output: PathBuf,

    /// Embed full per-cluster point membership in the JSON report
    #[arg(long, default_value_t = false)]
    members: bool,

    /// Verbosity: set RUST_LOG style level (info, debug, warn)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InputFormat {
    Text,
    Csv,
    Parquet,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = init_logging(&args.log_level) {
        eprintln!("failed to initialise logging: {err}");
    }

    if let Err(err) = run(args) {
        error!(error = %err, "clustering run failed");
        process::exit(1);
    }
}

fn init_logging(level: &str) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(match level {
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|err| err.to_string())
}

fn run(args: Args) -> KMeansResult<()> {
    info!(
        k = args.k,
        n_iter = args.iterations,
        seed = args.seed,
        "starting clustering run"
    );

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let data = load_data(
        args.input.as_deref(),
        args.format,
        args.points,
        args.dim,
        &mut rng,
    )?;

    let config = EngineConfig {
        k: args.k,
        n_iter: args.iterations,
    };

    let mut engine = KMeansEngine::new(&data, config, &mut rng)?;
    let start = Instant::now();
    engine.run()?;
    let elapsed = start.elapsed();

    info!(
        took_seconds = elapsed.as_secs_f64(),
        sizes = ?engine.cluster_sizes(),
        "clustering run finished"
    );

    write_report(&args, &data, &engine, elapsed.as_secs_f64())
}

fn load_data(
    input: Option<&Path>,
    format: Option<InputFormat>,
    points: usize,
    dim: usize,
    rng: &mut ChaCha8Rng,
) -> KMeansResult<DataMatrix> {
    if let Some(path) = input {
        let format_to_use =
            format.unwrap_or_else(|| infer_format(path).unwrap_or(InputFormat::Text));
        info!(path = ?path, ?format_to_use, "loading input data");
        match format_to_use {
            InputFormat::Text => DataLoader::load_text(path),
            InputFormat::Csv => DataLoader::load_csv(path),
            InputFormat::Parquet => DataLoader::load_parquet(path),
        }
    } else {
        if let Some(requested) = format {
            info!(
                ?requested,
                "ignoring --format because synthetic data will be generated"
            );
        }
        info!(points, dim, "generating synthetic uniform data");
        Ok(generate_points(points, dim, rng))
    }
}

fn infer_format(path: &Path) -> Option<InputFormat> {
    path.extension().and_then(|ext| ext.to_str()).map(|ext| {
        match ext.to_ascii_lowercase().as_str() {
            "parquet" | "pq" => InputFormat::Parquet,
            "csv" => InputFormat::Csv,
            _ => InputFormat::Text,
        }
    })
}

fn write_report(
    args: &Args,
    data: &DataMatrix,
    engine: &KMeansEngine<'_>,
    elapsed_secs: f64,
) -> KMeansResult<()> {
    let centroids: Vec<Vec<f64>> = engine
        .centroids()
        .rows()
        .into_iter()
        .map(|row| row.to_vec())
        .collect();

    let mut dump = json!({
        "k": engine.k(),
        "dim": data.ncols(),
        "rows": data.nrows(),
        "n_iter": engine.n_iter(),
        "seed": args.seed,
        "elapsed_seconds": elapsed_secs,
        "cluster_sizes": engine.cluster_sizes(),
        "centroids": centroids,
        "data_source": if let Some(path) = args.input.as_ref() {
            json!({
                "type": "file",
                "path": path.display().to_string(),
            })
        } else {
            json!({
                "type": "synthetic",
                "points": args.points,
                "dim": args.dim,
            })
        },
    });

    if args.members {
        let clusters: Vec<Vec<Vec<f64>>> = engine
            .clusters()
            .iter()
            .map(|members| {
                members
                    .rows()
                    .into_iter()
                    .map(|row| row.to_vec())
                    .collect()
            })
            .collect();
        dump["clusters"] = json!(clusters);
    }

    std::fs::write(&args.output, serde_json::to_string_pretty(&dump)?)?;
    info!(path = ?args.output, "wrote clustering report");
    Ok(())
}
