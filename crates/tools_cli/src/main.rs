use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use voxel_terrain::{SamplingMode, TerrainWorld, WorldConfig};

mod obj;

use obj::ObjExporter;

#[derive(Parser)]
#[command(author, version, about = "Generate voxel terrain and export it as OBJ", long_about = None)]
struct Args {
    /// JSON world configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Side length of the square of chunks built around the origin
    #[arg(short, long, default_value_t = 3)]
    size: u32,

    /// The output OBJ file path
    #[arg(short, long, default_value = "target/terrain.obj")]
    output: PathBuf,

    /// Override the noise seed
    #[arg(long)]
    seed: Option<u32>,

    /// Sample every lattice point as its own task, in batches of this size
    #[arg(long)]
    per_point: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Write the effective configuration to this path
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

/// Loaded config with command-line overrides applied, validated
fn effective_config(args: &Args) -> anyhow::Result<WorldConfig> {
    let mut config = match &args.config {
        Some(path) => WorldConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WorldConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.terrain.seed = seed;
    }
    if let Some(batch_size) = args.per_point {
        config.pipeline.sampling = SamplingMode::PerPoint { batch_size };
    }
    if let Some(threads) = args.threads {
        config.pipeline.worker_threads = threads;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = effective_config(&args)?;
    if let Some(path) = &args.dump_config {
        config.save(path).with_context(|| format!("writing config {}", path.display()))?;
    }

    let exporter = ObjExporter::new(config.chunk.dims());
    let mut world = TerrainWorld::new(config, exporter).context("creating terrain world")?;

    let start = Instant::now();
    let built = world.build_square(args.size).context("building terrain")?;
    tracing::info!(
        chunks = built,
        elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
        "Terrain generated"
    );

    let exporter = world.into_consumer();
    exporter.save(&args.output)?;
    tracing::info!(
        triangles = exporter.triangle_count(),
        "Wrote {}",
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_terrain::ConfigError;

    #[test]
    fn test_overrides_are_applied() {
        let args = Args::try_parse_from(["cli", "--seed", "9", "--per-point", "64"]).unwrap();
        let config = effective_config(&args).unwrap();
        assert_eq!(config.terrain.seed, 9);
        assert_eq!(config.pipeline.sampling, SamplingMode::PerPoint { batch_size: 64 });
    }

    #[test]
    fn test_invalid_override_is_rejected_before_use() {
        let args =
            Args::try_parse_from(["cli", "--per-point", "0", "--dump-config", "unused.json"])
                .unwrap();
        let err = effective_config(&args).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::InvalidBatchSize));
    }
}
