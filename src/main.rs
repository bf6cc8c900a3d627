// Command-line front end: register the configured sources, run one task
// chain and write the encoded result.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use image_pipeline_lib::{execute, execute_with_timeout, parse, sources, Image, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "image-pipeline", version, about = "Run an image task chain")]
struct Cli {
    /// JSON config listing the sources to register
    #[arg(short, long)]
    config: PathBuf,

    /// Task chain, e.g. `local/cat.png|fitResize/800/600`
    task_chain: String,

    /// Accept hint used by autoOptimize
    #[arg(long, default_value = "")]
    accept: String,

    /// Where to write the result
    #[arg(short, long)]
    output: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = PipelineConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let registry = sources::global();
    registry.register_configured(&config).await?;
    info!("{} source(s) registered", registry.len());

    let result = run_chain(&cli, &config).await;
    registry.close_all().await;
    let image = result?;

    let (data, format) = image.bytes()?;
    tokio::fs::write(&cli.output, data)
        .await
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!(
        "Wrote {}×{} {} ({} bytes) to {}",
        image.width(),
        image.height(),
        format,
        data.len(),
        cli.output.display()
    );
    Ok(())
}

async fn run_chain(cli: &Cli, config: &PipelineConfig) -> Result<Arc<Image>> {
    let jobs = parse(&cli.task_chain, &cli.accept)?;
    debug!("Running {} job(s)", jobs.len());
    let initial = Arc::new(Image::blank());
    let image = match config.timeout() {
        Some(timeout) => execute_with_timeout(initial, &jobs, timeout).await?,
        None => execute(initial, &jobs).await?,
    };
    Ok(image)
}
