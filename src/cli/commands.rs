//! CLI command definitions for virtufit.
//!
//! Each command wires the orchestrator together from environment
//! configuration: a MinIO store client, a Docker daemon client, the stage
//! runner, and the workflow coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::execution::DockerClient;
use crate::pipeline::{workflows, PipelineCoordinator};
use crate::stage::StageRunner;
use crate::stage::Bindings;
use crate::store::keys::Gender;
use crate::store::{init, ArtifactStore, GarmentCatalog, MinioClient};

/// Reference size used for garment previews; only one size is rendered.
const PREVIEW_SIZE: &str = "L";

/// GPU pipeline orchestrator for 3D body model generation and garment try-on.
#[derive(Parser)]
#[command(name = "virtufit")]
#[command(about = "Generate 3D body models and fit garments via containerized GPU stages")]
#[command(version)]
#[command(
    long_about = "virtufit drives a multi-stage GPU pipeline: a photo becomes body keypoints,\n\
                  a fitted 3D mesh, and a smoothed mesh; garments from the catalog are then\n\
                  simulated onto the mesh. Each stage runs as an ephemeral container and\n\
                  exchanges data through the shared object store.\n\n\
                  Example usage:\n  virtufit model --image photo.jpg --gender female --output avatar.obj"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create the store buckets and seed the garment catalog.
    Init {
        /// Local directory holding the garment catalog to upload.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Generate a smoothed 3D body model from a photo.
    Model {
        /// Path to the input photo.
        #[arg(long)]
        image: PathBuf,

        /// Body model gender (male or female).
        #[arg(long)]
        gender: String,

        /// Where to write the smoothed model obj.
        #[arg(long, default_value = "model_smooth.obj")]
        output: PathBuf,
    },

    /// Render missing garment previews and print presigned URLs.
    Previews {
        /// Gender whose garment previews to render.
        #[arg(long)]
        gender: String,
    },

    /// Fit a garment onto a generated avatar.
    #[command(name = "try-on")]
    TryOn {
        /// Store key of the smoothed avatar obj (from `model`).
        #[arg(long)]
        avatar: String,

        /// Garment slug from the catalog (e.g. summer-dress).
        #[arg(long)]
        garment: String,

        /// Body model gender (male or female).
        #[arg(long)]
        gender: String,

        /// Garment size (e.g. S, M, L).
        #[arg(long)]
        size: String,

        /// Simulation quality (low, medium, high).
        #[arg(long, default_value = "medium")]
        quality: String,

        /// Garment color variant.
        #[arg(long, default_value = "default")]
        color: String,

        /// Where to write the fitted obj.
        #[arg(long, default_value = "fit.obj")]
        output: PathBuf,
    },

    /// Check daemon and store reachability.
    Status,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses and runs the CLI in one step.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Init { catalog } => cmd_init(&config, catalog).await,
        Commands::Model {
            image,
            gender,
            output,
        } => cmd_model(&config, &image, &gender, &output).await,
        Commands::Previews { gender } => cmd_previews(&config, &gender).await,
        Commands::TryOn {
            avatar,
            garment,
            gender,
            size,
            quality,
            color,
            output,
        } => cmd_try_on(&config, &avatar, &garment, &gender, &size, &quality, &color, &output).await,
        Commands::Status => cmd_status(&config).await,
    }
}

/// Builds the coordinator stack over live daemon and store clients.
fn build_coordinator(
    config: &PipelineConfig,
    store: Arc<MinioClient>,
) -> anyhow::Result<PipelineCoordinator<StageRunner<DockerClient, MinioClient>>> {
    let daemon = Arc::new(DockerClient::new().context("failed to connect to the Docker daemon")?);
    let runner = Arc::new(StageRunner::new(daemon, store, config));
    Ok(PipelineCoordinator::new(runner))
}

async fn cmd_init(config: &PipelineConfig, catalog: Option<PathBuf>) -> anyhow::Result<()> {
    let store = MinioClient::new(config);
    let buckets = [config.data_bucket.as_str(), config.clothes_bucket.as_str()];

    init::create_buckets(&store, &buckets)
        .await
        .context("failed to create buckets")?;

    let catalog_path = catalog.unwrap_or_else(|| config.catalog_path.clone());
    let uploaded = init::seed_catalog(&store, &config.clothes_bucket, &catalog_path)
        .await
        .context("failed to seed garment catalog")?;

    println!("Buckets ready; uploaded {uploaded} catalog file(s)");
    Ok(())
}

async fn cmd_model(
    config: &PipelineConfig,
    image: &Path,
    gender: &str,
    output: &Path,
) -> anyhow::Result<()> {
    let gender: Gender = gender.parse()?;
    let ext = image
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();
    if ext.is_empty() {
        bail!("input photo '{}' has no file extension", image.display());
    }

    let data = tokio::fs::read(image)
        .await
        .with_context(|| format!("failed to read '{}'", image.display()))?;

    let store = Arc::new(MinioClient::new(config));
    let coordinator = build_coordinator(config, Arc::clone(&store))?;

    // One unique folder id per run keeps concurrent workflows on disjoint keys.
    let folder_id = Uuid::new_v4().simple().to_string();
    let image_key = crate::store::keys::image_key(&folder_id, &ext);
    store
        .put_object(&config.data_bucket, &image_key, data)
        .await
        .context("failed to upload input photo")?;
    info!(key = %image_key, "uploaded input photo");

    let plan = workflows::model_generation_plan(config);
    let bindings = workflows::model_bindings(&folder_id, &ext, gender);
    let final_key = coordinator.run_workflow(&plan, &bindings).await?;

    let model = store
        .get_object(&config.data_bucket, &final_key)
        .await
        .context("failed to download smoothed model")?;
    tokio::fs::write(output, model)
        .await
        .with_context(|| format!("failed to write '{}'", output.display()))?;

    println!("Wrote smoothed model to {}", output.display());
    Ok(())
}

async fn cmd_previews(config: &PipelineConfig, gender: &str) -> anyhow::Result<()> {
    let gender: Gender = gender.parse()?;
    let store = Arc::new(MinioClient::new(config));
    let catalog = GarmentCatalog::new(store.as_ref(), &config.clothes_bucket);

    let blend_files = catalog.blend_files(gender, PREVIEW_SIZE).await?;
    let preview_files = catalog.preview_files(gender).await?;
    let missing = GarmentCatalog::missing_previews(&blend_files, &preview_files);

    if missing.is_empty() {
        println!("All previews are up-to-date");
        for preview in &preview_files {
            let url = store
                .presigned_external_url(&config.clothes_bucket, preview, config.presign_expiry)
                .await?;
            println!("{url}");
        }
        return Ok(());
    }

    info!(count = missing.len(), "rendering missing previews");
    let coordinator = build_coordinator(config, Arc::clone(&store))?;
    let plan = workflows::preview_generation_plan(config, &missing);
    coordinator.run_workflow(&plan, &Bindings::new()).await?;

    println!("Previews generated successfully");
    let catalog = GarmentCatalog::new(store.as_ref(), &config.clothes_bucket);
    for preview in catalog.preview_files(gender).await? {
        let url = store
            .presigned_external_url(&config.clothes_bucket, preview.as_str(), config.presign_expiry)
            .await?;
        println!("{url}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_try_on(
    config: &PipelineConfig,
    avatar: &str,
    garment: &str,
    gender: &str,
    size: &str,
    quality: &str,
    color: &str,
    output: &Path,
) -> anyhow::Result<()> {
    let gender: Gender = gender.parse()?;
    if !matches!(quality, "low" | "medium" | "high") {
        bail!("invalid quality '{quality}': must be low, medium, or high");
    }

    let store = Arc::new(MinioClient::new(config));
    let catalog = GarmentCatalog::new(store.as_ref(), &config.clothes_bucket);

    // Validate the request against the catalog before starting containers.
    let garments = catalog.available_garments().await?;
    if !garments.iter().any(|g| g == garment) {
        bail!("unknown garment '{garment}'; available: {}", garments.join(", "));
    }
    let sizes = catalog.available_sizes(garment, gender).await?;
    if !sizes.iter().any(|s| s == size) {
        bail!(
            "size '{size}' not stocked for '{garment}' ({gender}); available: {}",
            sizes.join(", ")
        );
    }

    let coordinator = build_coordinator(config, Arc::clone(&store))?;
    let plan = workflows::try_on_plan(config);
    let bindings = workflows::try_on_bindings(avatar, garment, gender, size, quality, color);
    let fit_key = coordinator.run_workflow(&plan, &bindings).await?;

    let fitted = store
        .get_object(&config.data_bucket, &fit_key)
        .await
        .context("failed to download fitted model")?;
    tokio::fs::write(output, fitted)
        .await
        .with_context(|| format!("failed to write '{}'", output.display()))?;

    println!("Wrote fitted model to {}", output.display());
    Ok(())
}

async fn cmd_status(config: &PipelineConfig) -> anyhow::Result<()> {
    let store = MinioClient::new(config);

    match DockerClient::new() {
        Ok(daemon) => match daemon.ping().await {
            Ok(()) => println!("docker daemon: ok"),
            Err(e) => println!("docker daemon: unreachable ({e})"),
        },
        Err(e) => println!("docker daemon: unreachable ({e})"),
    }

    for bucket in [&config.data_bucket, &config.clothes_bucket] {
        match store.bucket_exists(bucket).await {
            Ok(true) => println!("bucket '{bucket}': ok"),
            Ok(false) => println!("bucket '{bucket}': missing (run `virtufit init`)"),
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "store check failed");
                println!("bucket '{bucket}': unreachable ({e})");
            }
        }
    }

    Ok(())
}
