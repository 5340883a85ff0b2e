use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use faceverify::server::routes::{EmbeddingResponse, VerificationResponse};
use faceverify::{config, matcher, provider, EmbeddingProvider};
use log::info;

#[derive(Parser)]
#[command(name = "faceverify")]
#[command(version, about = "Face verification service - compare two faces by embedding distance")]
struct Cli {
    /// Config file (defaults to the system-wide location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Print the embedding of the best face in an image
    Embed { image: PathBuf },
    /// Decide whether two images show the same person
    Compare { image_a: PathBuf, image_b: PathBuf },
    /// Open config file in editor
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { bind } => {
            let (cfg, provider) = load(config_path)?;
            faceverify::server::serve(&cfg.server, bind, provider).await
        }
        Commands::Embed { image } => {
            let (_, provider) = load(config_path)?;
            let embedding = provider.embed(read_image(&image)?).await?;
            let response = EmbeddingResponse {
                success: true,
                embedding_size: embedding.len(),
                embedding: embedding.to_vec(),
                model: provider.profile().name().to_string(),
                face_detected: true,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Compare { image_a, image_b } => {
            let (_, provider) = load(config_path)?;
            let a = provider.embed(read_image(&image_a)?).await?;
            let b = provider.embed(read_image(&image_b)?).await?;
            let profile = provider.profile();
            let result = matcher::verify(&a, &b, profile)?;

            info!(
                "{}: distance {:.4} (threshold {})",
                profile, result.distance, result.threshold
            );
            let response = VerificationResponse::new(result, profile.name());
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Config => open_config(config_path),
    }
}

fn load(path: Option<&Path>) -> Result<(config::Config, Arc<dyn EmbeddingProvider>)> {
    let cfg = config::load_config(path)?;
    let provider =
        provider::from_config(&cfg.provider).context("Failed to initialize embedding provider")?;
    Ok((cfg, provider))
}

fn read_image(path: &Path) -> Result<Bytes> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Bytes::from(data))
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        info!("Writing default config to {}", config_path.display());
        config::save_config(&config::Config::default(), Some(config_path))?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
