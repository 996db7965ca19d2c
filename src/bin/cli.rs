//! Subreddit ETL CLI
//!
//! Entry point for scheduled runs and manual maintenance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use subreddit_etl::{
    error::{AppError, Result},
    models::{Config, Secret, parse_forum_list},
    pipeline,
    services::{GoogleAuth, RedditClient, SecretClient},
    storage::{BigQueryWarehouse, LocalWarehouse, Warehouse},
    utils::http,
};

/// Subreddit ETL - scheduled forum-to-warehouse loader
#[derive(Parser, Debug)]
#[command(
    name = "subreddit-etl",
    version,
    about = "Load recent forum posts and comments into a warehouse"
)]
struct Cli {
    /// Path to a TOML config file (missing file means defaults)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, clean and load every configured forum
    Run {
        /// Write to a local directory instead of BigQuery
        #[arg(long)]
        local: Option<PathBuf>,

        /// Forum to process (repeatable, replaces the configured list)
        #[arg(long = "forum", value_name = "NAME")]
        forums: Vec<String>,

        /// Recency window in hours
        #[arg(long)]
        window_hours: Option<u64>,
    },

    /// Create the dataset and tables if they do not exist
    Setup {
        /// Write to a local directory instead of BigQuery
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// Validate configuration and show effective settings
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Token provider shared by the warehouse and secret clients.
fn google_auth(config: &Config) -> Result<Arc<GoogleAuth>> {
    let client = http::create_client(&config.source.user_agent, config.warehouse.timeout_secs)?;
    let auth = GoogleAuth::from_config(client, &config.warehouse);
    log::debug!("Google credentials: {}", auth.describe());
    Ok(Arc::new(auth))
}

/// Pick the warehouse backend.
fn build_warehouse(
    config: &Config,
    local: Option<&Path>,
    auth: &Arc<GoogleAuth>,
) -> Result<Box<dyn Warehouse>> {
    match local {
        Some(dir) => {
            log::info!("Using local warehouse at {}", dir.display());
            Ok(Box::new(LocalWarehouse::new(
                dir,
                &config.warehouse.dataset_id,
            )))
        }
        None => {
            let client =
                http::create_client(&config.source.user_agent, config.warehouse.timeout_secs)?;
            let warehouse = BigQueryWarehouse::new(client, Arc::clone(auth), &config.warehouse)?;
            log::info!(
                "Using BigQuery dataset {}:{} ({})",
                config.warehouse.project_id,
                config.warehouse.dataset_id,
                config.warehouse.location
            );
            Ok(Box::new(warehouse))
        }
    }
}

/// Fill missing source credentials from Secret Manager.
async fn resolve_credentials(config: &mut Config, auth: &Arc<GoogleAuth>) -> Result<()> {
    let needs_id = config.source.client_id.trim().is_empty();
    let needs_secret = config.source.client_secret.is_empty();
    if !config.secrets.is_enabled() || !(needs_id || needs_secret) {
        return Ok(());
    }

    let project = [
        config.secrets.project_id.clone(),
        Some(config.warehouse.project_id.clone()),
    ]
    .into_iter()
    .flatten()
    .find(|p| !p.trim().is_empty())
    .ok_or_else(|| AppError::config("no project configured for secret lookups"))?;

    let client = http::create_client(&config.source.user_agent, config.warehouse.timeout_secs)?;
    let secrets = SecretClient::new(client, &config.secrets.api_base, project, Arc::clone(auth));

    if needs_id {
        if let Some(name) = config.secrets.client_id_secret.clone() {
            config.source.client_id = secrets.access(&name).await?;
        }
    }
    if needs_secret {
        if let Some(name) = config.secrets.client_secret_secret.clone() {
            config.source.client_secret = Secret::new(secrets.access(&name).await?);
        }
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Subreddit ETL starting...");

    let mut config = if cli.config.exists() {
        let config = Config::load(&cli.config)?;
        log::info!("Loaded configuration from {}", cli.config.display());
        config
    } else {
        log::info!("No config file at {}, using defaults", cli.config.display());
        Config::default()
    };
    config.apply_env()?;

    match cli.command {
        Command::Run {
            local,
            forums,
            window_hours,
        } => {
            if !forums.is_empty() {
                config.forums = forums.iter().flat_map(|f| parse_forum_list(f)).collect();
            }
            if let Some(hours) = window_hours {
                config.extraction.window_hours = hours;
            }
            config.validate()?;

            let auth = google_auth(&config)?;
            let warehouse = build_warehouse(&config, local.as_deref(), &auth)?;
            resolve_credentials(&mut config, &auth).await?;

            let source = RedditClient::new(&config.source)?;
            source.authenticate().await?;
            log::info!("Authenticated with Reddit API");

            let summary =
                pipeline::run_pipeline(&config, &source, warehouse.as_ref(), Utc::now()).await?;
            if !summary.failures.is_empty() {
                log::warn!(
                    "{} of {} forums failed; see errors above",
                    summary.failures.len(),
                    config.forums.len()
                );
            }
        }

        Command::Setup { local } => {
            config.validate()?;
            let auth = google_auth(&config)?;
            let warehouse = build_warehouse(&config, local.as_deref(), &auth)?;
            pipeline::ensure_schema(warehouse.as_ref()).await?;
            log::info!("Schema ready");
        }

        Command::Validate => {
            pipeline::run_validate(&config)?;
            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}
