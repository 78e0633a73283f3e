use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claimsense::config::{Config, LogFormat};
use claimsense::model::GenerationOptions;
use claimsense::pipeline::EntityExtractor;
use claimsense::ResilientModelClient;

/// Diagnostic CLI for the claim decision pipeline.
#[derive(Parser)]
#[command(name = "claimsense", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract structured claim fields from a query
    Extract {
        /// The free-text claim query
        query: String,
        /// Skip the model path and use only the regex fallback
        #[arg(long)]
        offline: bool,
    },
    /// Send a raw prompt through the resilient model client
    Generate {
        /// The prompt text
        prompt: String,
        /// Sampling temperature
        #[arg(long, default_value_t = 0.0)]
        temperature: f32,
        /// Completion token budget
        #[arg(long, default_value_t = 1000)]
        max_tokens: u32,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Claimsense starting...");

    match cli.command {
        Command::Extract { query, offline } => {
            let extractor = if offline {
                EntityExtractor::offline()
            } else {
                let client = new_client(&config)?;
                EntityExtractor::new(client)
            };
            let structured = extractor.extract(&query).await;
            println!("{}", serde_json::to_string_pretty(&structured)?);
        }
        Command::Generate {
            prompt,
            temperature,
            max_tokens,
        } => {
            let client = new_client(&config)?;
            let options = GenerationOptions::default()
                .with_temperature(temperature)
                .with_max_tokens(max_tokens);
            match client.generate(&prompt, options).await {
                Ok(content) => println!("{content}"),
                Err(e) => {
                    error!(error = %e, "Generation failed");
                    return Err(e.into());
                }
            }
        }
        Command::Config => {
            println!("base_url: {}", config.model.base_url);
            println!("primary_model: {}", config.model.primary_model);
            println!("fallback_models: {}", config.model.fallback_models.join(", "));
            println!("retrieval.top_k: {}", config.retrieval.top_k);
            println!("batch.batch_size: {}", config.batch.batch_size);
        }
    }

    Ok(())
}

fn new_client(config: &Config) -> anyhow::Result<Arc<ResilientModelClient>> {
    match ResilientModelClient::new(&config.model, config.request.clone()) {
        Ok(client) => {
            info!(base_url = %config.model.base_url, "Model client initialized");
            Ok(Arc::new(client))
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize model client");
            Err(e.into())
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
