//! vecmigrate CLI
//!
//! CLI tool for copying vector collections between Pinecone, Qdrant and `ChromaDB`.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use vecmigrate::connectors::create_source;
use vecmigrate::{
    translate_metric, Backend, MigrationConfig, MigrationResult, Pipeline, SourceReader,
};

#[derive(Parser)]
#[command(name = "vecmigrate")]
#[command(version)]
#[command(
    about = "Copy vector collections between Pinecone, Qdrant and ChromaDB",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Dry run mode (don't write to destination)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Batch size override
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run,

    /// Validate configuration file
    Validate,

    /// Describe the source collection
    Schema,

    /// Generate example configuration
    Init {
        /// Source type (pinecone, qdrant, chromadb)
        #[arg(short, long)]
        source: String,

        /// Destination type (pinecone, qdrant, chromadb)
        #[arg(short, long)]
        destination: String,

        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the result JSON.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match (cli.command, cli.config.as_deref()) {
        (Some(Commands::Init {
            source,
            destination,
            output,
        }), _) => {
            generate_config(&source, &destination, &output)?;
        }
        (Some(Commands::Validate), Some(config)) => {
            validate_config(config)?;
        }
        (Some(Commands::Schema), Some(config)) => {
            show_schema(config).await?;
        }
        (Some(Commands::Run) | None, Some(config)) => {
            let result = run_migration(config, cli.dry_run, cli.batch_size).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: vecmigrate <COMMAND> --config <FILE>");
            eprintln!("Try 'vecmigrate --help' for more information.");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_migration(
    config_path: &Path,
    dry_run: bool,
    batch_size: Option<usize>,
) -> MigrationResult {
    info!("Loading configuration from {:?}", config_path);

    let pipeline = MigrationConfig::from_file(config_path).and_then(|mut config| {
        if dry_run {
            config.options.dry_run = true;
        }
        if let Some(bs) = batch_size {
            config.options.batch_size = bs;
        }
        Pipeline::new(config)
    });

    match pipeline {
        Ok(pipeline) => pipeline.execute().await,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            MigrationResult::Error {
                message: e.to_string(),
            }
        }
    }
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;

    let source = config.source.scope();
    let destination = config.destination.scope();
    println!("✅ Configuration is valid!");
    println!(
        "   Source:      {} '{}'",
        config.source.backend(),
        source.collection
    );
    println!(
        "   Destination: {} '{}'",
        config.destination.backend(),
        destination.collection
    );
    println!(
        "   Batch size:  {}",
        config.options.effective_batch_size()
    );

    Ok(())
}

async fn show_schema(config_path: &Path) -> anyhow::Result<()> {
    info!("Loading configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    let reader = create_source(&config.source, config.options.timeout())?;
    let schema = reader.describe(&config.source.scope()).await?;

    println!("\n📊 Source Schema:");
    println!("   Type:       {}", schema.source_type);
    println!("   Collection: {}", schema.collection);
    println!(
        "   Dimension:  {}",
        schema
            .dimension
            .map_or("unknown".to_string(), |d| d.to_string())
    );
    match schema.metric.as_deref() {
        Some(metric) => match translate_metric(reader.backend(), metric) {
            Ok(canonical) => println!("   Metric:     {} ({})", metric, canonical),
            Err(e) => println!("   Metric:     {} (unsupported: {})", metric, e),
        },
        None => println!("   Metric:     unknown"),
    }
    println!(
        "   Count:      {}",
        schema
            .total_count
            .map_or("unknown".to_string(), |c| c.to_string())
    );

    Ok(())
}

fn generate_config(source: &str, destination: &str, output: &Path) -> anyhow::Result<()> {
    let (source, destination) = match (Backend::parse(source), Backend::parse(destination)) {
        (Ok(s), Ok(d)) => (s, d),
        (Err(e), _) | (_, Err(e)) => {
            error!("{}", e);
            eprintln!("Supported backends: pinecone, qdrant, chromadb");
            std::process::exit(1);
        }
    };

    let template = format!(
        "# vecmigrate configuration - {} to {}\nsource:\n{}\ndestination:\n{}\n{}",
        source,
        destination,
        endpoint_template(source),
        endpoint_template(destination),
        OPTIONS_TEMPLATE
    );

    std::fs::write(output, template)?;
    println!("✅ Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: vecmigrate run --config {:?}",
        output
    );

    Ok(())
}

fn endpoint_template(backend: Backend) -> &'static str {
    match backend {
        Backend::Pinecone => PINECONE_TEMPLATE,
        Backend::Qdrant => QDRANT_TEMPLATE,
        Backend::ChromaDB => CHROMADB_TEMPLATE,
    }
}

const PINECONE_TEMPLATE: &str = r#"  type: pinecone
  api_key: ${PINECONE_API_KEY}
  index: your-index-name
  # namespace: optional-namespace
  # host: your-index-host.svc.pinecone.io  # Resolved from the control plane if omitted
  # cloud: aws          # Used when the index has to be created
  # region: us-east-1
"#;

const QDRANT_TEMPLATE: &str = r#"  type: qdrant
  url: http://localhost:6333
  collection: your_collection
  # api_key: ${QDRANT_API_KEY}  # Optional
  # vector_name: text  # Named vector, if the collection uses them
"#;

const CHROMADB_TEMPLATE: &str = r#"  type: chromadb
  url: http://localhost:8000
  collection: your_collection
  # api_key: ${CHROMA_API_KEY}  # Chroma Cloud only
  # tenant: default_tenant
  # database: default_database
"#;

const OPTIONS_TEMPLATE: &str = r#"options:
  batch_size: 100  # Capped at 500
  timeout_secs: 60
  dry_run: false
  progress: true
  # field_mappings:
  #   old_field: new_field
"#;
