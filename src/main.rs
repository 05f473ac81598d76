use clap::{Parser, Subcommand};
use statmap::config::AppConfig;
use statmap::pipeline::IngestionPipeline;
use statmap::server;
use statmap::stats::Statistics;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the map API and static front-end
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run the ingestion pipeline once and print what it produced
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Inspect { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            inspect(&app_config).await?;
        }
    }

    Ok(())
}

async fn inspect(config: &AppConfig) -> anyhow::Result<()> {
    let pipeline = IngestionPipeline::from_config(config);

    match pipeline.load_locations().await {
        Ok(batch) => {
            println!(
                "Locations: {} accepted, {} blank, {} rejected",
                batch.report.accepted,
                batch.report.skipped_blank,
                batch.report.rejected.len()
            );
            for (category, locations) in batch.collection.iter() {
                println!("  {:<24} {}", category, locations.len());
            }
            for rejection in &batch.report.rejected {
                println!("  row {}: {}", rejection.row, rejection.reason);
            }
        }
        Err(e) => println!("Locations unavailable: {}", e),
    }

    let statistics = pipeline.load_statistics().await;
    match &statistics {
        Statistics::Available(index) => println!(
            "Statistics: {} regions ({} rows without id, {} duplicate ids)",
            index.len(),
            index.report().skipped_blank,
            index.duplicates().len()
        ),
        Statistics::Unavailable { reason } => println!("Statistics unavailable: {}", reason),
    }

    let session = server::build_session(config, statistics)?;
    let regions = session.layers().regions();
    let joined = session
        .statistics()
        .index()
        .map_or(0, |index| regions.iter().filter(|r| index.lookup(&r.id).is_some()).count());
    println!("Regions: {} loaded, {} joined to statistics", regions.len(), joined);

    Ok(())
}
