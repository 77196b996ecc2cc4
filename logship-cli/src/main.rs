mod ship;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ship::Ship;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "logship-cli")]
#[command(about = "A command-line tool to ship log records to a logship backend pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Ship stdin lines as info records")]
    Ship(Ship),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ship(ship) => ship::handle_ship(ship).await?,
    }

    Ok(())
}
