use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use logship_client::EventManager;

#[derive(Debug, Parser)]
pub struct Ship {
    #[arg(
        long,
        value_delimiter = ',',
        help = "Static backend addresses, e.g. http://127.0.0.1:6701"
    )]
    pub backends: Vec<String>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Discovery store endpoints serving live backend membership"
    )]
    pub discovery: Vec<String>,

    #[arg(short, long, default_value = "system", help = "Event id to ship under")]
    pub event_id: String,
}

pub async fn handle_ship(ship: Ship) -> Result<()> {
    let manager = EventManager::builder()
        .backends(ship.backends)
        .discovery_endpoints(ship.discovery)
        .build()
        .await?;
    manager.start().await?;

    let logger = manager.get_logger(&ship.event_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shipped = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    logger.info(&line, None);
                    shipped += 1;
                }
                None => break,
            }
        }
    }

    info!(count = shipped, "shipped records, shutting down");
    manager.release_logger(&logger);
    manager.close();
    Ok(())
}
