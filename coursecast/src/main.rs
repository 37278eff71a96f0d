mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use coursecast_core::{
    bootstrap::{init_database, load_config},
    logging,
};

use server::CoursecastServer;

#[derive(Debug, Parser)]
#[command(name = "coursecast", about = "Real-time course channel server")]
struct Cli {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load and validate configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("coursecast server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize database
    let pool = init_database(&config).await?;

    // 4. Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../migrations").run(&pool).await?;
    info!("Migrations completed");

    // 5. Serve until shutdown
    CoursecastServer::new(config, pool).run().await
}
