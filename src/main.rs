use anyhow::anyhow;
use clap::Parser;
use log::info;

use email_scraper_lib::{logger, server, Config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate().map_err(|e| anyhow!(e))?;

    logger::init(config.log_level);
    info!("Starting Google Email Scraper...");
    info!("Backend: {:?}, search URL: {}", config.backend, config.search_url);

    server::run(config).await?;
    Ok(())
}
