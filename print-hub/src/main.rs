use std::sync::Arc;

use anyhow::Context;
use print_hub::{Config, PrintHub, RedbStore, init_logger_with_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env) and logging
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), None, config.log_dir.as_deref());

    tracing::info!("Print hub starting...");

    // 2. Storage
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
    let store = RedbStore::open(config.db_path())
        .with_context(|| format!("opening database {}", config.db_path().display()))?;

    // 3. Hub and its background tasks
    let hub = PrintHub::new(config, Arc::new(store))?;
    hub.start();

    for printer in hub.list_printers() {
        tracing::info!(
            printer_id = %printer.id,
            name = %printer.name,
            address = %printer.address(),
            role = %printer.role,
            default = printer.is_default,
            "Configured printer"
        );
    }

    // 4. Run until Ctrl-C
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    hub.shutdown().await;

    Ok(())
}
