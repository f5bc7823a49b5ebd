use expense_mesh::config::Config;
use expense_mesh::{logging, server};

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    logging::init(&config.logging);

    tracing::info!("Starting expense-service...");
    server::run_expense_service(config).await?;
    Ok(())
}
