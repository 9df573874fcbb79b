mod args;
mod bootstrap;
mod constants;
mod db;
mod logging;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = args::Cli::parse();

    logging::init();

    bootstrap::bootstrap(cli).await
}
