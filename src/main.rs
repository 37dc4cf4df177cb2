use azctl::cli::{self, Cli};
use azctl::logging::init_logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.global.log_config()) {
        eprintln!("Warning: {}", e);
    }

    let ctx = cli.global.context();
    cli::execute(&cli.command, &ctx).await
}
