use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), dcr_broker::provider::error::Error> {
    use dcr_broker::util::cli::*;

    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let opts = Options::parse();
    run_cli_action(opts)?;
    println!("OK!");
    Ok(())
}
