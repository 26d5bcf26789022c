#[tokio::main]
async fn main() -> Result<(), dcr_broker::provider::error::Error> {
    dcr_broker::provider::main().await
}
