use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = bank_sync::args::parse();
    bank_sync::cli::main(args).await
}
