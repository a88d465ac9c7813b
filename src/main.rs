use clap::Parser;
use tether::{Cli, ClientError, client};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt::init();

    let config = Cli::parse().into_config()?;
    client::run(&config).await
}
