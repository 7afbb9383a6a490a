use anyhow::Result;
use clap::Parser;

use mcp_client::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_tracing();
    let args = Cli::parse();
    cli::dispatch(args).await
}
