//! Tracemap CLI entry point.

use tracemap_lib::cli::{self, Cli};
use tracemap_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
