//! Design mask CLI tool
//!
//! Derives background/mask design file pairs from product photos using the
//! design-mask library.

#[cfg(feature = "cli")]
use design_mask::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
