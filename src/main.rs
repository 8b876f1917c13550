use clap::Parser;
use color_eyre::Result;
use envprint::{
    init_logging,
    run,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(args.debug);
    run(args).await
}
