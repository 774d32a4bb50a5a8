use anyhow::Result;
use clap::Parser;
use load_forecaster::{train_all, ForecastConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "load_forecaster")]
#[command(about = "Train per-region quantile load forecasts with anomaly flags")]
struct Args {
    /// Tidy input parquet with (timestamp, region, load_MW)
    #[arg(long, default_value = "data/clean/load_long.parquet")]
    input: PathBuf,

    /// Destination parquet for the merged predictions
    #[arg(long, default_value = "data/clean/preds.parquet")]
    output: PathBuf,

    /// Train regions one at a time instead of in parallel
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    train_all(
        &args.input,
        &args.output,
        &ForecastConfig::default(),
        !args.sequential,
    )?;
    Ok(())
}
