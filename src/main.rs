use anyhow::Result;

mod dashboard;
mod dataset_builder;
mod trainer;
mod verify;
mod workbook_reader;

fn print_usage() {
    println!("🚀 AESO Hourly Load Forecasting Pipeline");
    println!("{}", "=".repeat(60));
    println!("Usage:");
    println!("  --etl                  Read source workbooks, write load_raw / load_wide_clean / load_long");
    println!("  --train [--sequential] Train per-region quantile models, write preds");
    println!("  --all                  Run ETL then training");
    println!("  --dashboard [port]     Serve the dashboard (default port 8080)");
    println!("  --verify-results       Data-quality checks on the pipeline artifacts");
    println!();
    println!("Data directories default to data/raw and data/clean; override with");
    println!("AESO_DATA_DIR and AESO_CLEAN_DIR.");
}

fn main() -> Result<()> {
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .unwrap();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--etl" {
        dataset_builder::build_dataset()?;
    } else if args.len() > 1 && args[1] == "--train" {
        let sequential = args.iter().any(|a| a == "--sequential");
        trainer::train_models(sequential)?;
    } else if args.len() > 1 && args[1] == "--all" {
        dataset_builder::build_dataset()?;
        trainer::train_models(false)?;
    } else if args.len() > 1 && args[1] == "--dashboard" {
        let port = if args.len() > 2 {
            args[2].parse().unwrap_or(8080)
        } else {
            8080
        };
        dashboard::serve(port)?;
    } else if args.len() > 1 && args[1] == "--verify-results" {
        verify::verify_artifacts()?;
    } else {
        print_usage();
    }

    Ok(())
}
