// src/main.rs

use binwatch::config::load_with_overrides;
use binwatch::{cli, logging, run_with_config};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("binwatch error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_with_overrides(&args)?;
    logging::init_logging(args.log_level, cfg.watch.verbose)?;
    run_with_config(&args, cfg).await
}
