// src/main.rs

use savesync::{cli, load_config, logging, print_dry_run, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("savesync error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let _guard = logging::init_logging(
        args.log_level,
        &cfg.logging.log_dir,
        cfg.logging.retained_logs(),
    )?;
    run(cfg).await?;
    Ok(())
}
