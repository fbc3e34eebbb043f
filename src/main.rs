// src/main.rs

use autodeploy::engine::context::LOG_DIR;
use autodeploy::{cli, logging, resolve_project_root, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("autodeploy error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    let log_dir = resolve_project_root(&args)?.join(LOG_DIR);
    let _guard = logging::init_logging(args.log_level, args.verbose, Some(&log_dir))?;
    run(args).await
}
