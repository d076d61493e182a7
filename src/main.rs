// src/main.rs

use filejobrouter::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("filejobrouter error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> filejobrouter::errors::Result<()> {
    let args = cli::parse();
    run(args).await
}
