// src/main.rs

use appmon::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("appmon: {err:?}");
    }

    if let Err(err) = run(args).await {
        eprintln!("appmon error: {err}");
        std::process::exit(err.exit_code());
    }
}
