mod cli;
mod client;
mod config;
mod logging;
mod model;
mod orchestrator;
mod reconcile;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.is_headless();

    match cli::run(args).await {
        Ok(()) => {
            // Exit explicitly in headless modes so lingering blocking tasks
            // (stdin prompts, clipboard threads) cannot hold the process open.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_non_tui {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
