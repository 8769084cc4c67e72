//! Read-only experiment dashboard.
//!
//! Lists the runs under an experiment root, shows each run's epoch history
//! and streams its `events.jsonl` live over SSE while training is going on.
//!
//!   cargo run --bin dashboard -- --root experiments
//!
//! Then open http://127.0.0.1:7878

mod handlers;
mod render;
mod routes;
mod state;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tiny_http::Server;
use tracing::{debug, info};

use state::DashboardState;

#[derive(Parser)]
#[command(name = "dashboard", version, about = "Browse captcha-trainer experiment runs")]
struct Cli {
    /// Experiment root written by `captcha-trainer train`.
    #[arg(long, default_value = "experiments")]
    root: PathBuf,
    #[arg(long, default_value = "127.0.0.1:7878")]
    addr: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dashboard=info,captcha_trainer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let server = Server::http(&cli.addr).map_err(|e| anyhow!("failed to bind {}: {}", cli.addr, e))?;
    let state = Arc::new(DashboardState::new(cli.root));
    info!(addr = %cli.addr, root = %state.root().display(), "dashboard listening");

    // One thread per request so a long-lived event stream does not block page loads.
    for request in server.incoming_requests() {
        debug!(method = %request.method(), url = request.url(), "request");
        let state = state.clone();
        std::thread::spawn(move || routes::dispatch(request, state));
    }
    Ok(())
}
