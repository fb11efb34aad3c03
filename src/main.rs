// src/main.rs

use anyhow::Result;
use corvusdb::config::Config;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{filter::EnvFilter, reload};

fn parse_args() -> (Option<PathBuf>, bool) {
    let mut config_path = None;
    let mut show_version = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-v" => show_version = true,
            "--config" | "-f" => config_path = args.next().map(PathBuf::from),
            _ => {}
        }
    }
    (config_path, show_version)
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, show_version) = parse_args();

    if show_version {
        println!("corvusdb {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, _reload_handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    let config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    let collaborators = corvusdb::testutil::in_memory_collaborators();
    corvusdb::server::run(config, collaborators).await
}
