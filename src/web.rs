#![cfg(not(tarpaulin_include))]

use labgroups::app;
use labgroups::config::Config;

/// Web server entry point.
///
/// Configuration comes from `LABGROUPS_CONFIG` (default `labgroups.json`)
/// and `LABGROUPS_*` environment overrides; log level from `RUST_LOG`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
