#![cfg(not(tarpaulin_include))]

use logistica::app;
use logistica::settings::Settings;

/// Main entry point for the web application
///
/// Reads the layered configuration and runs the web server until it stops.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::new()?;
    app::run(settings).await
}
