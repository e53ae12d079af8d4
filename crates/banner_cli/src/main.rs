//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `banner_core` linkage, configuration and database bootstrap.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `banner_cli [config.toml]`

use banner_core::db::migrations::current_user_version;
use banner_core::db::open_db;
use banner_core::{init_logging_from_config, load_config, BannerConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("banner_cli error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path).map_err(|err| err.to_string())?,
        None => BannerConfig::default(),
    };

    let logging_enabled = init_logging_from_config(&config.logging)?;
    let conn = open_db(&config.database.path).map_err(|err| err.to_string())?;
    let schema_version = current_user_version(&conn).map_err(|err| err.to_string())?;

    println!("banner_core ping={}", banner_core::ping());
    println!("banner_core version={}", banner_core::core_version());
    println!("database path={}", config.database.path.display());
    println!("database schema_version={schema_version}");
    println!(
        "cache ttl_secs={} capacity={}",
        config.cache.ttl_secs, config.cache.capacity
    );
    println!("logging enabled={logging_enabled}");
    Ok(())
}
