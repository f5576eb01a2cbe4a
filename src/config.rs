use dotenvy::dotenv;
use eyre::{eyre, Result};
use std::{env, net::IpAddr, time::Duration};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,    // transaction store (SQLite file)
    pub bind_addr: IpAddr,
    pub port: u16,
    pub webhost: Option<String>, // allowed CORS origin, None = any
    pub static_dir: String,
    pub query_timeout: Duration,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // load from .env file if present

    let database_url = var_or("DATABASE_URL", "catapult.db");

    let bind_addr = var_or("BIND_ADDR", "127.0.0.1")
        .parse()
        .map_err(|e| eyre!("invalid BIND_ADDR: {}", e))?;

    let port = var_or("PORT", "5000")
        .parse()
        .map_err(|e| eyre!("invalid PORT: {}", e))?;

    let webhost = env::var("WEBHOST")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let static_dir = var_or("STATIC_DIR", "html/public");

    let query_timeout_secs: u64 = var_or("QUERY_TIMEOUT_SECS", "30")
        .parse()
        .map_err(|e| eyre!("invalid QUERY_TIMEOUT_SECS: {}", e))?;

    let cfg = Config {
        database_url,
        bind_addr,
        port,
        webhost,
        static_dir,
        query_timeout: Duration::from_secs(query_timeout_secs),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
