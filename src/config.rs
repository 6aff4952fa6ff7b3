use std::net::SocketAddr;
use std::path::PathBuf;
use anyhow::{Context, Result};
use dotenvy::dotenv;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: String,
    pub upload_dir: PathBuf,
    pub max_file_size: usize,
    pub admin_email: Option<String>,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let bind_addr = env_or("BIND_ADDR", "127.0.0.1:5000")
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let max_file_size = match std::env::var("MAX_FILE_SIZE") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("MAX_FILE_SIZE must be a byte count, got {raw:?}"))?,
            Err(_) => default_max_file_size(),
        };

        let admin_email = std::env::var("ADMIN_EMAIL")
            .ok()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        Ok(Config {
            bind_addr,
            database_path: env_or("DATABASE_PATH", "excel_analytics.db"),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            max_file_size,
            admin_email,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn load_config() -> Result<Config> {
    Config::new()
}
