use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Paths
    pub downloads_dir: PathBuf,
    pub temp_dir: PathBuf,

    // Limits
    pub max_file_size: u64,

    // HTTP
    pub host: String,
    pub port: u16,

    // Performance
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            downloads_dir: std::env::var("DOWNLOADS_DIR")
                .unwrap_or_else(|_| "./downloads".to_string())
                .into(),
            temp_dir: std::env::var("TEMP_DIR")
                .unwrap_or_else(|_| "./temp".to_string())
                .into(),
            max_file_size: std::env::var("MAX_FILE_SIZE")
                .unwrap_or_else(|_| "157286400".to_string()) // 150MB
                .parse()?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8001".to_string())
                .parse()?,
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.downloads_dir)?;
        std::fs::create_dir_all(&config.temp_dir)?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            anyhow::bail!("Max file size must be greater than 0");
        }

        if self.port == 0 {
            anyhow::bail!("Port must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Listen: {}:{}\n  \
            Downloads: {} (max {} MB per file)\n  \
            Temp: {}\n  \
            Workers: {} threads",
            self.host,
            self.port,
            self.downloads_dir.display(),
            self.max_file_size / 1024 / 1024,
            self.temp_dir.display(),
            self.worker_threads,
        )
    }
}

/// Default configuration values, used as fallbacks when environment
/// variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            downloads_dir: "./downloads".into(),
            temp_dir: "./temp".into(),
            max_file_size: 157_286_400, // 150MB
            host: "127.0.0.1".to_string(),
            port: 8001,
            worker_threads: num_cpus::get(),
        }
    }
}
