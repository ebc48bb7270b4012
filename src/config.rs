use crate::reconciler::Rollback;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "lms.yml";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub log_file: PathBuf,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub rollback: Rollback,
    pub serialize_writes: bool,
}

/// Optional `lms.yml`. Every field can also come from the environment.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    username: Option<String>,
    log_file: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    rollback: Option<Rollback>,
    serialize_writes: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let explicit = env::var("LMS_CONFIG").ok().map(PathBuf::from);
        let file = match &explicit {
            Some(path) => read_file_config(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                read_file_config(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, |key| env::var(key).ok())
    }

    fn resolve(file: FileConfig, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = var("LMS_BASE_URL")
            .or(file.base_url)
            .context("LMS_BASE_URL not found. Please set it in .env, lms.yml or the environment")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("LMS_BASE_URL must start with http:// or https://, got {}", base_url);
        }

        let username = var("LMS_USERNAME")
            .or(file.username)
            .context("LMS_USERNAME not found. Please set it in .env, lms.yml or the environment")?;
        if username.is_empty() {
            anyhow::bail!("LMS_USERNAME is empty");
        }

        // Never read from the YAML file
        let password = var("LMS_PASSWORD")
            .context("LMS_PASSWORD not found. Please set it in .env or the environment")?;

        let log_file = var("LMS_LOG_FILE")
            .map(PathBuf::from)
            .or(file.log_file)
            .unwrap_or_else(|| PathBuf::from("lms_desk.log"));

        let request_timeout_secs = match var("LMS_REQUEST_TIMEOUT_SECS") {
            Some(v) => v.parse().context("LMS_REQUEST_TIMEOUT_SECS must be a number")?,
            None => file.request_timeout_secs.unwrap_or(120),
        };
        let connect_timeout_secs = match var("LMS_CONNECT_TIMEOUT_SECS") {
            Some(v) => v.parse().context("LMS_CONNECT_TIMEOUT_SECS must be a number")?,
            None => file.connect_timeout_secs.unwrap_or(30),
        };

        let rollback = match var("LMS_ROLLBACK") {
            Some(v) => v.parse().map_err(anyhow::Error::msg)?,
            None => file.rollback.unwrap_or_default(),
        };
        let serialize_writes = match var("LMS_SERIALIZE_WRITES") {
            Some(v) => v
                .parse()
                .context("LMS_SERIALIZE_WRITES must be true or false")?,
            None => file.serialize_writes.unwrap_or(true),
        };

        Ok(Config {
            base_url,
            username,
            password,
            log_file,
            request_timeout_secs,
            connect_timeout_secs,
            rollback,
            serialize_writes,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
