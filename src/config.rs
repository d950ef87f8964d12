use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration, loaded from `config.yaml`.
///
/// Only deployment-specific values live here (URLs, paths, timezone,
/// listen address). Algorithm constants are owned by the modules that
/// use them.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP endpoint serving the GTFS-RT vehicle positions protobuf.
    pub vehicle_positions_url: String,

    /// Directory holding the unpacked static GTFS feed (stops.txt, ...).
    #[serde(default = "Config::default_gtfs_dir")]
    pub gtfs_dir: String,

    /// CSV file the arrival observer appends to.
    #[serde(default = "Config::default_arrival_log")]
    pub arrival_log: String,

    /// Address the HTTP server binds to.
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,

    /// IANA timezone of the transit agency. Schedule times and the
    /// service-day rollover are interpreted in this zone.
    #[serde(default = "Config::default_timezone")]
    pub timezone: String,

    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

impl Config {
    fn default_gtfs_dir() -> String {
        "gtfs_static".to_string()
    }

    fn default_arrival_log() -> String {
        "arrival_log.csv".to_string()
    }

    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }

    fn default_timezone() -> String {
        "Europe/Sofia".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check values that would otherwise only fail deep inside the boot
    /// sequence. Called once from `main` before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicle_positions_url.is_empty() {
            return Err(ConfigError::Invalid(
                "vehicle_positions_url must not be empty".to_string(),
            ));
        }
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))?;
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind_addr '{}'", self.bind_addr)))?;
        Ok(())
    }

    /// The configured timezone. Call after `validate()`.
    pub fn parsed_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Tz::UTC)
    }

    /// Where the synthesised stop-times table is written, next to the
    /// static feed it was derived from.
    pub fn realistic_stop_times_path(&self) -> PathBuf {
        Path::new(&self.gtfs_dir).join("realistic_stop_times.txt")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
