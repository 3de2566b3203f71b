//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Milliseconds between simulation ticks
    pub tick_interval_ms: u64,
    /// Soft cap on concurrently connected sessions
    pub max_players: usize,

    /// Projectile speed in world units per tick
    pub bullet_speed: f64,
    /// Projectile lifetime in ticks
    pub bullet_ttl: i32,

    /// Where new players appear
    pub spawn_position: [f64; 3],
    /// Orientation of new players as a quaternion `[x, y, z, w]`
    pub spawn_rotation: [f64; 4],

    /// Bound of each session's outbound queue (at least 2)
    pub session_queue_capacity: usize,
    /// Inbound messages per second per session (0 disables)
    pub input_rate_limit: u32,

    /// Built client served for any non-API path
    pub static_files_dir: PathBuf,
    /// Allowed client origins for CORS (comma-separated, or `*`)
    pub client_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            tick_interval_ms: 50,
            max_players: 16,
            bullet_speed: 10.0,
            bullet_ttl: 100,
            spawn_position: [0.0, 100.0, 0.0],
            spawn_rotation: [0.0, 0.0, 0.0, 1.0],
            session_queue_capacity: 64,
            input_rate_limit: 120,
            static_files_dir: PathBuf::from("../dist"),
            client_origin: "*".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            tick_interval_ms: parse_var("TICK_INTERVAL_MS", defaults.tick_interval_ms)?,
            max_players: parse_var("MAX_PLAYERS", defaults.max_players)?,

            bullet_speed: parse_var("BULLET_SPEED", defaults.bullet_speed)?,
            bullet_ttl: parse_var("BULLET_TTL", defaults.bullet_ttl)?,

            spawn_position: parse_floats("SPAWN_POSITION", defaults.spawn_position)?,
            spawn_rotation: parse_floats("SPAWN_ROTATION", defaults.spawn_rotation)?,

            session_queue_capacity: parse_var(
                "SESSION_QUEUE_CAPACITY",
                defaults.session_queue_capacity,
            )?,
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", defaults.input_rate_limit)?,

            static_files_dir: env::var("STATIC_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_files_dir),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("TICK_INTERVAL_MS"));
        }
        if self.bullet_ttl <= 0 {
            return Err(ConfigError::OutOfRange("BULLET_TTL"));
        }
        // welcome and the initial state are queued before registration
        if self.session_queue_capacity < 2 {
            return Err(ConfigError::OutOfRange("SESSION_QUEUE_CAPACITY"));
        }
        if !self.bullet_speed.is_finite() {
            return Err(ConfigError::OutOfRange("BULLET_SPEED"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_floats<const N: usize>(
    name: &'static str,
    default: [f64; N],
) -> Result<[f64; N], ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_float_list(&raw).ok_or(ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Parse `"x,y,z"` style lists of exactly `N` finite floats
fn parse_float_list<const N: usize>(raw: &str) -> Option<[f64; N]> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    values.try_into().ok()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),

    #[error("Value out of range for {0}")]
    OutOfRange(&'static str),
}
