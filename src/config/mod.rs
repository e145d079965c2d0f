//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::damage::MIN_ROLLS_ALLOWED;
use crate::game::RaceSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,

    /// Rules every hosted race runs with
    pub race: RaceSettings,
    /// Fixed seed for reproducible races; random per race when unset
    pub race_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
        };

        let defaults = RaceSettings::default();
        let race = RaceSettings {
            max_legs: parse_or(&lookup, "MAX_LEGS", defaults.max_legs)?,
            leg_time_secs: parse_or(&lookup, "LEG_TIME_SECS", defaults.leg_time_secs)?,
            checkpoint_secs: parse_or(&lookup, "CHECKPOINT_SECS", defaults.checkpoint_secs)?,
            starting_rolls: parse_or(&lookup, "STARTING_ROLLS", defaults.starting_rolls)?,
        };
        if race.max_legs == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_LEGS",
                value: "0".to_string(),
            });
        }
        if race.starting_rolls < MIN_ROLLS_ALLOWED {
            return Err(ConfigError::Invalid {
                key: "STARTING_ROLLS",
                value: race.starting_rolls.to_string(),
            });
        }

        let race_seed = match lookup("RACE_SEED") {
            Some(raw) => Some(parse_value("RACE_SEED", &raw)?),
            None => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            race,
            race_seed,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,
}
