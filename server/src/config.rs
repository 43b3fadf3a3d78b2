use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Longest accepted access token lifetime (10 years).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

/// Command-line flags. Only flags actually passed are layered over the file
/// and environment, so nothing here carries a default of its own.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "chatline-server", version, about = "Chatline real-time chat server")]
pub struct Cli {
    /// Port to listen on (default: 8084)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address (default: 0.0.0.0)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./chatline.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// JWT signing secret. Generated into data_dir when not set.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Access token lifetime in hours (default: 168)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl_hours: Option<i64>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,
    /// Push channel tuning (the [push] section in TOML)
    #[serde(default)]
    pub push: PushConfig,
}

/// Buffering, timing and origin policy for live push sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushConfig {
    /// Outbound events buffered per session before new ones are dropped (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deadline for a single event write, in seconds (default: 10)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Interval between server pings, in seconds (default: 25)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Deadline for a single ping, in seconds (default: 5)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Extra origin hosts allowed to open /ws besides the server's own host.
    /// Entries are `host[:port]`; a leading `*.` matches any subdomain.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Accept upgrades from any origin (development only)
    #[serde(default)]
    pub insecure_skip_origin_check: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            write_timeout_secs: 10,
            ping_interval_secs: 25,
            ping_timeout_secs: 5,
            allowed_origins: Vec::new(),
            insecure_skip_origin_check: false,
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

fn default_write_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    25
}

fn default_ping_timeout() -> u64 {
    5
}

impl PushConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    /// Reject values that would make the session runtime spin or never deliver.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("push.queue_capacity must be at least 1".to_string());
        }
        if self.write_timeout_secs == 0 || self.ping_timeout_secs == 0 {
            return Err("push timeouts must be at least 1 second".to_string());
        }
        if self.ping_interval_secs == 0 {
            return Err("push.ping_interval_secs must be at least 1 second".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8084,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            token_ttl_hours: 168,
            push: PushConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATLINE_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("CHATLINE_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            return Err(format!(
                "token_ttl_hours must be between 1 and {}",
                MAX_TOKEN_TTL_HOURS
            ));
        }
        self.push.validate()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chatline Server Configuration
# Place this file at ./chatline.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATLINE_PORT,
# CHATLINE_PUSH__QUEUE_CAPACITY, etc.) or CLI flags (--port, etc.)

# Server port (default: 8084)
# port = 8084

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and generated JWT signing key
# data_dir = "./data"

# JWT signing secret. Leave unset to use a generated key stored in data_dir.
# jwt_secret = "change-me"

# Access token lifetime in hours (default: 168 = 7 days, max: 87600)
# token_ttl_hours = 168

# ---- Push channel (WebSocket /ws) ----
# [push]

# Events buffered per connection. When full, new events are dropped for
# that connection only.
# queue_capacity = 64

# Deadline for writing one event to a connection
# write_timeout_secs = 10

# Server ping interval and per-ping deadline
# ping_interval_secs = 25
# ping_timeout_secs = 5

# Browser origins allowed besides the server's own host, e.g. a dev frontend
# allowed_origins = ["localhost:5173", "*.example.com"]

# Accept any origin. Development only.
# insecure_skip_origin_check = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_toml(dir: &tempfile::TempDir, contents: &str) -> String {
        let path = dir.path().join("chatline.toml");
        std::fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn push_defaults_match_documented_values() {
        let push = PushConfig::default();
        assert_eq!(push.queue_capacity, 64);
        assert_eq!(push.write_timeout(), Duration::from_secs(10));
        assert_eq!(push.ping_interval(), Duration::from_secs(25));
        assert_eq!(push.ping_timeout(), Duration::from_secs(5));
        assert!(push.allowed_origins.is_empty());
        assert!(!push.insecure_skip_origin_check);
        assert!(push.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let push = PushConfig {
            queue_capacity: 0,
            ..PushConfig::default()
        };
        assert!(push.validate().is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        for ttl in [0, -1, MAX_TOKEN_TTL_HOURS + 1, i64::MAX] {
            let config = Config {
                token_ttl_hours: ttl,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "ttl {} should be rejected", ttl);
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn toml_values_survive_when_no_flags_are_passed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            &dir,
            "port = 9000\ndata_dir = \"/srv/chat\"\njson_logs = true\n\n[push]\nqueue_capacity = 8\nallowed_origins = [\"localhost:5173\"]\n",
        );

        let cli = Cli::try_parse_from(["chatline-server", "--config", &path]).unwrap();
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, "/srv/chat");
        assert!(config.json_logs);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.token_ttl_hours, 168);
        assert_eq!(config.push.queue_capacity, 8);
        assert_eq!(config.push.ping_interval_secs, 25);
        assert_eq!(config.push.allowed_origins, vec!["localhost:5173".to_string()]);
    }

    #[test]
    fn flags_override_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(&dir, "port = 9000\ntoken_ttl_hours = 24\n");

        let cli = Cli::try_parse_from([
            "chatline-server",
            "--config",
            &path,
            "--port",
            "9100",
        ])
        .unwrap();
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.token_ttl_hours, 24);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let cli =
            Cli::try_parse_from(["chatline-server", "--config", path.to_str().unwrap()]).unwrap();
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.port, 8084);
        assert_eq!(config.push, PushConfig::default());
    }

    #[test]
    fn invalid_file_values_are_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(&dir, "[push]\nqueue_capacity = 0\n");

        let cli = Cli::try_parse_from(["chatline-server", "--config", &path]).unwrap();
        assert!(Config::load(&cli).is_err());
    }
}
