use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Data, Env, Format, Serialized, Toml},
    value::Dict,
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Presence server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "presence-server", version, about = "Real-time presence server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "WS_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PRESENCE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// URL path the WebSocket endpoint is served under
    #[arg(long, env = "PRESENCE_SOCKET_PATH", default_value = "/api/socket")]
    pub socket_path: String,

    /// Redis host for presence records and login/logout channels
    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    /// Redis port
    #[arg(long, env = "REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Lifetime of a presence record in seconds (at least 1)
    #[arg(long, env = "PRESENCE_TTL_SECS", default_value = "86400")]
    pub presence_ttl_secs: u64,

    /// How often a connected user's record TTL is re-armed, in seconds (0 = never)
    #[arg(long, env = "PRESENCE_REFRESH_INTERVAL_SECS", default_value = "3600")]
    pub refresh_interval_secs: u64,

    /// Path to TOML config file
    #[arg(long, default_value = "./presence.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PRESENCE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            socket_path: "/api/socket".to_string(),
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            presence_ttl_secs: 86400,
            refresh_interval_secs: 3600,
            config: "./presence.toml".to_string(),
            json_logs: false,
            generate_config: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PRESENCE_*) < CLI args
    pub fn load() -> Result<Self, ConfigError> {
        let matches = Config::command().get_matches();
        let cli = Config::from_arg_matches(&matches)?;
        let toml = Toml::file(&cli.config);
        Self::resolve(&cli, &matches, toml)
    }

    fn resolve(cli: &Config, matches: &ArgMatches, toml: Data<Toml>) -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(toml)
            .merge(Env::prefixed("PRESENCE_"))
            .merge(Serialized::defaults(explicit_args(cli, matches)?))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presence_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "presence_ttl_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

/// CLI values the user actually supplied, by flag or through the flag's env var.
/// Clap defaults are left out so they cannot shadow the TOML layer.
fn explicit_args(cli: &Config, matches: &ArgMatches) -> Result<Dict, ConfigError> {
    let all: Dict = Figment::from(Serialized::defaults(cli)).extract()?;
    Ok(all
        .into_iter()
        .filter(|(name, _)| {
            matches!(
                matches.value_source(name),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        })
        .collect())
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Presence Server Configuration
# Place this file at ./presence.toml or specify with --config <path>
# All settings can be overridden via environment variables (PRESENCE_*,
# plus WS_PORT, REDIS_HOST, REDIS_PORT) or CLI flags (--port, etc.)

# Port for the WebSocket server (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# URL path the WebSocket endpoint is served under
# socket_path = "/api/socket"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Redis (shared presence store) ----
# redis_host = "127.0.0.1"
# redis_port = 6379

# ---- Presence ----
# Presence record lifetime in seconds, at least 1 (default: 86400 = 24 hours)
# presence_ttl_secs = 86400

# Re-arm a connected user's record TTL this often, in seconds.
# 0 disables refresh; records then expire presence_ttl_secs after registration.
# refresh_interval_secs = 3600
"#
    .to_string()
}
