use fleetline_core::schedule::{
    SchedulingRules, DEFAULT_CLOCK_OFFSET_MINUTES, DEFAULT_GRACE_WINDOW_MINUTES,
    DEFAULT_LEAD_TIME_MINUTES,
};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    pub gateway_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_push_timeout")]
    pub timeout_seconds: u64,
}

/// Clock skew, lead time, grace window and the reconciler cadence.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulingConfig {
    #[serde(default = "default_clock_offset")]
    pub clock_offset_minutes: i64,
    #[serde(default = "default_lead_time")]
    pub lead_time_minutes: i64,
    #[serde(default = "default_grace_window")]
    pub grace_window_minutes: i64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_push_timeout() -> u64 { 5 }
fn default_clock_offset() -> i64 { DEFAULT_CLOCK_OFFSET_MINUTES }
fn default_lead_time() -> i64 { DEFAULT_LEAD_TIME_MINUTES }
fn default_grace_window() -> i64 { DEFAULT_GRACE_WINDOW_MINUTES }
fn default_reconcile_interval() -> u64 { 60 }
fn default_reconcile_timeout() -> u64 { 30 }

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            clock_offset_minutes: default_clock_offset(),
            lead_time_minutes: default_lead_time(),
            grace_window_minutes: default_grace_window(),
            reconcile_interval_seconds: default_reconcile_interval(),
            reconcile_timeout_seconds: default_reconcile_timeout(),
        }
    }
}

impl SchedulingConfig {
    pub fn rules(&self) -> SchedulingRules {
        SchedulingRules::from_minutes(
            self.clock_offset_minutes,
            self.lead_time_minutes,
            self.grace_window_minutes,
        )
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_seconds.max(1))
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_seconds.max(1))
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `FLEETLINE_SCHEDULING__GRACE_WINDOW_MINUTES=10`
            .add_source(config::Environment::with_prefix("FLEETLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
