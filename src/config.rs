//! Layered engine configuration.
//!
//! Precedence, lowest to highest: built-in defaults, JSON config file,
//! `DEPTHCAST_*` environment overrides, CLI flags (applied in `main`).
//! Malformed or out-of-range env values are warned about and ignored;
//! structural problems (a capacity that cannot back the ring, a privileged
//! port) are fatal at startup.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Lowercase venue symbol for the stream subscription.
    pub symbol: String,
    pub ws_host: String,
    pub ws_port: u16,
    pub rest_host: String,
    pub rest_port: u16,
    pub reconnect_delay_initial_ms: u64,
    pub reconnect_delay_max_ms: u64,
    pub reconnect_backoff_multiplier: f64,
    pub reconnect_jitter_factor: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            symbol: "btcusdt".to_string(),
            ws_host: "fstream.binance.com".to_string(),
            ws_port: 443,
            rest_host: "fapi.binance.com".to_string(),
            rest_port: 443,
            reconnect_delay_initial_ms: 1000,
            reconnect_delay_max_ms: 30_000,
            reconnect_backoff_multiplier: 2.0,
            reconnect_jitter_factor: 0.3,
        }
    }
}

impl NetworkConfig {
    pub fn reconnect_delay_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_initial_ms)
    }

    pub fn reconnect_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_max_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Event ring capacity; must be a power of two.
    pub queue_capacity: usize,
    /// Rolling VWAP window, in trades.
    pub vwap_window: usize,
    /// Alert threshold in standard deviations of trade size.
    pub large_trade_std_devs: f64,
    /// Price levels requested in the REST snapshot (venue max 1000).
    pub depth_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 65_536,
            vwap_window: 100,
            large_trade_std_devs: 2.0,
            depth_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub metrics_interval_ms: u64,
    pub ws_server_port: u16,
    /// Depth levels per side feeding the imbalance figure.
    pub imbalance_levels: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: 500,
            ws_server_port: 9001,
            imbalance_levels: 10,
        }
    }
}

impl OutputConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load with full precedence below the CLI: defaults, then the optional
    /// JSON file, then environment overrides. A missing or malformed file
    /// logs a warning and falls back — env overrides still apply.
    pub fn load(path: Option<&Path>) -> Config {
        let mut config = match path {
            Some(p) => match Self::load_from_file(p) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "config_file_ignored");
                    Config::default()
                }
            },
            None => Config::default(),
        };
        config.apply_env_overrides();
        config
    }

    pub fn load_from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse config file {}", path.display()))
    }

    /// `DEPTHCAST_*` environment overrides: parse, range check, warn and
    /// keep the old value on anything off.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string("DEPTHCAST_SYMBOL") {
            self.network.symbol = v.to_lowercase();
        }
        if let Some(v) = env_string("DEPTHCAST_WS_HOST") {
            self.network.ws_host = v;
        }
        if let Some(v) = env_u64("DEPTHCAST_WS_PORT", 1, 65_535) {
            self.network.ws_port = v as u16;
        }
        if let Some(v) = env_string("DEPTHCAST_REST_HOST") {
            self.network.rest_host = v;
        }
        if let Some(v) = env_u64("DEPTHCAST_REST_PORT", 1, 65_535) {
            self.network.rest_port = v as u16;
        }
        if let Some(v) = env_u64("DEPTHCAST_RECONNECT_DELAY_INITIAL_MS", 100, 300_000) {
            self.network.reconnect_delay_initial_ms = v;
        }
        if let Some(v) = env_u64("DEPTHCAST_RECONNECT_DELAY_MAX_MS", 1000, 600_000) {
            self.network.reconnect_delay_max_ms = v;
        }
        if let Some(v) = env_f64("DEPTHCAST_RECONNECT_BACKOFF_MULTIPLIER") {
            if v > 0.0 && v <= 10.0 {
                self.network.reconnect_backoff_multiplier = v;
            } else {
                warn!(value = v, "env_backoff_multiplier_out_of_range");
            }
        }
        if let Some(v) = env_f64("DEPTHCAST_RECONNECT_JITTER_FACTOR") {
            if (0.0..=1.0).contains(&v) {
                self.network.reconnect_jitter_factor = v;
            } else {
                warn!(value = v, "env_jitter_factor_out_of_range");
            }
        }
        if let Some(v) = env_u64("DEPTHCAST_QUEUE_CAPACITY", 2, 1_048_576) {
            self.engine.queue_capacity = v as usize;
        }
        if let Some(v) = env_u64("DEPTHCAST_VWAP_WINDOW", 1, 100_000) {
            self.engine.vwap_window = v as usize;
        }
        if let Some(v) = env_f64("DEPTHCAST_LARGE_TRADE_STD_DEVS") {
            if v > 0.0 {
                self.engine.large_trade_std_devs = v;
            } else {
                warn!(value = v, "env_std_devs_out_of_range");
            }
        }
        if let Some(v) = env_u64("DEPTHCAST_DEPTH_LIMIT", 1, 1000) {
            self.engine.depth_limit = v as usize;
        }
        if let Some(v) = env_u64("DEPTHCAST_METRICS_INTERVAL_MS", 100, 60_000) {
            self.output.metrics_interval_ms = v;
        }
        if let Some(v) = env_u64("DEPTHCAST_WS_SERVER_PORT", 1024, 65_535) {
            self.output.ws_server_port = v as u16;
        }
        if let Some(v) = env_u64("DEPTHCAST_IMBALANCE_LEVELS", 1, 100) {
            self.output.imbalance_levels = v as usize;
        }
    }

    /// Structural checks that make startup fail fast rather than the engine
    /// misbehave later.
    pub fn validate(&self) -> Result<()> {
        if !self.engine.queue_capacity.is_power_of_two() {
            bail!(
                "engine.queue_capacity must be a power of two, got {}",
                self.engine.queue_capacity
            );
        }
        if self.engine.vwap_window == 0 {
            bail!("engine.vwap_window must be at least 1");
        }
        if self.engine.depth_limit == 0 || self.engine.depth_limit > 1000 {
            bail!(
                "engine.depth_limit must be in 1..=1000, got {}",
                self.engine.depth_limit
            );
        }
        if !(0.0..=1.0).contains(&self.network.reconnect_jitter_factor) {
            bail!(
                "network.reconnect_jitter_factor must be in [0, 1], got {}",
                self.network.reconnect_jitter_factor
            );
        }
        if self.network.reconnect_backoff_multiplier <= 0.0 {
            bail!("network.reconnect_backoff_multiplier must be positive");
        }
        if self.output.ws_server_port < 1024 {
            bail!(
                "output.ws_server_port must be an unprivileged port (>= 1024), got {}",
                self.output.ws_server_port
            );
        }
        if self.output.imbalance_levels == 0 {
            bail!("output.imbalance_levels must be at least 1");
        }
        if self.network.symbol.is_empty() {
            bail!("network.symbol must not be empty");
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(v) if (min..=max).contains(&v) => Some(v),
        Ok(v) => {
            warn!(name, value = v, min, max, "env_value_out_of_range");
            None
        }
        Err(_) => {
            warn!(name, value = %raw, "env_value_not_an_integer");
            None
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %raw, "env_value_not_a_number");
            None
        }
    }
}
