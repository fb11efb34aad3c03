// src/config.rs

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_dbpath() -> PathBuf {
    PathBuf::from("./data")
}

fn default_slow_ms() -> i64 {
    100
}

fn default_diaglog_level() -> i32 {
    0
}

fn default_profiling_level() -> i32 {
    0
}

fn default_profiling_threshold_ms() -> i64 {
    100
}

fn default_max_clients() -> usize {
    20_000
}

fn default_getmore_poll_ms() -> u64 {
    2
}

fn default_oplog_wait_timeout_ms() -> u64 {
    4_000
}

fn default_getmore_overall_timeout_ms() -> u64 {
    4_000
}

/// Server configuration, loaded from a TOML file with environment overrides
/// (`CORVUSDB_*`), following the same `config` crate layering the teacher
/// uses for its own settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_dbpath")]
    pub dbpath: PathBuf,

    /// Operations slower than this are logged unconditionally, regardless
    /// of `shouldLog`-equivalent flags raised during dispatch.
    #[serde(default = "default_slow_ms")]
    pub slow_ms: i64,

    /// Bit 0 = write ops, bit 1 = read ops, matching the original two-bit
    /// diag-log gating.
    #[serde(default = "default_diaglog_level")]
    pub diaglog_level: i32,

    #[serde(default = "default_profiling_level")]
    pub profiling_level: i32,

    #[serde(default = "default_profiling_threshold_ms")]
    pub profiling_threshold_ms: i64,

    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Sleep interval for the non-oplog get-more poll loop (2ms in
    /// production builds, typically raised for debug/test).
    #[serde(default = "default_getmore_poll_ms")]
    pub getmore_poll_ms: u64,

    /// Timeout for a single oplog-tailing wait-for-advance call.
    #[serde(default = "default_oplog_wait_timeout_ms")]
    pub oplog_wait_timeout_ms: u64,

    /// Overall time budget for a single get-more call before returning an
    /// empty batch with the cursor still alive.
    #[serde(default = "default_getmore_overall_timeout_ms")]
    pub getmore_overall_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: default_bind(),
            port: default_port(),
            dbpath: default_dbpath(),
            slow_ms: default_slow_ms(),
            diaglog_level: default_diaglog_level(),
            profiling_level: default_profiling_level(),
            profiling_threshold_ms: default_profiling_threshold_ms(),
            max_clients: default_max_clients(),
            getmore_poll_ms: default_getmore_poll_ms(),
            oplog_wait_timeout_ms: default_oplog_wait_timeout_ms(),
            getmore_overall_timeout_ms: default_getmore_overall_timeout_ms(),
        }
    }
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("CORVUSDB").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn getmore_poll_interval(&self) -> Duration {
        Duration::from_millis(self.getmore_poll_ms)
    }

    pub fn oplog_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.oplog_wait_timeout_ms)
    }

    pub fn getmore_overall_timeout(&self) -> Duration {
        Duration::from_millis(self.getmore_overall_timeout_ms)
    }
}
