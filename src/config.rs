//! Harness configuration.
//!
//! Defaults, overridden by `VORTICES_*` environment variables, overridden in
//! turn by CLI flags in `main`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use compose_sim::EnvironmentConfig;

/// Port the computer control plane listens on.
pub const DEFAULT_CONTROL_PORT: u16 = 8080;

/// How many times to poll the ICE connection state before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const ENV_DOCKER: &str = "VORTICES_DOCKER";
pub const ENV_COMPOSE: &str = "VORTICES_COMPOSE";
pub const ENV_SCRATCH_DIR: &str = "VORTICES_SCRATCH_DIR";
pub const ENV_CAPTURE: &str = "VORTICES_CAPTURE";
pub const ENV_KEEP_SCRATCH: &str = "VORTICES_KEEP_SCRATCH";

/// Settings shared by every scenario of one run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub environment: EnvironmentConfig,
    pub control_port: u16,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            control_port: DEFAULT_CONTROL_PORT,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl HarnessConfig {
    /// Defaults with the process environment applied.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides taken from `lookup`. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let env = &mut config.environment;

        if let Some(docker) = get(ENV_DOCKER) {
            env.docker = docker.trim().to_string();
        }
        if let Some(compose) = get(ENV_COMPOSE) {
            env.compose = compose.split_whitespace().map(str::to_string).collect();
        }
        if let Some(dir) = get(ENV_SCRATCH_DIR) {
            env.scratch_root = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_CAPTURE) {
            env.capture = parse_flag(ENV_CAPTURE, &raw)?;
        }
        if let Some(raw) = get(ENV_KEEP_SCRATCH) {
            env.keep_scratch = parse_flag(ENV_KEEP_SCRATCH, &raw)?;
        }
        Ok(config)
    }
}

/// Parse a boolean toggle, accepting the usual spellings.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key}: expected a boolean, got '{other}'"),
    }
}
