//! Shared utilities for integration tests.
#![allow(dead_code)]

use compose_sim::{EnvironmentConfig, check_compose, check_docker};
use vortices::HarnessConfig;

/// Harness config from the process environment, with scratch state under
/// `scratch_root`.
pub fn environment_config(scratch_root: &std::path::Path) -> EnvironmentConfig {
    let mut config = HarnessConfig::from_env()
        .expect("VORTICES_* environment")
        .environment;
    config.scratch_root = scratch_root.to_path_buf();
    config
}

/// Returns `true` if docker or compose is unavailable (prints the reason to
/// stderr). Use at the top of every test.
pub fn skip_without_docker() -> bool {
    let config = HarnessConfig::from_env().map(|c| c.environment).unwrap_or_default();
    if !check_docker(&config.docker) {
        eprintln!("Skipping: `{} info` failed", config.docker);
        return true;
    }
    if !check_compose(&config.compose) {
        eprintln!("Skipping: `{} version` failed", config.compose.join(" "));
        return true;
    }
    false
}
