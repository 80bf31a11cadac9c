//! vortices: NAT traversal test harness.
//!
//! Builds disposable container topologies with [`compose_sim`], drives the
//! computers in them through their HTTP control plane and reports which
//! scenarios passed.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod control;
pub mod runner;
pub mod scenarios;

#[cfg(test)]
pub mod tests;

pub use config::HarnessConfig;
pub use control::{Candidate, ControlClient};
pub use runner::{
    Images, Outcome, RunSummary, Scenario, ScenarioContext, ScenarioReport, run_scenarios,
    run_tests,
};
pub use scenarios::REGISTRY;
