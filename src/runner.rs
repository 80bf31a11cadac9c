//! Concurrent scenario runner.
//!
//! Every registered scenario gets its own task; the selected ones execute on
//! the blocking pool since they drive external processes. Reports come back
//! over an unbounded channel and are returned in registry order.

use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::control::ControlClient;

pub type ScenarioFn = fn(&ScenarioContext) -> Result<()>;

/// A named, self-contained test: builds its topology, exercises it and
/// tears it down.
#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub run: ScenarioFn,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

/// Image ids built before the run.
#[derive(Debug, Clone, Default)]
pub struct Images {
    /// Image under test, serving the control plane.
    pub target: String,
    pub router: String,
}

/// Everything a scenario body needs, shared read-only between scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScenarioContext {
    pub images: Images,
    pub config: HarnessConfig,
}

impl ScenarioContext {
    /// Control-plane client for a computer reachable at `ip`.
    pub fn control(&self, ip: IpAddr) -> Result<ControlClient> {
        ControlClient::new(ip, self.config.control_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| *o == Outcome::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == Outcome::Skipped)
    }

    /// `true` iff no executed scenario failed.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome_of(&self, name: &str) -> Option<&Outcome> {
        self.reports
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }
}

/// Run `scenarios` concurrently. An empty `filter` selects all of them.
pub async fn run_scenarios(
    scenarios: &[Scenario],
    ctx: ScenarioContext,
    filter: &[String],
) -> RunSummary {
    for name in filter {
        if !scenarios.iter().any(|s| s.name == name) {
            warn!(test = %name, "no such test");
        }
    }

    let ctx = Arc::new(ctx);
    let (tx, mut rx) = unbounded_channel::<(usize, ScenarioReport)>();

    for (index, scenario) in scenarios.iter().copied().enumerate() {
        let selected = filter.is_empty() || filter.iter().any(|f| f == scenario.name);
        let tx = tx.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let report = if selected {
                execute(scenario, ctx).await
            } else {
                info!("skipping test {}", scenario.name);
                ScenarioReport {
                    name: scenario.name,
                    outcome: Outcome::Skipped,
                    elapsed: Duration::ZERO,
                }
            };
            let _ = tx.send((index, report));
        });
    }
    drop(tx);

    let mut reports = Vec::with_capacity(scenarios.len());
    while let Some(entry) = rx.recv().await {
        reports.push(entry);
    }
    reports.sort_by_key(|(index, _)| *index);

    let summary = RunSummary {
        reports: reports.into_iter().map(|(_, report)| report).collect(),
    };
    info!(
        passed = summary.passed(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        "test run complete"
    );
    summary
}

/// Run the built-in scenarios; `true` iff all selected ones passed.
pub async fn run_tests(ctx: ScenarioContext, filter: &[String]) -> bool {
    run_scenarios(crate::scenarios::REGISTRY, ctx, filter)
        .await
        .success()
}

async fn execute(scenario: Scenario, ctx: Arc<ScenarioContext>) -> ScenarioReport {
    info!("running test {}", scenario.name);
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || (scenario.run)(&ctx)).await;
    let elapsed = started.elapsed();

    let outcome = match joined {
        Ok(Ok(())) => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "finished OK test {}", scenario.name);
            Outcome::Passed
        }
        Ok(Err(err)) => {
            warn!("test {} failed: {err:#}", scenario.name);
            Outcome::Failed(format!("{err:#}"))
        }
        Err(join) => {
            let reason = if join.is_panic() {
                format!("panicked: {}", panic_message(join.into_panic()))
            } else {
                "cancelled".to_string()
            };
            warn!("test {} failed: {reason}", scenario.name);
            Outcome::Failed(reason)
        }
    };
    ScenarioReport {
        name: scenario.name,
        outcome,
        elapsed,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
