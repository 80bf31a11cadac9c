#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use anyhow::{Result, anyhow, bail};

    use crate::runner::{Outcome, Scenario, ScenarioContext, run_scenarios};

    fn passes(_: &ScenarioContext) -> Result<()> {
        Ok(())
    }

    fn fails(_: &ScenarioContext) -> Result<()> {
        Err(anyhow!("router never came up"))
    }

    fn panics(_: &ScenarioContext) -> Result<()> {
        panic!("control plane returned garbage");
    }

    static RENDEZVOUS: AtomicUsize = AtomicUsize::new(0);

    /// Only succeeds if both rendezvous scenarios are running at once.
    fn rendezvous(_: &ScenarioContext) -> Result<()> {
        RENDEZVOUS.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while RENDEZVOUS.load(Ordering::SeqCst) < 2 {
            if Instant::now() > deadline {
                bail!("peer scenario never started");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn scenario(name: &'static str, run: fn(&ScenarioContext) -> Result<()>) -> Scenario {
        Scenario {
            name,
            description: "",
            run,
        }
    }

    #[tokio::test]
    async fn test_all_pass() {
        let scenarios = [scenario("a", passes), scenario("b", passes)];
        let summary = run_scenarios(&scenarios, ScenarioContext::default(), &[]).await;
        assert!(summary.success());
        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.skipped(), 0);
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_failed() {
        let scenarios = [
            scenario("ok", passes),
            scenario("broken", fails),
            scenario("panicky", panics),
        ];
        let summary = run_scenarios(&scenarios, ScenarioContext::default(), &[]).await;
        assert!(!summary.success());
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 2);

        match summary.outcome_of("broken") {
            Some(Outcome::Failed(reason)) => assert!(reason.contains("router never came up")),
            other => panic!("unexpected outcome {other:?}"),
        }
        match summary.outcome_of("panicky") {
            Some(Outcome::Failed(reason)) => {
                assert!(reason.contains("control plane returned garbage"), "{reason}")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_filter_skips_unselected() {
        let scenarios = [scenario("ok", passes), scenario("broken", fails)];
        let filter = vec!["ok".to_string(), "no_such_test".to_string()];
        let summary = run_scenarios(&scenarios, ScenarioContext::default(), &filter).await;

        assert!(summary.success());
        assert_eq!(summary.outcome_of("ok"), Some(&Outcome::Passed));
        assert_eq!(summary.outcome_of("broken"), Some(&Outcome::Skipped));
        assert_eq!(summary.skipped(), 1);
    }

    #[tokio::test]
    async fn test_reports_keep_registry_order() {
        let scenarios = [
            scenario("first", fails),
            scenario("second", passes),
            scenario("third", passes),
        ];
        let filter = vec!["first".to_string(), "third".to_string()];
        let summary = run_scenarios(&scenarios, ScenarioContext::default(), &filter).await;
        let names: Vec<_> = summary.reports.iter().map(|r| r.name).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scenarios_run_concurrently() {
        let scenarios = [
            scenario("left", rendezvous),
            scenario("right", rendezvous),
        ];
        let summary = run_scenarios(&scenarios, ScenarioContext::default(), &[]).await;
        assert_eq!(summary.passed(), 2, "{:?}", summary.reports);
    }

    #[tokio::test]
    async fn test_empty_registry_is_success() {
        let summary = run_scenarios(&[], ScenarioContext::default(), &[]).await;
        assert!(summary.success());
        assert!(summary.reports.is_empty());
    }
}
