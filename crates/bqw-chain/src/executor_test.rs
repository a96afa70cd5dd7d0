use super::*;
use crate::planner::plan;
use crate::snapshot::ChainSnapshot;
use crate::spec::ChainSpec;
use crate::test_utils::ScriptedWarehouse;
use bqw_db::{DbError, TableKind};
use std::sync::Mutex;
use std::time::Duration;

fn policy() -> RetryPolicy {
    RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(2),
        Duration::from_secs(5),
    )
}

fn chain(names: &[&str], force: bool) -> ChainSpec {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    ChainSpec::parse(&names, None, None, force).unwrap()
}

async fn run_with(
    wh: &Arc<ScriptedWarehouse>,
    spec: &ChainSpec,
    executor: ChainExecutor,
) -> ChainResult {
    let snapshot = ChainSnapshot::capture(spec, wh.as_ref(), &policy())
        .await
        .unwrap();
    let plan = plan(spec, &snapshot).unwrap();
    executor.execute(&plan, spec.force()).await
}

async fn run(wh: &Arc<ScriptedWarehouse>, spec: &ChainSpec) -> ChainResult {
    let executor = ChainExecutor::new(wh.clone(), policy()).with_concurrency(4);
    run_with(wh, spec, executor).await
}

fn outcomes(result: &ChainResult) -> Vec<(String, Outcome)> {
    result
        .outcomes
        .iter()
        .map(|o| {
            (
                o.target_dataset.table_path(&o.table_name),
                o.outcome.clone(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_three_dataset_chain() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["t1", "t2"])
            .with_dataset("staging", &[])
            .with_dataset("mart", &[]),
    );
    let result = run(&wh, &chain(&["raw", "staging", "mart"], false)).await;

    assert_eq!(
        outcomes(&result),
        vec![
            ("staging.t1".to_string(), Outcome::Created),
            ("staging.t2".to_string(), Outcome::Created),
            ("mart.t1".to_string(), Outcome::Created),
            ("mart.t2".to_string(), Outcome::Created),
        ]
    );
    assert!(!result.has_failures());
    assert_eq!(
        wh.relations("mart"),
        vec![
            ("t1".to_string(), TableKind::View),
            ("t2".to_string(), TableKind::View)
        ]
    );
    assert!(result.finished_at.is_some());
}

#[tokio::test]
async fn test_hops_run_in_order() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a", "b", "c"])
            .with_dataset("staging", &[])
            .with_dataset("mart", &[]),
    );
    run(&wh, &chain(&["raw", "staging", "mart"], false)).await;

    let calls = wh.view_calls();
    let last_staging = calls.iter().rposition(|c| c.starts_with("staging.")).unwrap();
    let first_mart = calls.iter().position(|c| c.starts_with("mart.")).unwrap();
    assert!(last_staging < first_mart);
}

#[tokio::test]
async fn test_rerun_reports_updated() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["t1", "t2"])
            .with_dataset("staging", &[])
            .with_dataset("mart", &[]),
    );
    let spec = chain(&["raw", "staging", "mart"], false);
    let first = run(&wh, &spec).await;
    assert_eq!(first.summary.created, 4);

    let second = run(&wh, &spec).await;
    assert_eq!(second.summary.updated, 4);
    assert!(second.outcomes.iter().all(|o| o.outcome == Outcome::Updated));
}

#[tokio::test]
async fn test_force_creates_missing_dataset() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["t1"])
            .with_dataset("mart", &[]),
    );
    let executor = ChainExecutor::new(wh.clone(), policy()).with_location("EU");
    let result = run_with(&wh, &chain(&["raw", "staging", "mart"], true), executor).await;

    assert!(wh.has_dataset("staging"));
    assert_eq!(wh.create_calls(), vec!["staging"]);
    assert_eq!(result.datasets.len(), 1);
    assert_eq!(result.datasets[0].kind, DatasetEventKind::Created);
    assert_eq!(result.summary.created, 2);
}

#[tokio::test]
async fn test_creation_failure_skips_hop_and_downstream() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["t1", "t2"])
            .with_dataset("mart", &["t1"]),
    );
    wh.fail_create_dataset(
        "staging",
        vec![DbError::Api {
            status: 403,
            message: "Access Denied".into(),
        }],
    );
    let result = run(&wh, &chain(&["raw", "staging", "mart"], true)).await;

    assert_eq!(result.outcomes.len(), 4);
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.outcome == Outcome::SkippedDatasetMissing));
    assert!(!result.has_failures());
    assert!(wh.view_calls().is_empty());
    assert!(matches!(
        result.datasets[0].kind,
        DatasetEventKind::CreationFailed(ref reason)
            if reason.contains("C003") && reason.contains("Access Denied")
    ));
}

#[tokio::test]
async fn test_creation_retried_on_transient_error() {
    let wh = Arc::new(ScriptedWarehouse::new().with_dataset("raw", &["t1"]));
    wh.fail_create_dataset("staging", vec![DbError::Unavailable("503".into())]);
    let result = run(&wh, &chain(&["raw", "staging"], true)).await;

    assert_eq!(wh.create_calls().len(), 2);
    assert_eq!(result.summary.created, 1);
}

#[tokio::test]
async fn test_missing_target_without_force_is_skipped() {
    // Planning rejects this case; hand-build a plan to exercise the executor.
    let wh = Arc::new(ScriptedWarehouse::new().with_dataset("raw", &["t1"]));
    let spec = chain(&["raw", "staging"], true);
    let snapshot = ChainSnapshot::capture(&spec, wh.as_ref(), &policy())
        .await
        .unwrap();
    let plan = plan(&spec, &snapshot).unwrap();

    let result = ChainExecutor::new(wh.clone(), policy())
        .execute(&plan, false)
        .await;
    assert_eq!(result.outcomes[0].outcome, Outcome::SkippedDatasetMissing);
    assert!(wh.create_calls().is_empty());
}

#[tokio::test]
async fn test_transient_view_failure_recovers() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a", "b", "c"])
            .with_dataset("staging", &[]),
    );
    wh.fail_view(
        "staging",
        "b",
        vec![DbError::RateLimited("quota".into()), DbError::Timeout("slow".into())],
    );
    let result = run(&wh, &chain(&["raw", "staging"], false)).await;

    assert_eq!(result.summary.created, 3);
    assert_eq!(
        wh.view_calls().iter().filter(|c| *c == "staging.b").count(),
        3
    );
    assert_eq!(
        wh.view_calls().iter().filter(|c| *c == "staging.a").count(),
        1
    );
}

#[tokio::test]
async fn test_exhausted_retries_fail_and_continue() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a", "b"])
            .with_dataset("staging", &[])
            .with_dataset("mart", &[]),
    );
    wh.fail_view(
        "staging",
        "a",
        (0..3).map(|_| DbError::Unavailable("503".into())).collect(),
    );
    let result = run(&wh, &chain(&["raw", "staging", "mart"], false)).await;

    assert!(result.has_failures());
    assert_eq!(result.summary.failed, 2);
    assert_eq!(result.summary.created, 2);
    match &result.outcomes[0].outcome {
        Outcome::Failed(reason) => {
            assert!(reason.contains("C004"));
            assert!(reason.contains("3 attempt"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    // mart.a selects from the missing staging.a and fails permanently
    assert!(matches!(
        result.outcomes[2].outcome,
        Outcome::Failed(ref r) if r.contains("1 attempt")
    ));
}

#[tokio::test]
async fn test_permanent_error_not_retried() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a"])
            .with_dataset("staging", &[]),
    );
    wh.fail_view(
        "staging",
        "a",
        vec![DbError::ExecutionError("Syntax error".into())],
    );
    let result = run(&wh, &chain(&["raw", "staging"], false)).await;

    assert_eq!(wh.view_calls().len(), 1);
    assert!(matches!(result.outcomes[0].outcome, Outcome::Failed(_)));
}

#[tokio::test]
async fn test_excluded_tables_make_no_calls() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["orders", "tmp_load"])
            .with_dataset("staging", &[]),
    );
    let spec = chain(&["raw", "staging"], false)
        .with_exclusions(&["tmp_*".to_string()])
        .unwrap();
    let result = run(&wh, &spec).await;

    assert_eq!(wh.view_calls(), vec!["staging.orders"]);
    assert_eq!(result.outcomes[1].outcome, Outcome::SkippedFiltered);
    assert_eq!(result.summary.skipped_filtered, 1);
}

#[tokio::test]
async fn test_empty_plan_succeeds() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &[])
            .with_dataset("staging", &[]),
    );
    let result = run(&wh, &chain(&["raw", "staging"], false)).await;
    assert!(result.outcomes.is_empty());
    assert!(!result.has_failures());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a", "b"])
            .with_dataset("staging", &[]),
    );
    let token = CancellationToken::new();
    token.cancel();
    let executor = ChainExecutor::new(wh.clone(), policy()).with_cancellation(token);
    let result = run_with(&wh, &chain(&["raw", "staging"], false), executor).await;

    assert_eq!(result.summary.cancelled, 2);
    assert!(result.was_cancelled());
    assert!(wh.view_calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_mid_run_keeps_one_outcome_per_operation() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a", "b", "c"])
            .with_dataset("staging", &[])
            .with_dataset("mart", &[]),
    );
    let token = CancellationToken::new();
    wh.cancel_after_views(2, token.clone());
    let executor = ChainExecutor::new(wh.clone(), policy())
        .with_concurrency(1)
        .with_cancellation(token);
    let result = run_with(&wh, &chain(&["raw", "staging", "mart"], false), executor).await;

    assert_eq!(result.outcomes.len(), 6);
    assert_eq!(result.summary.created, 2);
    assert_eq!(result.summary.cancelled, 4);
    assert_eq!(wh.view_calls().len(), 2);
}

#[tokio::test]
async fn test_cancelled_while_retrying_is_not_a_failure() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["a"])
            .with_dataset("staging", &[]),
    );
    wh.fail_view(
        "staging",
        "a",
        (0..3).map(|_| DbError::RateLimited("quota".into())).collect(),
    );
    let token = CancellationToken::new();
    wh.cancel_after_views(1, token.clone());
    let executor = ChainExecutor::new(wh.clone(), policy()).with_cancellation(token);
    let result = run_with(&wh, &chain(&["raw", "staging"], false), executor).await;

    assert_eq!(wh.view_calls(), vec!["staging.a"]);
    assert_eq!(result.outcomes[0].outcome, Outcome::Cancelled);
    assert!(!result.has_failures());
    assert!(result.was_cancelled());
}

#[tokio::test]
async fn test_cancelled_hop_keeps_filtered_tables_filtered() {
    let wh = Arc::new(
        ScriptedWarehouse::new()
            .with_dataset("raw", &["orders", "tmp_load"])
            .with_dataset("staging", &[]),
    );
    let spec = chain(&["raw", "staging"], false)
        .with_exclusions(&["tmp_*".to_string()])
        .unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let executor = ChainExecutor::new(wh.clone(), policy()).with_cancellation(token);
    let result = run_with(&wh, &spec, executor).await;

    assert_eq!(
        outcomes(&result),
        vec![
            ("staging.orders".to_string(), Outcome::Cancelled),
            ("staging.tmp_load".to_string(), Outcome::SkippedFiltered),
        ]
    );
    assert_eq!(result.summary.cancelled, 1);
    assert_eq!(result.summary.skipped_filtered, 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ChainObserver for Recorder {
    fn on_dataset_event(&self, event: &DatasetEvent) {
        self.events
            .lock()
            .unwrap()
            .push(format!("dataset {}", event.dataset));
    }

    fn on_outcome(&self, outcome: &TableOutcome) {
        self.events.lock().unwrap().push(format!(
            "{} {}",
            outcome.target_dataset.table_path(&outcome.table_name),
            outcome.outcome
        ));
    }
}

#[tokio::test]
async fn test_observer_sees_every_outcome() {
    let wh = Arc::new(ScriptedWarehouse::new().with_dataset("raw", &["a", "b"]));
    let recorder = Arc::new(Recorder::default());
    let executor = ChainExecutor::new(wh.clone(), policy()).with_observer(recorder.clone());
    run_with(&wh, &chain(&["raw", "staging"], true), executor).await;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "dataset staging".to_string(),
            "staging.a created".to_string(),
            "staging.b created".to_string(),
        ]
    );
}
