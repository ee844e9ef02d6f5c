//! Whole-suite runs over the reference topology

mod test_utils;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use roodb_regress::error::HarnessError;
use roodb_regress::suite::SuiteBuilder;
use roodb_regress::topology::{LifecycleState, ReferenceInterpreter, Schema, Topology};
use test_utils::{test_config, test_schema, FakeEngine};

#[tokio::test]
async fn test_suite_reports_each_test_and_shuts_down_after_last() {
    let engine = Arc::new(FakeEngine::new());
    let seen_rows = Arc::new(Mutex::new(Vec::new()));
    let rows = seen_rows.clone();

    let suite = SuiteBuilder::new("orders", test_schema(), test_config())
        .add_topology(ReferenceInterpreter::new(engine.clone(), test_config()))
        .unwrap()
        .test("inserts", |t| async move {
            let client = t.client().await.unwrap();
            client.adhoc("INSERT INTO ORDERS VALUES (1)").await.unwrap();
        })
        .test("sees_empty_table", move |t| {
            let rows = rows.clone();
            async move {
                let client = t.client().await.unwrap();
                let count = client.adhoc("SELECT COUNT(*) FROM ORDERS").await.unwrap();
                let n = count.row(0).unwrap().get_long(0).unwrap().value;
                rows.lock().push(n);
            }
        })
        .test("panics", |_t| async move {
            panic!("boom");
        })
        .build();

    let report = suite.run().await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.passed(), 2);
    assert!(!report.is_success());
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].test, "panics");
    assert_eq!(failed[0].topology, "fake-REFERENCE");
    assert!(failed[0].failure.as_deref().unwrap().contains("boom"));

    // The second test ran after a soft reset
    assert_eq!(*seen_rows.lock(), vec![0]);
    assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.resets.load(Ordering::SeqCst), 2);
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 1);
    assert!(report.to_string().contains("2 passed, 1 failed"));
}

#[tokio::test]
async fn test_teardown_failure_is_reported_against_the_test() {
    let engine = Arc::new(FakeEngine::new());
    let suite = SuiteBuilder::new("drift", test_schema(), test_config())
        .add_topology(ReferenceInterpreter::new(engine.clone(), test_config()))
        .unwrap()
        .test("adds_table", |t| async move {
            let client = t.client().await.unwrap();
            client.adhoc("CREATE TABLE EXTRA (ID BIGINT)").await.unwrap();
        })
        .test("last", |_t| async move {})
        .build();

    let report = suite.run().await.unwrap();
    let failure = report.outcomes[0].failure.as_deref().unwrap();
    assert!(failure.starts_with("teardown:"));
    assert!(failure.contains("EXTRA"));
    assert!(report.outcomes[1].passed());
}

#[test]
fn test_empty_schema_fails_to_compile() {
    let engine = Arc::new(FakeEngine::new());
    let result = SuiteBuilder::new("empty", Schema::new("empty"), test_config())
        .add_topology(ReferenceInterpreter::new(engine, test_config()));
    assert!(matches!(result, Err(HarnessError::CompileFailed { .. })));
}

#[tokio::test]
async fn test_startup_failure_aborts_suite() {
    let engine = Arc::new(FakeEngine::new());
    let broken = Schema::new("broken").statement("CREATE INDEX IDX ON ORDERS (ID)");
    let suite = SuiteBuilder::new("broken", broken, test_config())
        .add_topology(ReferenceInterpreter::new(engine.clone(), test_config()))
        .unwrap()
        .test("never_runs", |_t| async move {
            panic!("should not run");
        })
        .build();

    let err = suite.run().await.unwrap_err();
    assert!(matches!(err, HarnessError::Startup { .. }));
}

#[tokio::test]
async fn test_reference_topology_introspection() {
    let engine = Arc::new(FakeEngine::new());
    let mut topology = Topology::from(ReferenceInterpreter::new(engine, test_config()));
    assert!(topology.is_reference_interpreter());
    assert_eq!(topology.state(), LifecycleState::NotStarted);
    assert!(topology.compile(&test_schema()));
    assert_eq!(topology.logical_partition_count(), 1);
    assert_eq!(topology.listener_count(), 1);

    topology.start_up(true).await.unwrap();
    assert_eq!(topology.state(), LifecycleState::Running);
    assert!(topology.initial_catalog().is_some());
    assert!(topology.check_alive().is_ok());
    assert!(topology.shut_down_host(0).await.is_err());
    topology.shut_down().await.unwrap();
    assert_eq!(topology.state(), LifecycleState::ShutDown);
}
