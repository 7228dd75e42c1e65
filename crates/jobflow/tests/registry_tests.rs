//! Run registry recovery across orchestrator restarts.

mod common;

use common::*;

use jobflow::model::JobMode;
use jobflow::model::JobStatus;
use jobflow::workflows::WorkflowKind;
use jobflow::Decision;

#[test]
fn test_registry_rebuilt_after_restart() {
    let harness = TestHarness::new();

    let (pending_id, completed_id) = {
        let orchestrator = harness.orchestrator(harness.sqlite_config().build());
        let pending = orchestrator.submit(manual_submission(JobMode::Full)).unwrap();
        let completed = orchestrator.submit(manual_submission(JobMode::Mvp)).unwrap();
        harness.wait(&orchestrator, &pending.run_id);
        harness.wait(&orchestrator, &completed.run_id);
        orchestrator.shutdown().unwrap();
        (pending.job_id, completed.job_id)
    };

    let orchestrator = harness.orchestrator(harness.sqlite_config().build());
    let registry = orchestrator.registry();
    assert_eq!(registry.len(), 2);

    let entry = registry.get(&pending_id).unwrap();
    assert!(entry.recovered);
    assert!(!entry.is_active());
    assert_eq!(entry.kind, WorkflowKind::Preparation);

    let view = orchestrator.status(&completed_id).unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert!(view.recovered);
    assert!(!view.running);

    // Recovered jobs accept decisions like any other.
    let decided = orchestrator.decide(&pending_id, Decision::Declined).unwrap();
    assert_eq!(decided.status, JobStatus::Declined);

    orchestrator.shutdown().unwrap();
}

#[test]
fn test_new_run_replaces_recovered_entry() {
    let harness = TestHarness::new();

    let job_id = {
        let orchestrator = harness.orchestrator(harness.sqlite_config().build());
        let receipt = orchestrator.submit(manual_submission(JobMode::Full)).unwrap();
        harness.wait(&orchestrator, &receipt.run_id);
        orchestrator.shutdown().unwrap();
        receipt.job_id
    };

    let orchestrator = harness.orchestrator(harness.sqlite_config().build());
    let decision = Decision::parse("retry", Some("shorter summary"), None).unwrap();
    let decided = orchestrator.decide(&job_id, decision).unwrap();
    let run_id = decided.run_id.unwrap();
    harness.wait(&orchestrator, &run_id);

    let entry = orchestrator.registry().get(&job_id).unwrap();
    assert_eq!(entry.run_id, run_id);
    assert_eq!(entry.kind, WorkflowKind::Retry);
    assert!(!entry.recovered);

    let view = orchestrator.status(&job_id).unwrap();
    assert_eq!(view.retry_count, 1);
    assert_eq!(view.status, JobStatus::Pending);

    orchestrator.shutdown().unwrap();
}
