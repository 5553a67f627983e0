//! End-to-end behaviour of the completion correlator against a scripted orchestrator.

mod common;

use std::time::Duration;

use common::{
    batch_events, bundle, deployment_events, heartbeat, named, ScriptedOrchestrator, StreamEnd,
};
use fleet_core::{
    wait_for_deployment_complete, wait_for_installation, wait_for_scale, wait_for_uninstallation,
    DeploymentTarget, NullProgress, RecordedProgress, WaitConfig, WaitError,
};
use futures::stream::{self, StreamExt};
use serde_json::json;

fn config(secs: u64) -> WaitConfig {
    WaitConfig::with_timeout(Duration::from_secs(secs))
}

#[tokio::test]
async fn test_installation_completes_after_events() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![
            Some(vec![]),
            Some(vec![bundle("b1", 0, 0)]),
            Some(vec![bundle("b1", 1, 0)]),
        ])
        .with_events(
            vec![
                heartbeat(),
                named("bundleInstallationAdded"),
                named("otherEvent"),
                named("bundleInstallationAdded"),
            ],
            StreamEnd::Close,
        );
    let mut progress = RecordedProgress::new();

    wait_for_installation(&orchestrator, "b1", &config(30), &mut progress)
        .await
        .unwrap();

    assert_eq!(
        progress.entries,
        vec!["Bundle b1 waiting to be installed", "Bundle b1 installed"]
    );
    assert_eq!(orchestrator.bundle_polls(), 3);
    assert_eq!(orchestrator.subscriptions(), 1);
}

#[tokio::test]
async fn test_already_scaled_bundle_never_subscribes() {
    let orchestrator =
        ScriptedOrchestrator::new().with_bundles(vec![Some(vec![bundle("b1", 3, 3)])]);
    let mut progress = RecordedProgress::new();

    wait_for_scale(&orchestrator, "b1", 3, &config(30), &mut progress)
        .await
        .unwrap();

    assert_eq!(progress.lines(), vec!["Bundle b1 expected scale 3 is met"]);
    assert_eq!(orchestrator.bundle_polls(), 1);
    assert_eq!(orchestrator.subscriptions(), 0);
}

#[tokio::test]
async fn test_uninstall_of_unknown_bundle_succeeds_immediately() {
    let orchestrator = ScriptedOrchestrator::new().with_bundles(vec![None]);
    let mut progress = NullProgress;

    wait_for_uninstallation(&orchestrator, "gone", &config(30), &mut progress)
        .await
        .unwrap();

    assert_eq!(orchestrator.subscriptions(), 0);
}

#[tokio::test]
async fn test_unchanged_snapshot_ticks_instead_of_repeating() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![bundle("b1", 1, 1)])])
        .with_events(vec![heartbeat(); 6], StreamEnd::Close);
    let mut progress = RecordedProgress::new();

    let err = wait_for_scale(&orchestrator, "b1", 3, &config(30), &mut progress)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "stream end is a timeout: {err}");
    assert_eq!(
        progress.entries,
        vec![
            "Bundle b1 waiting to reach expected scale 3",
            "Bundle b1 has scale 1, expected 3",
            ".",
        ]
    );
    // fast path plus one check per three heartbeats
    assert_eq!(orchestrator.bundle_polls(), 3);
}

#[tokio::test]
async fn test_heartbeats_below_threshold_do_not_poll() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![])])
        .with_events(vec![heartbeat(), heartbeat()], StreamEnd::Close);

    let err = wait_for_installation(&orchestrator, "b1", &config(30), &mut NullProgress)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(orchestrator.bundle_polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_times_out_at_budget() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![])])
        .with_events(vec![], StreamEnd::Hang);
    let started = tokio::time::Instant::now();

    let err = wait_for_installation(&orchestrator, "b1", &config(10), &mut NullProgress)
        .await
        .unwrap_err();

    match err {
        WaitError::Timeout {
            operation_id,
            budget,
            ..
        } => {
            assert_eq!(operation_id, "b1");
            assert_eq!(budget, Duration::from_secs(10));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
}

#[tokio::test]
async fn test_stream_error_is_propagated() {
    let failing = stream::iter(vec![
        Ok(heartbeat()),
        Err(WaitError::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))),
    ])
    .boxed();
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![])])
        .with_stream(failing);

    let err = wait_for_installation(&orchestrator, "b1", &config(30), &mut NullProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_single_deployment_failure_reports_reason() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_deployment(
            "d1",
            vec![
                deployment_events(json!([
                    {"deploymentSequence": 1, "eventType": "deploymentStarted"}
                ])),
                deployment_events(json!([
                    {"deploymentSequence": 1, "eventType": "deploymentStarted"},
                    {"deploymentSequence": 2, "eventType": "bundleDownload"}
                ])),
                deployment_events(json!([
                    {"deploymentSequence": 1, "eventType": "deploymentStarted"},
                    {"deploymentSequence": 2, "eventType": "bundleDownload"},
                    {"deploymentSequence": 3, "eventType": "deploymentFailure", "failure": "no space left"}
                ])),
            ],
        )
        .with_events(vec![named("bundleDownload"), named("deploymentFailure")], StreamEnd::Hang);
    let mut progress = RecordedProgress::new();

    let err = wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Deployment("d1".into()),
        &config(30),
        &mut progress,
    )
    .await
    .unwrap_err();

    match err {
        WaitError::OperationFailed {
            operation_id,
            reasons,
        } => {
            assert_eq!(operation_id, "d1");
            assert_eq!(reasons, vec!["no space left"]);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        progress.entries,
        vec!["Deployment started", "Downloading bundle", "Failure: no space left"]
    );
}

#[tokio::test]
async fn test_simple_batch_succeeds() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_batch(
            "batch-1",
            vec![batch_events(json!([
                {"deploymentSequence": 1, "eventType": "scheduleSimpleDeployment", "deploymentId": "d1"}
            ]))],
        )
        .with_deployment(
            "d1",
            vec![
                deployment_events(json!([
                    {"deploymentSequence": 1, "eventType": "deploymentStarted"}
                ])),
                deployment_events(json!([
                    {"deploymentSequence": 1, "eventType": "deploymentStarted"},
                    {"deploymentSequence": 2, "eventType": "deploymentSuccess"}
                ])),
            ],
        )
        .with_events(vec![named("deploymentSuccess")], StreamEnd::Hang);
    let mut progress = RecordedProgress::new();

    wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Batch("batch-1".into()),
        &config(30),
        &mut progress,
    )
    .await
    .unwrap();

    assert_eq!(progress.entries, vec!["Deployment d1: Success"]);
}

#[tokio::test]
async fn test_batch_failure_before_schedule() {
    let orchestrator = ScriptedOrchestrator::new().with_batch(
        "batch-1",
        vec![batch_events(json!([
            {"deploymentSequence": 1, "eventType": "batchFailure", "failure": "bundle not found"}
        ]))],
    );
    let mut progress = RecordedProgress::new();

    let err = wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Batch("batch-1".into()),
        &config(30),
        &mut progress,
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "batch-1 failed: bundle not found");
    assert_eq!(progress.entries, vec!["Failure: bundle not found"]);
    assert_eq!(orchestrator.subscriptions(), 0);
}

#[tokio::test]
async fn test_lock_step_partial_failure_renders_each_terminal_once() {
    let started = json!({"deploymentSequence": 1, "eventType": "deploymentStarted"});
    let orchestrator = ScriptedOrchestrator::new()
        .with_batch(
            "batch-1",
            vec![
                vec![],
                batch_events(json!([
                    {"deploymentSequence": 1, "eventType": "scheduleLockStepDeployments", "deploymentIds": ["a", "b"]}
                ])),
            ],
        )
        .with_deployment(
            "a",
            vec![
                deployment_events(json!([started])),
                deployment_events(json!([
                    started,
                    {"deploymentSequence": 2, "eventType": "deploymentSuccess"}
                ])),
            ],
        )
        .with_deployment(
            "b",
            vec![
                deployment_events(json!([started])),
                deployment_events(json!([started])),
                deployment_events(json!([
                    started,
                    {"deploymentSequence": 2, "eventType": "deploymentFailure", "failure": "boom"}
                ])),
            ],
        )
        .with_events(
            vec![
                named("scheduleLockStepDeployments"),
                named("deploymentSuccess"),
                named("deploymentFailure"),
            ],
            StreamEnd::Hang,
        );
    let mut progress = RecordedProgress::new();

    let err = wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Batch("batch-1".into()),
        &config(30),
        &mut progress,
    )
    .await
    .unwrap_err();

    match err {
        WaitError::OperationFailed { reasons, .. } => assert_eq!(reasons, vec!["boom"]),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        progress.entries,
        vec![
            "Scheduled 2 deployment(s) in lock-step",
            "Deployment a: Deployment started",
            "Deployment b: Deployment started",
            "Deployment a: Success",
            "Deployment b: Failure: boom",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lock_step_extends_budget_once() {
    let started = json!({"deploymentSequence": 1, "eventType": "deploymentStarted"});
    let orchestrator = ScriptedOrchestrator::new()
        .with_batch(
            "batch-1",
            vec![batch_events(json!([
                {"deploymentSequence": 1, "eventType": "scheduleLockStepDeployments", "deploymentIds": ["a", "b", "c", "d"]}
            ]))],
        )
        .with_deployment("a", vec![deployment_events(json!([started]))])
        .with_deployment("b", vec![deployment_events(json!([started]))])
        .with_deployment("c", vec![deployment_events(json!([started]))])
        .with_deployment("d", vec![deployment_events(json!([started]))])
        .with_events(vec![named("deploy"), named("deploy")], StreamEnd::Hang);
    let clock = tokio::time::Instant::now();

    let err = wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Batch("batch-1".into()),
        &config(10),
        &mut NullProgress,
    )
    .await
    .unwrap_err();

    match err {
        WaitError::Timeout { budget, .. } => assert_eq!(budget, Duration::from_secs(40)),
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = clock.elapsed();
    assert!(elapsed >= Duration::from_secs(40) && elapsed < Duration::from_secs(41));
}

#[tokio::test(start_paused = true)]
async fn test_budget_checked_when_events_keep_arriving() {
    let events = 10;
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![])])
        .with_poll_delay(Duration::from_secs(4))
        .with_events(vec![named("bundleInstallationAdded"); events], StreamEnd::Hang);

    let err = wait_for_installation(&orchestrator, "b1", &config(10), &mut NullProgress)
        .await
        .unwrap_err();

    match err {
        WaitError::Timeout { operation_id, .. } => assert_eq!(operation_id, "b1"),
        other => panic!("expected timeout, got {other:?}"),
    }
    // polls end at 4s, 8s and 12s; the event read after 12s is past the budget
    assert_eq!(orchestrator.bundle_polls(), 3);
    assert!(orchestrator.bundle_polls() <= events + 1);
}

#[tokio::test]
async fn test_unbounded_timeout_does_not_overflow() {
    let orchestrator = ScriptedOrchestrator::new()
        .with_bundles(vec![Some(vec![])])
        .with_events(vec![named("bundleInstallationAdded")], StreamEnd::Close);

    let err = wait_for_installation(&orchestrator, "b1", &config(u64::MAX), &mut NullProgress)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_lock_step_extension_of_huge_budget_saturates() {
    let started = json!({"deploymentSequence": 1, "eventType": "deploymentStarted"});
    let orchestrator = ScriptedOrchestrator::new()
        .with_batch(
            "batch-1",
            vec![batch_events(json!([
                {"deploymentSequence": 1, "eventType": "scheduleLockStepDeployments", "deploymentIds": ["a", "c"]}
            ]))],
        )
        .with_deployment("a", vec![deployment_events(json!([started]))])
        .with_deployment("c", vec![deployment_events(json!([started]))])
        .with_events(vec![named("deploy")], StreamEnd::Close);

    let err = wait_for_deployment_complete(
        &orchestrator,
        &DeploymentTarget::Batch("batch-1".into()),
        &config(u64::MAX / 2 + 1),
        &mut NullProgress,
    )
    .await
    .unwrap_err();

    match err {
        WaitError::Timeout { budget, .. } => assert_eq!(budget, Duration::MAX),
        other => panic!("expected timeout, got {other:?}"),
    }
}
