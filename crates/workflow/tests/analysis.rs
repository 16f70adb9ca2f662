//! Integration tests for running an analysis job end to end against a
//! scripted backend: streaming, fallback polling, narrative polling and
//! stale-job isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{
    analysis_payload, completion, feed_without_narrative, happy_feed, job_status, message,
    narrative_status, scenarios, test_config, wait_for_store, FeedScript, ScriptedBackend,
};
use postwise_core::analysis::{AnalysisPayload, AnalysisQuality, NarrativeJobStatus};
use postwise_core::error::CoreError;
use postwise_core::events::{AnalysisCompletion, AnalysisEvent, JobState, NarrativePollStatus};
use postwise_core::scenario::ScenarioPatch;
use postwise_core::types::JobId;
use postwise_core::workflow::WorkflowStep;
use postwise_workflow::aggregator::{Aggregator, AggregatorConfig};
use postwise_workflow::notices::{NoticeBus, WorkflowNotice};
use postwise_workflow::{AnalysisFailureReason, WorkflowError, WorkflowOrchestrator};
use tokio_util::sync::CancellationToken;

fn orchestrator(backend: &Arc<ScriptedBackend>) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(backend.clone(), test_config())
}

// ---------------------------------------------------------------------------
// Test: a fully streamed job fills the store and advances the workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_job_fills_store_and_advances_to_strategy_select() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Events(happy_feed("job-1")));
    let mut orchestrator = orchestrator(&backend);
    let mut notices = orchestrator.subscribe_notices();

    let quality = orchestrator
        .start_analysis("Bakery.Example.com/")
        .await
        .unwrap();
    assert_eq!(quality, AnalysisQuality::Enhanced);

    let state = orchestrator.state();
    assert_eq!(state.current_step(), WorkflowStep::StrategySelect);
    assert!(state.analysis_completed());
    assert_eq!(state.analysis_quality(), Some(AnalysisQuality::Enhanced));

    let store = orchestrator.analysis();
    assert!(store.is_frozen(), "narrative arrived, so nothing is pending");
    let result = store.result();
    assert_eq!(result.url.as_deref(), Some("https://bakery.example.com"));
    assert_eq!(result.business_name.as_deref(), Some("Crumb & Co"));
    assert_eq!(result.ready_scenarios().count(), 2);
    assert_eq!(result.narrative.as_deref(), Some("A neighbourhood bakery."));
    assert_eq!(result.narrative_job_status, Some(NarrativeJobStatus::Completed));
    assert_eq!(store.scrape_log().len(), 1);
    assert!(store.scenarios_sealed());

    let mut received = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        received.push(notice);
    }
    assert!(received.contains(&WorkflowNotice::StepChanged {
        from: WorkflowStep::UrlInput,
        to: WorkflowStep::Analyzing,
    }));
    assert!(received.contains(&WorkflowNotice::AnalysisCompleted {
        job_id: JobId::new("job-1"),
        quality: AnalysisQuality::Enhanced,
    }));
    assert!(received
        .iter()
        .any(|n| matches!(n, WorkflowNotice::AnalysisProgress { phase, .. } if phase == "fetching")));
}

// ---------------------------------------------------------------------------
// Test: a fallback analysis is a degraded success, not a failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fallback_analysis_completes_with_standard_quality() {
    let backend = Arc::new(ScriptedBackend::default());
    let fallback = AnalysisPayload {
        scenarios: Some(scenarios(1)),
        ..analysis_payload()
    };
    backend.script_job(
        "job-1",
        FeedScript::Events(vec![message(
            "job-1",
            AnalysisEvent::Complete {
                content: AnalysisCompletion {
                    success: false,
                    fallback_analysis: Some(fallback),
                    error: Some("enrichment failed".to_string()),
                    ..AnalysisCompletion::default()
                },
            },
        )]),
    );
    let mut orchestrator = orchestrator(&backend);

    let quality = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();

    assert_eq!(quality, AnalysisQuality::Standard);
    assert_eq!(
        orchestrator.state().current_step(),
        WorkflowStep::StrategySelect
    );
    let store = orchestrator.analysis();
    assert_eq!(store.result().quality, AnalysisQuality::Standard);
    assert_eq!(store.result().business_name.as_deref(), Some("Crumb & Co"));
    assert_eq!(store.result().ready_scenarios().count(), 1);
}

// ---------------------------------------------------------------------------
// Test: a failed job returns the workflow to URL input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_returns_to_url_input() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job(
        "job-1",
        FeedScript::Events(vec![
            message(
                "job-1",
                AnalysisEvent::AnalysisResult {
                    content: analysis_payload(),
                },
            ),
            message(
                "job-1",
                AnalysisEvent::Complete {
                    content: AnalysisCompletion {
                        error: Some("Site blocked our crawler".to_string()),
                        ..completion(false)
                    },
                },
            ),
        ]),
    );
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        WorkflowError::AnalysisFailure {
            reason: AnalysisFailureReason::BackendReportedFailure(ref message)
        } if message == "Site blocked our crawler"
    );
    let state = orchestrator.state();
    assert_eq!(state.current_step(), WorkflowStep::UrlInput);
    assert!(!state.analysis_completed());
    assert_eq!(state.last_failure(), Some("Site blocked our crawler"));

    let store = orchestrator.analysis();
    assert_eq!(
        store.result().narrative_job_status,
        Some(NarrativeJobStatus::Failed)
    );
    assert_eq!(store.last_error(), Some("Site blocked our crawler"));
}

#[tokio::test]
async fn error_event_fails_the_job() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job(
        "job-1",
        FeedScript::Events(vec![message(
            "job-1",
            AnalysisEvent::Error {
                message: "Scraper crashed".to_string(),
            },
        )]),
    );
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        WorkflowError::AnalysisFailure {
            reason: AnalysisFailureReason::BackendReportedFailure(_)
        }
    );
    assert_eq!(orchestrator.state().current_step(), WorkflowStep::UrlInput);
}

// ---------------------------------------------------------------------------
// Test: input validation and job start failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_url_is_rejected_before_any_request() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator.start_analysis("not a url").await.unwrap_err();

    assert_matches!(err, WorkflowError::Core(CoreError::Validation(_)));
    assert_eq!(ScriptedBackend::count(&backend.starts), 0);
    assert_eq!(orchestrator.state().current_step(), WorkflowStep::UrlInput);
}

#[tokio::test]
async fn job_start_failure_is_reported() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.fail_start("quota exceeded");
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        WorkflowError::AnalysisFailure {
            reason: AnalysisFailureReason::JobStartFailed(_)
        }
    );
    assert_eq!(orchestrator.state().current_step(), WorkflowStep::UrlInput);
}

// ---------------------------------------------------------------------------
// Test: job-status polling replaces an unavailable or truncated feed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_feed_falls_back_to_job_status() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Unavailable);
    backend.push_job_status(job_status(JobState::Running, None));
    backend.push_job_status(job_status(
        JobState::Succeeded,
        Some(AnalysisCompletion {
            analysis: Some(AnalysisPayload {
                scenarios: Some(scenarios(3)),
                ..analysis_payload()
            }),
            ..completion(true)
        }),
    ));
    let mut orchestrator = orchestrator(&backend);

    let quality = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();

    assert_eq!(quality, AnalysisQuality::Enhanced);
    assert_eq!(ScriptedBackend::count(&backend.job_status_calls), 2);
    let store = orchestrator.analysis();
    assert_eq!(store.result().business_name.as_deref(), Some("Crumb & Co"));
    assert_eq!(store.result().ready_scenarios().count(), 3);
}

#[tokio::test]
async fn feed_closing_before_completion_falls_back_to_job_status() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job(
        "job-1",
        FeedScript::Events(vec![message(
            "job-1",
            AnalysisEvent::AnalysisResult {
                content: analysis_payload(),
            },
        )]),
    );
    backend.push_job_status(job_status(JobState::Succeeded, None));
    let mut orchestrator = orchestrator(&backend);

    let quality = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();

    assert_eq!(quality, AnalysisQuality::Enhanced);
    assert_eq!(ScriptedBackend::count(&backend.job_status_calls), 1);
    assert_eq!(
        orchestrator.analysis().result().business_name.as_deref(),
        Some("Crumb & Co")
    );
}

#[tokio::test]
async fn job_that_never_finishes_times_out() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Unavailable);
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        WorkflowError::AnalysisFailure {
            reason: AnalysisFailureReason::JobTimedOut { attempts: 5 }
        }
    );
    assert_eq!(ScriptedBackend::count(&backend.job_status_calls), 5);
}

#[tokio::test]
async fn unreachable_backend_fails_with_stream_and_poll_unavailable() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Unavailable);
    backend.make_job_status_unreachable();
    let mut orchestrator = orchestrator(&backend);

    let err = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap_err();

    assert_matches!(
        err,
        WorkflowError::AnalysisFailure {
            reason: AnalysisFailureReason::StreamAndPollUnavailable
        }
    );
    assert_eq!(orchestrator.state().current_step(), WorkflowStep::UrlInput);
}

// ---------------------------------------------------------------------------
// Test: narrative polling after the job completes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn narrative_is_polled_until_ready() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Events(feed_without_narrative("job-1")));
    backend.push_narrative(narrative_status(NarrativePollStatus::Processing, 1, None));
    backend.push_narrative(narrative_status(
        NarrativePollStatus::Ready,
        2,
        Some("Warm, local, early."),
    ));
    let mut orchestrator = orchestrator(&backend);

    orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();
    let mut rx = orchestrator.subscribe_analysis();
    let store = wait_for_store(&mut rx, Duration::from_secs(5), |s| s.is_frozen()).await;

    assert_eq!(
        store.result().narrative_job_status,
        Some(NarrativeJobStatus::Completed)
    );
    assert_eq!(store.result().narrative.as_deref(), Some("Warm, local, early."));
    assert_eq!(ScriptedBackend::count(&backend.narrative_calls), 2);
}

#[tokio::test(start_paused = true)]
async fn narrative_polling_gives_up_after_max_attempts() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Events(feed_without_narrative("job-1")));
    let config = test_config().with_narrative_polling(Duration::from_secs(1), 120);
    let mut orchestrator = WorkflowOrchestrator::new(backend.clone(), config);

    let quality = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();
    assert_eq!(quality, AnalysisQuality::Enhanced);

    let mut rx = orchestrator.subscribe_analysis();
    let store = wait_for_store(&mut rx, Duration::from_secs(600), |s| s.is_frozen()).await;

    let result = store.result();
    assert_eq!(result.narrative_job_status, Some(NarrativeJobStatus::Timeout));
    assert_eq!(result.narrative_job_attempts, 120);
    assert!(result.narrative.is_none());
    assert_eq!(ScriptedBackend::count(&backend.narrative_calls), 120);
    // The analysis itself is unaffected.
    assert_eq!(
        orchestrator.state().current_step(),
        WorkflowStep::StrategySelect
    );
}

// ---------------------------------------------------------------------------
// Test: events for other jobs never reach the store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_tagged_with_another_job_are_ignored() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut feed = happy_feed("job-2");
    let complete = feed.pop().unwrap();
    feed.push(message(
        "job-1",
        AnalysisEvent::ScenariosResult {
            content: scenarios(5),
        },
    ));
    feed.push(message(
        "job-1",
        AnalysisEvent::Complete {
            content: completion(false),
        },
    ));
    feed.push(complete);
    backend.script_job("job-2", FeedScript::Events(feed));
    let mut orchestrator = orchestrator(&backend);

    let quality = orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();

    assert_eq!(quality, AnalysisQuality::Enhanced);
    assert_eq!(orchestrator.analysis().result().ready_scenarios().count(), 2);
}

#[tokio::test]
async fn abandoned_job_stops_accepting_events() {
    let backend = Arc::new(ScriptedBackend::default());
    let tx = backend.script_live_job("job-1");
    let aggregator = Aggregator::new(
        backend.clone(),
        AggregatorConfig::from(&test_config()),
        NoticeBus::default(),
    );
    let root = CancellationToken::new();
    let tracked = aggregator.track(JobId::new("job-1"), "https://bakery.example.com", &root);
    let mut rx = aggregator.subscribe();

    tx.unbounded_send(message(
        "job-1",
        AnalysisEvent::AnalysisResult {
            content: analysis_payload(),
        },
    ))
    .unwrap();
    wait_for_store(&mut rx, Duration::from_secs(5), |s| {
        s.result().business_name.is_some()
    })
    .await;

    tracked.cancel_token().cancel();
    aggregator.abandon(&JobId::new("job-1"));
    // The feed may already be closed on our side; either way nothing lands.
    let _ = tx.unbounded_send(message(
        "job-1",
        AnalysisEvent::ScenariosResult {
            content: scenarios(3),
        },
    ));

    assert_matches!(tracked.wait().await, Err(WorkflowError::Cancelled));
    let store = aggregator.snapshot();
    assert!(store.is_frozen());
    assert!(store.result().scenarios.is_empty());
    assert_eq!(store.result().business_name.as_deref(), Some("Crumb & Co"));
}

#[tokio::test]
async fn new_analysis_replaces_the_previous_one() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.script_job("job-1", FeedScript::Events(happy_feed("job-1")));
    let mut second = happy_feed("job-2");
    second[1] = message(
        "job-2",
        AnalysisEvent::AnalysisResult {
            content: AnalysisPayload {
                business_name: Some("Rye Society".to_string()),
                ..analysis_payload()
            },
        },
    );
    backend.script_job("job-2", FeedScript::Events(second));
    let mut orchestrator = orchestrator(&backend);

    orchestrator
        .start_analysis("bakery.example.com")
        .await
        .unwrap();
    orchestrator.reset_workflow();
    assert!(orchestrator.analysis().result().business_name.is_none());

    orchestrator
        .start_analysis("rye.example.com")
        .await
        .unwrap();

    let store = orchestrator.analysis();
    assert_eq!(store.result().url.as_deref(), Some("https://rye.example.com"));
    assert_eq!(store.result().business_name.as_deref(), Some("Rye Society"));
    assert_eq!(ScriptedBackend::count(&backend.starts), 2);
}

// ---------------------------------------------------------------------------
// Test: per-item scenario events converge whatever their order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn per_item_scenario_events_converge() {
    let backend = Arc::new(ScriptedBackend::default());
    let audience = |index: usize| {
        message(
            "job-1",
            AnalysisEvent::AudienceComplete {
                index: Some(index),
                content: ScenarioPatch {
                    customer_problem: Some(format!("Problem {index}")),
                    ..ScenarioPatch::default()
                },
            },
        )
    };
    let pitch = |index: usize| {
        message(
            "job-1",
            AnalysisEvent::PitchComplete {
                index,
                content: ScenarioPatch {
                    pitch: Some(format!("Pitch {index}")),
                    ..ScenarioPatch::default()
                },
            },
        )
    };
    backend.script_job(
        "job-1",
        FeedScript::Events(vec![
            message(
                "job-1",
                AnalysisEvent::AnalysisResult {
                    content: analysis_payload(),
                },
            ),
            // Pitch for 1 arrives before its audience and is buffered.
            pitch(1),
            audience(0),
            audience(1),
            pitch(0),
            pitch(0),
            message(
                "job-1",
                AnalysisEvent::Complete {
                    content: completion(true),
                },
            ),
        ]),
    );
    let mut orchestrator = orchestrator(&backend);

    orchestrator
        .start_analysis("example.com")
        .await
        .unwrap();

    let store = orchestrator.analysis();
    let scenarios: Vec<_> = store.result().ready_scenarios().cloned().collect();
    assert_eq!(scenarios.len(), 2);
    for (index, scenario) in scenarios.iter().enumerate() {
        assert_eq!(scenario.customer_problem, Some(format!("Problem {index}")));
        assert_eq!(scenario.pitch, Some(format!("Pitch {index}")));
    }
    assert!(store.pending_enrichments().is_empty());
    assert_eq!(
        orchestrator.state().current_step(),
        WorkflowStep::StrategySelect
    );
}
