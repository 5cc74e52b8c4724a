use std::sync::Mutex;

use adpulse_core::StageStatus;
use serde_json::Value;

use super::*;

fn policy(max_retries: u32, budget: Option<Duration>) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_secs(1),
        multiplier: 2.0,
        max_wall_clock: budget,
    }
}

fn transient() -> PipelineError {
    PipelineError::TransientCompute("worker pool exhausted".to_string())
}

/// Gaps between consecutive call instants.
fn gaps(calls: &Mutex<Vec<Instant>>) -> Vec<Duration> {
    let calls = calls.lock().unwrap();
    calls.windows(2).map(|w| w[1] - w[0]).collect()
}

#[test]
fn delay_schedule_is_exact_exponential() {
    let p = policy(3, None);
    assert_eq!(p.delay_for(0), Duration::from_secs(1));
    assert_eq!(p.delay_for(1), Duration::from_secs(2));
    assert_eq!(p.delay_for(2), Duration::from_secs(4));

    let flat = RetryPolicy {
        multiplier: 1.0,
        ..p
    };
    assert_eq!(flat.delay_for(5), Duration::from_secs(1));
}

#[test]
fn policy_from_default_settings() {
    let p = RetryPolicy::from_settings(&RetrySettings::default()).unwrap();
    assert_eq!(p, RetryPolicy::default());
    assert_eq!(p.max_retries, 3);
    assert_eq!(p.base_delay, Duration::from_secs(1));
    assert!((p.multiplier - 2.0).abs() < f64::EPSILON);
    assert_eq!(p.max_wall_clock, None);
}

#[test]
fn unrepresentable_settings_are_rejected_not_zeroed() {
    let settings = RetrySettings {
        base_delay_secs: 1.0e30,
        ..RetrySettings::default()
    };
    let err = RetryPolicy::from_settings(&settings).unwrap_err();
    assert_eq!(err.error_type(), "ValidationError");
    assert_eq!(err.details()["key"], "retry.base_delay_secs");

    let settings = RetrySettings {
        max_wall_clock_secs: Some(-1.0),
        ..RetrySettings::default()
    };
    assert!(RetryPolicy::from_settings(&settings).is_err());
}

#[tokio::test(start_paused = true)]
async fn back_off_past_the_clock_range_times_out_instead_of_overflowing() {
    let huge = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs_f64(1.0e19),
        multiplier: 2.0,
        max_wall_clock: Some(Duration::from_secs(60)),
    };
    let outcome: StageOutcome<()> =
        run_with_retry("metrics_engine", &huge, || std::future::ready(Err(transient()))).await;

    assert_eq!(outcome.attempts(), 1);
    let error = outcome.into_result().unwrap_err();
    assert_eq!(error.error_type(), "TimeoutError");
}

#[tokio::test(start_paused = true)]
async fn retries_with_backoff_then_fails_on_fourth_failure() {
    let calls = Mutex::new(Vec::new());

    let outcome: StageOutcome<()> = run_with_retry("metrics_engine", &policy(3, None), || {
        calls.lock().unwrap().push(Instant::now());
        std::future::ready(Err(transient()))
    })
    .await;

    assert_eq!(
        gaps(&calls),
        [
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert_eq!(outcome.attempts(), 4);
    match outcome {
        StageOutcome::Failed { error, elapsed, .. } => {
            assert_eq!(error.error_type(), "TransientComputeError");
            assert_eq!(error.to_string(), "worker pool exhausted");
            assert_eq!(elapsed, Duration::from_secs(7));
        }
        StageOutcome::Succeeded { .. } => panic!("expected failure"),
    }
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_fails_without_retry() {
    let calls = Mutex::new(Vec::new());

    let outcome: StageOutcome<()> = run_with_retry("metrics_engine", &policy(3, None), || {
        calls.lock().unwrap().push(Instant::now());
        std::future::ready(Err(PipelineError::validation(
            "Missing required fields in dataset",
            Value::Null,
        )))
    })
    .await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(
        outcome.transitions(),
        [StageState::Pending, StageState::Running, StageState::Failed]
    );
    let envelope = outcome.into_envelope("metrics_engine");
    assert_eq!(envelope.status, StageStatus::Failure);
    assert_eq!(envelope.error.unwrap().error_type, "ValidationError");
}

#[tokio::test(start_paused = true)]
async fn success_after_retry_reports_attempts() {
    let mut remaining_failures = 2;

    let outcome = run_with_retry("hypothesis_validator", &policy(3, None), || {
        let result = if remaining_failures > 0 {
            remaining_failures -= 1;
            Err(transient())
        } else {
            Ok(42_u32)
        };
        std::future::ready(result)
    })
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(
        outcome.transitions(),
        [
            StageState::Pending,
            StageState::Running,
            StageState::Retrying { attempt: 1 },
            StageState::Running,
            StageState::Retrying { attempt: 2 },
            StageState::Running,
            StageState::Succeeded,
        ]
    );

    let envelope = outcome.into_envelope("hypothesis_validator");
    assert_eq!(envelope.status, StageStatus::Success);
    assert_eq!(envelope.attempts, 3);
    assert_eq!(envelope.payload, Some(42));
    assert_eq!(envelope.execution_duration_ms, 3000);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_a_single_attempt() {
    let outcome: StageOutcome<()> =
        run_with_retry("trend_engine", &policy(0, None), || std::future::ready(Err(transient())))
            .await;
    assert_eq!(outcome.attempts(), 1);
    assert!(outcome.into_result().is_err());
}

#[tokio::test(start_paused = true)]
async fn budget_exhausted_during_backoff_is_a_timeout() {
    let calls = Mutex::new(Vec::new());
    let budget = Duration::from_millis(2500);

    let outcome: StageOutcome<()> =
        run_with_retry("segmentation_engine", &policy(3, Some(budget)), || {
            calls.lock().unwrap().push(Instant::now());
            std::future::ready(Err(transient()))
        })
        .await;

    // Second back-off (2 s, starting at t = 1 s) would overrun the 2.5 s budget.
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(outcome.attempts(), 2);
    match outcome {
        StageOutcome::Failed { error, elapsed, .. } => {
            assert_eq!(error.error_type(), "TimeoutError");
            assert_eq!(elapsed, budget);
        }
        StageOutcome::Succeeded { .. } => panic!("expected timeout"),
    }
}

#[tokio::test(start_paused = true)]
async fn budget_also_bounds_a_slow_attempt() {
    let outcome: StageOutcome<()> = run_with_retry(
        "metrics_engine",
        &policy(3, Some(Duration::from_secs(1))),
        || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        },
    )
    .await;

    assert_eq!(outcome.attempts(), 1);
    let error = outcome.into_result().unwrap_err();
    assert_eq!(error.error_type(), "TimeoutError");
    assert!(error.to_string().contains("metrics_engine"));
}

#[tokio::test(start_paused = true)]
async fn last_error_is_preserved_verbatim() {
    let mut n = 0;
    let outcome: StageOutcome<()> = run_with_retry("metrics_engine", &policy(2, None), || {
        n += 1;
        std::future::ready(Err(PipelineError::Unexpected(format!("failure #{n}"))))
    })
    .await;

    let error = outcome.into_result().unwrap_err();
    assert_eq!(error.to_string(), "failure #3");
}
