//! Property-based tests for the retry schedule and task state machine.

use std::time::Duration;

use herald_core::{DeliveryTarget, EventPayload};
use herald_delivery::{
    DeliveryError, DeliveryTask, RetryContext, RetryDecision, RetryPolicy, TaskState,
    TaskTransition,
};
use proptest::prelude::*;

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (
        1u32..10,            // max_attempts
        1u64..5_000,         // base_delay_ms
        0u64..120_000,       // extra headroom for max_delay_ms
        0.0f64..0.99,        // jitter_factor
    )
        .prop_map(|(max_attempts, base_ms, extra_ms, jitter_factor)| RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms + extra_ms),
            jitter_factor,
        })
}

fn retryable_error_strategy() -> impl Strategy<Value = DeliveryError> {
    prop_oneof![
        Just(DeliveryError::network("connection reset")),
        Just(DeliveryError::timeout(Duration::from_secs(30))),
        (400u16..429).prop_map(|status| DeliveryError::client_error(status, "")),
        (500u16..600).prop_map(|status| DeliveryError::server_error(status, "")),
        (0u64..600).prop_map(|seconds| DeliveryError::rate_limited(Some(seconds))),
        Just(DeliveryError::rate_limited(None)),
    ]
}

proptest! {
    #[test]
    fn backoff_never_exceeds_max_delay(policy in policy_strategy(), attempt in 1u32..64) {
        prop_assert!(policy.backoff_delay(attempt) <= policy.max_delay);
    }

    #[test]
    fn jitter_never_shortens_the_base_schedule(policy in policy_strategy(), attempt in 1u32..20) {
        let exact = policy.clone().without_jitter().backoff_delay(attempt);
        prop_assert!(policy.backoff_delay(attempt) >= exact);
    }

    #[test]
    fn unjittered_backoff_is_monotonic(policy in policy_strategy(), attempt in 1u32..40) {
        let policy = policy.without_jitter();
        prop_assert!(policy.backoff_delay(attempt + 1) >= policy.backoff_delay(attempt));
    }

    #[test]
    fn jittered_backoff_strictly_increases_below_the_cap(policy in policy_strategy()) {
        let base = policy.base_delay;
        let mut attempt = 1u32;

        // Unjittered delay for `attempt + 1` is `base * 2^attempt`.
        while attempt < 31 && base * (1u32 << attempt) < policy.max_delay {
            let current = policy.backoff_delay(attempt);
            let next = policy.backoff_delay(attempt + 1);
            prop_assert!(
                next > current,
                "attempt {}: {:?} then {:?}",
                attempt,
                current,
                next
            );
            attempt += 1;
        }

        // First delay that reaches the cap is clamped to it exactly.
        prop_assert_eq!(policy.backoff_delay(attempt + 1), policy.max_delay);
    }

    #[test]
    fn retryable_errors_retry_until_budget_is_spent(
        policy in policy_strategy(),
        error in retryable_error_strategy(),
    ) {
        for attempt in 1..policy.max_attempts {
            let decision = RetryContext::new(attempt, &error, &policy).decide_retry();
            match decision {
                RetryDecision::Retry { delay } => prop_assert!(delay <= policy.max_delay),
                RetryDecision::GiveUp { reason } => {
                    prop_assert!(false, "gave up early at attempt {}: {}", attempt, reason);
                },
            }
        }

        let last = RetryContext::new(policy.max_attempts, &error, &policy).decide_retry();
        let gave_up = matches!(last, RetryDecision::GiveUp { .. });
        prop_assert!(gave_up);
    }

    #[test]
    fn task_attempts_never_exceed_budget(max_attempts in 1u32..8, failures in 1usize..20) {
        let payload = EventPayload::new("scan.completed", Default::default()).unwrap();
        let mut task = DeliveryTask::new(DeliveryTarget::webhook("https://a.example/hook"), payload)
            .with_max_attempts(max_attempts);
        let policy = RetryPolicy::default();
        let error = DeliveryError::server_error(503, "");

        for _ in 0..failures {
            if task.is_terminal() {
                break;
            }
            task.begin_attempt();
            if let TaskTransition::Failed { .. } = task.record_failure(&error, &policy) {
                break;
            }
        }

        prop_assert!(task.attempt <= max_attempts);
        let failed = task.state == TaskState::Failed;
        prop_assert_eq!(failed, failures >= max_attempts as usize);
    }
}
