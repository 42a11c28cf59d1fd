//! Fanout behaviour of the dispatcher against recording test doubles.

use std::{collections::HashMap, sync::Arc};

use herald_core::{Attributes, DeliveryTarget, IntegrationKind, Subscriber};
use herald_delivery::{IntegrationRegistry, QueueError};
use herald_dispatch::{DispatchError, Dispatcher, InMemorySubscriberRegistry, Route};
use herald_testing::{
    fixtures::{self, subscriber},
    EventBuilder, RecordingQueue, StaticResolver, UnavailableResolver,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn integrations(configs: Value) -> Arc<IntegrationRegistry> {
    let configs: HashMap<String, Value> = serde_json::from_value(configs).unwrap();
    Arc::new(IntegrationRegistry::from_config(&configs))
}

fn slack_only() -> Arc<IntegrationRegistry> {
    integrations(json!({
        "slack": {"enabled": true, "api_token": "xoxb-test"},
        "status_board": {"enabled": false},
    }))
}

fn dispatcher(
    resolver: impl herald_dispatch::SubscriberResolver + 'static,
    integrations: Arc<IntegrationRegistry>,
    queue: &RecordingQueue,
) -> Dispatcher {
    Dispatcher::new(Arc::new(resolver), integrations, Arc::new(queue.clone()))
}

#[test]
fn each_subscriber_gets_one_webhook_task() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::with_urls(["https://a.example/hook", "https://b.example/hook"]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    let event = EventBuilder::new("scan.completed")
        .attribute("target", json!("web-01"))
        .attribute("findings", json!([{"port": 443, "service": "https"}]))
        .build();

    let report = dispatcher.trigger(event.clone()).unwrap();

    assert_eq!(report.route, Route::Webhooks);
    assert_eq!(report.task_count(), 2);
    assert_eq!(
        queue.targets(),
        [
            DeliveryTarget::webhook("https://a.example/hook"),
            DeliveryTarget::webhook("https://b.example/hook"),
        ]
    );

    for task in queue.tasks() {
        assert_eq!(task.payload, event);
        assert_eq!(task.payload.attributes(), event.attributes());
        assert_eq!(task.payload.wire_body()["event"], "scan.completed");
        assert_eq!(task.payload.wire_body()["target"], "web-01");
    }

    // Subscribers win: the enabled Slack integration is not used.
    assert!(!queue.targets().contains(&DeliveryTarget::integration(IntegrationKind::Slack)));
}

#[test]
fn handles_match_enqueued_tasks() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::with_urls(["https://a.example/hook"]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    let report = dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap();
    let tasks = queue.tasks();

    assert_eq!(report.handles[0].task_id, tasks[0].id);
    assert_eq!(tasks[0].attempt, 0);
    assert_eq!(tasks[0].event_name(), "scan.completed");
}

#[test]
fn no_subscribers_falls_back_to_enabled_integrations() {
    let queue = RecordingQueue::new();
    let dispatcher = dispatcher(StaticResolver::empty(), slack_only(), &queue);

    let report = dispatcher.trigger(fixtures::logged_error("disk full")).unwrap();

    assert_eq!(report.route, Route::Integrations);
    assert_eq!(queue.targets(), [DeliveryTarget::integration(IntegrationKind::Slack)]);
}

#[test]
fn integrations_are_enqueued_in_fixed_order() {
    let queue = RecordingQueue::new();
    let registry = integrations(json!({
        "workplace": {"enabled": true, "api_token": "t", "error_thread": 42},
        "custom_webhook": {"enabled": true, "url": "https://hooks.example/in"},
        "status_board": {"enabled": true},
        "slack": {"enabled": true, "api_token": "xoxb-test"},
    }));
    let dispatcher = dispatcher(StaticResolver::empty(), registry, &queue);

    dispatcher.trigger(fixtures::session_checkin(&["10.0.0.5"])).unwrap();

    let kinds: Vec<_> = queue
        .targets()
        .into_iter()
        .map(|target| match target {
            DeliveryTarget::Integration { integration } => integration,
            other => panic!("unexpected target {other}"),
        })
        .collect();
    assert_eq!(kinds, IntegrationKind::ALL.to_vec());
}

#[test]
fn nothing_to_deliver_is_not_an_error() {
    let queue = RecordingQueue::new();
    let dispatcher =
        dispatcher(StaticResolver::empty(), Arc::new(IntegrationRegistry::default()), &queue);

    let report = dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap();

    assert_eq!(report.route, Route::Integrations);
    assert_eq!(report.task_count(), 0);
    assert!(queue.is_empty());
}

#[test]
fn event_filter_limits_subscribers() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::new([
        subscriber("https://a.example/hook").with_events(["session_checkin"]),
        subscriber("https://b.example/hook"),
    ]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap();

    assert_eq!(queue.targets(), [DeliveryTarget::webhook("https://b.example/hook")]);
}

#[test]
fn empty_event_name_is_rejected_before_lookup() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::with_urls(["https://a.example/hook"]);
    let lookups = resolver.clone();
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    let error = dispatcher.trigger_event("", Attributes::new()).unwrap_err();

    assert!(matches!(error, DispatchError::Validation(_)));
    assert_eq!(lookups.lookup_count(), 0);
    assert!(queue.is_empty());
}

#[test]
fn lookup_failure_drops_event() {
    let queue = RecordingQueue::new();
    let dispatcher = dispatcher(UnavailableResolver::default(), slack_only(), &queue);

    let error = dispatcher.trigger(fixtures::logged_error("boom")).unwrap_err();

    assert!(matches!(error, DispatchError::Lookup(_)));
    assert!(queue.is_empty(), "lookup failure must not fall back to integrations");
}

#[test]
fn enqueue_failure_surfaces_synchronously() {
    let queue = RecordingQueue::unavailable();
    let resolver = StaticResolver::with_urls(["https://a.example/hook"]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    let error = dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap_err();

    assert!(matches!(
        error,
        DispatchError::Enqueue { source: QueueError::Unavailable { .. }, enqueued: 0, total: 1 }
    ));
}

#[test]
fn partial_fanout_reports_enqueued_count() {
    let queue = RecordingQueue::failing_after(2);
    let resolver = StaticResolver::with_urls([
        "https://a.example/hook",
        "https://b.example/hook",
        "https://c.example/hook",
    ]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    let error = dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap_err();

    assert_eq!(error.enqueued(), 2);
    assert_eq!(queue.len(), 2);
}

#[test]
fn max_attempts_applies_to_every_task() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::with_urls(["https://a.example/hook", "https://b.example/hook"]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue).with_max_attempts(7);

    dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap();

    assert!(queue.tasks().iter().all(|task| task.max_attempts == 7));
}

#[test]
fn in_memory_registry_changes_apply_to_next_trigger() {
    let queue = RecordingQueue::new();
    let registry = Arc::new(InMemorySubscriberRegistry::new());
    let dispatcher = Dispatcher::new(registry.clone(), slack_only(), Arc::new(queue.clone()));

    dispatcher.trigger(fixtures::logged_error("first")).unwrap();
    registry.register(subscriber("https://a.example/hook"));
    dispatcher.trigger(fixtures::logged_error("second")).unwrap();

    assert_eq!(
        queue.targets(),
        [
            DeliveryTarget::integration(IntegrationKind::Slack),
            DeliveryTarget::webhook("https://a.example/hook"),
        ]
    );
}

#[test]
fn unvalidated_subscriber_urls_are_still_enqueued() {
    let queue = RecordingQueue::new();
    let resolver = StaticResolver::new([fixtures::unchecked_subscriber("not a url")]);
    let dispatcher = dispatcher(resolver, slack_only(), &queue);

    // The URL is checked by the worker, not by trigger.
    let report = dispatcher.trigger(EventBuilder::new("scan.completed").build()).unwrap();
    assert_eq!(report.task_count(), 1);
}

proptest! {
    #[test]
    fn fanout_count_matches_subscriber_count(count in 0usize..40) {
        let queue = RecordingQueue::new();
        let subscribers: Vec<Subscriber> = (0..count)
            .map(|i| subscriber(&format!("https://hooks{i}.example/in")))
            .collect();
        let dispatcher = dispatcher(StaticResolver::new(subscribers), slack_only(), &queue);

        let report = dispatcher.trigger(fixtures::logged_error("x")).unwrap();

        if count == 0 {
            prop_assert_eq!(report.route, Route::Integrations);
            prop_assert_eq!(queue.len(), 1);
        } else {
            prop_assert_eq!(report.route, Route::Webhooks);
            prop_assert_eq!(queue.len(), count);
            let targets = queue.targets();
            let all_webhooks = targets.iter().all(|t| matches!(t, DeliveryTarget::Webhook { .. }));
            prop_assert!(all_webhooks);
        }
    }
}
