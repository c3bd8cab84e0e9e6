// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Event delivery between notifiers and listeners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use zcipc::port::{ListenerCreateError, NotifierCreateError, NotifierNotifyError};
use zcipc::prelude::*;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config() -> (Config, TempDir) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::with_prefix(&format!("zev{}_{n}_", std::process::id()));
    config.global.root_path = dir.path().to_path_buf();
    (config, dir)
}

fn node(config: &Config) -> Node {
    NodeBuilder::new()
        .config(config)
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .expect("node")
}

fn name(s: &str) -> ServiceName {
    ServiceName::new(s).expect("service name")
}

#[test]
fn notification_reaches_listener() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("ping")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();
    let notifier = event
        .notifier_builder()
        .default_event_id(EventId::new(3))
        .create()
        .unwrap();
    assert_eq!(notifier.default_event_id(), EventId::new(3));

    assert_eq!(listener.try_wait_one().unwrap(), None);
    assert_eq!(notifier.notify().unwrap(), 1);
    assert_eq!(listener.try_wait_one().unwrap(), Some(EventId::new(3)));
    assert_eq!(listener.try_wait_one().unwrap(), None);
}

#[test]
fn repeated_ids_collapse_until_taken() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("dedup")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();
    let notifier = event.notifier_builder().create().unwrap();

    for _ in 0..5 {
        notifier.notify_with_custom_event_id(EventId::new(7)).unwrap();
    }
    let mut seen = Vec::new();
    listener.try_wait_all(|id| seen.push(id)).unwrap();
    assert_eq!(seen, [EventId::new(7)]);

    notifier.notify_with_custom_event_id(EventId::new(7)).unwrap();
    assert_eq!(listener.try_wait_one().unwrap(), Some(EventId::new(7)));
}

#[test]
fn wait_all_reports_each_id_once_in_ascending_order() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("many")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();
    let notifier = event.notifier_builder().create().unwrap();

    for id in [9, 2, 200, 2, 0] {
        notifier.notify_with_custom_event_id(EventId::new(id)).unwrap();
    }
    let mut seen = Vec::new();
    listener.try_wait_all(|id| seen.push(id.as_value())).unwrap();
    assert_eq!(seen, [0, 2, 9, 200]);

    let mut again = Vec::new();
    listener.try_wait_all(|id| again.push(id)).unwrap();
    assert!(again.is_empty());
}

#[test]
fn timed_wait_returns_none_after_timeout() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("quiet")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();

    let timeout = Duration::from_millis(50);
    let start = Instant::now();
    assert_eq!(listener.timed_wait_one(timeout).unwrap(), None);
    assert!(start.elapsed() >= timeout);

    let mut seen = Vec::new();
    listener
        .timed_wait_all(|id| seen.push(id), Duration::from_millis(10))
        .unwrap();
    assert!(seen.is_empty());
}

#[test]
fn event_id_above_maximum_is_rejected() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node
        .service_builder(&name("bounds"))
        .event()
        .event_id_max_value(10)
        .create()
        .unwrap();
    let notifier = event.notifier_builder().create().unwrap();
    assert!(notifier.notify_with_custom_event_id(EventId::new(10)).is_ok());
    assert_eq!(
        notifier.notify_with_custom_event_id(EventId::new(11)).err(),
        Some(NotifierNotifyError::EventIdOutOfBounds)
    );
}

#[test]
fn notify_counts_reached_listeners() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("fanout")).event().create().unwrap();
    let notifier = event.notifier_builder().create().unwrap();
    assert_eq!(notifier.notify().unwrap(), 0);

    let first = event.listener_builder().create().unwrap();
    let second = event.listener_builder().create().unwrap();
    assert_eq!(notifier.notify().unwrap(), 2);
    assert_eq!(first.try_wait_one().unwrap(), Some(EventId::default()));
    assert_eq!(second.try_wait_one().unwrap(), Some(EventId::default()));

    drop(second);
    assert_eq!(notifier.notify().unwrap(), 1);
    assert_eq!(event.dynamic_config().number_of_listeners(), 1);
    assert_eq!(event.dynamic_config().number_of_notifiers(), 1);
}

#[test]
fn notifier_lifecycle_is_announced() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node
        .service_builder(&name("lifecycle"))
        .event()
        .notifier_created_event(EventId::new(1))
        .notifier_dropped_event(EventId::new(2))
        .create()
        .unwrap();
    let listener = event.listener_builder().create().unwrap();

    let notifier = event.notifier_builder().create().unwrap();
    assert_eq!(listener.try_wait_one().unwrap(), Some(EventId::new(1)));
    drop(notifier);
    assert_eq!(listener.try_wait_one().unwrap(), Some(EventId::new(2)));
    assert_eq!(listener.try_wait_one().unwrap(), None);
}

#[test]
fn port_limits_are_enforced() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node
        .service_builder(&name("event/limits"))
        .event()
        .max_listeners(1)
        .max_notifiers(1)
        .create()
        .unwrap();

    let _listener = event.listener_builder().create().unwrap();
    assert_eq!(
        event.listener_builder().create().err(),
        Some(ListenerCreateError::ExceedsMaxSupportedListeners)
    );
    let _notifier = event.notifier_builder().create().unwrap();
    assert_eq!(
        event.notifier_builder().create().err(),
        Some(NotifierCreateError::ExceedsMaxSupportedNotifiers)
    );
}

#[test]
fn dynamic_config_lists_ports() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("ports")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();
    let notifier = event.notifier_builder().create().unwrap();

    let mut listeners = Vec::new();
    event.dynamic_config().list_listeners(|l| {
        listeners.push((l.listener_id, l.node_id));
        CallbackProgression::Continue
    });
    assert_eq!(listeners, [(listener.id(), node.id())]);

    let mut notifiers = Vec::new();
    event.dynamic_config().list_notifiers(|n| {
        notifiers.push(n.notifier_id);
        CallbackProgression::Continue
    });
    assert_eq!(notifiers, [notifier.id()]);
}

#[test]
fn blocking_wait_wakes_on_notification_from_another_thread() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let event = node.service_builder(&name("wake")).event().create().unwrap();
    let listener = event.listener_builder().create().unwrap();

    let (ready_tx, ready_rx) = mpsc::channel();
    let thread_config = config.clone();
    let notifier_thread = std::thread::spawn(move || {
        let node = NodeBuilder::new()
            .config(&thread_config)
            .signal_handling_mode(SignalHandlingMode::Disabled)
            .create()
            .unwrap();
        let event = node
            .service_builder(&ServiceName::new("wake").unwrap())
            .event()
            .open()
            .unwrap();
        let notifier = event.notifier_builder().create().unwrap();
        ready_rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        notifier.notify_with_custom_event_id(EventId::new(42)).unwrap()
    });

    ready_tx.send(()).unwrap();
    assert_eq!(listener.blocking_wait_one().unwrap(), Some(EventId::new(42)));
    assert_eq!(notifier_thread.join().unwrap(), 1);
}
