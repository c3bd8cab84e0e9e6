// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Service creation, opening, discovery and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use zcipc::prelude::*;
use zcipc::service::builder::event::{EventCreateError, EventOpenError};
use zcipc::service::builder::publish_subscribe::{
    PublishSubscribeCreateError, PublishSubscribeOpenError, PublishSubscribeOpenOrCreateError,
};
use zcipc::service::{self, MessagingPattern};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config() -> (Config, TempDir) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::with_prefix(&format!("zsv{}_{n}_", std::process::id()));
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
fn create_twice_fails_with_already_exists() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let _service = node
        .service_builder(&name("a/b"))
        .publish_subscribe::<u64>()
        .create()
        .expect("create");

    let again = node
        .service_builder(&name("a/b"))
        .publish_subscribe::<u64>()
        .create();
    assert_eq!(again.err(), Some(PublishSubscribeCreateError::AlreadyExists));
}

#[test]
fn open_missing_service_fails() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let result = node
        .service_builder(&name("missing"))
        .publish_subscribe::<u64>()
        .open();
    assert_eq!(result.err(), Some(PublishSubscribeOpenError::DoesNotExist));

    let result = node.service_builder(&name("missing")).event().open();
    assert_eq!(result.err(), Some(EventOpenError::DoesNotExist));
}

#[test]
fn service_disappears_with_last_holder() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let svc_name = name("teardown");
    let ps = MessagingPattern::PublishSubscribe;

    let creator = node
        .service_builder(&svc_name)
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
    let opener = node
        .service_builder(&svc_name)
        .publish_subscribe::<u64>()
        .open()
        .unwrap();
    let publisher = opener.publisher_builder().create().unwrap();
    assert!(service::does_exist(&svc_name, &config, ps).unwrap());

    drop(creator);
    assert!(service::does_exist(&svc_name, &config, ps).unwrap());
    drop(opener);
    // the publisher still holds the service
    assert!(service::does_exist(&svc_name, &config, ps).unwrap());
    drop(publisher);
    assert!(!service::does_exist(&svc_name, &config, ps).unwrap());

    // and the name can be reused
    let _again = node
        .service_builder(&svc_name)
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
}

#[test]
fn patterns_do_not_share_a_name() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let _ps = node
        .service_builder(&name("shared"))
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
    let _event = node.service_builder(&name("shared")).event().create().unwrap();

    assert!(service::does_exist(&name("shared"), &config, MessagingPattern::Event).unwrap());
    assert!(
        service::does_exist(&name("shared"), &config, MessagingPattern::PublishSubscribe).unwrap()
    );
}

#[test]
fn list_visits_every_service_and_stops_on_request() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let _a = node
        .service_builder(&name("list/a"))
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
    let _b = node.service_builder(&name("list/b")).event().create().unwrap();
    let _c = node
        .service_builder(&name("list/c"))
        .publish_subscribe::<u32>()
        .create()
        .unwrap();

    let mut names = Vec::new();
    service::list(&config, |details| {
        names.push(details.static_details.name().to_string());
        CallbackProgression::Continue
    })
    .unwrap();
    names.sort();
    assert_eq!(names, ["list/a", "list/b", "list/c"]);

    let mut visited = 0;
    service::list(&config, |_| {
        visited += 1;
        CallbackProgression::Stop
    })
    .unwrap();
    assert_eq!(visited, 1);
}

#[test]
fn details_report_static_and_dynamic_state() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let svc_name = name("details");
    let factory = node
        .service_builder(&svc_name)
        .publish_subscribe::<u64>()
        .max_publishers(3)
        .history_size(0)
        .create()
        .unwrap();
    let _publisher = factory.publisher_builder().create().unwrap();
    let _subscriber = factory.subscriber_builder().create().unwrap();

    let details = service::details(&svc_name, &config, MessagingPattern::PublishSubscribe)
        .unwrap()
        .expect("service exists");
    let ps = details.static_details.publish_subscribe().unwrap();
    assert_eq!(ps.max_publishers(), 3);
    assert_eq!(ps.history_size(), 0);
    assert_eq!(details.dynamic_details.number_of_producers(), 1);
    assert_eq!(details.dynamic_details.number_of_consumers(), 1);
    assert_eq!(details.dynamic_details.nodes(), &[node.id()]);

    assert!(service::details(&name("nope"), &config, MessagingPattern::PublishSubscribe)
        .unwrap()
        .is_none());
}

#[test]
fn open_checks_payload_type() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let _svc = node
        .service_builder(&name("typed"))
        .publish_subscribe::<u64>()
        .create()
        .unwrap();

    let wrong = node
        .service_builder(&name("typed"))
        .publish_subscribe::<u32>()
        .open();
    assert_eq!(wrong.err(), Some(PublishSubscribeOpenError::IncompatibleTypes));

    let slice = node
        .service_builder(&name("typed"))
        .publish_subscribe::<[u64]>()
        .open();
    assert_eq!(slice.err(), Some(PublishSubscribeOpenError::IncompatibleTypes));

    let header = node
        .service_builder(&name("typed"))
        .publish_subscribe::<u64>()
        .user_header::<u32>()
        .open();
    assert_eq!(header.err(), Some(PublishSubscribeOpenError::IncompatibleTypes));
}

#[test]
fn open_checks_requested_limits() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let svc_name = name("limits");
    let _svc = node
        .service_builder(&svc_name)
        .publish_subscribe::<u64>()
        .max_publishers(2)
        .max_subscribers(2)
        .history_size(1)
        .subscriber_max_buffer_size(4)
        .enable_safe_overflow(true)
        .create()
        .unwrap();

    let open = || node.service_builder(&svc_name).publish_subscribe::<u64>();
    assert!(open().max_publishers(2).open().is_ok());
    assert_eq!(
        open().max_publishers(3).open().err(),
        Some(PublishSubscribeOpenError::DoesNotSupportRequestedAmountOfPublishers)
    );
    assert_eq!(
        open().max_subscribers(9).open().err(),
        Some(PublishSubscribeOpenError::DoesNotSupportRequestedAmountOfSubscribers)
    );
    assert_eq!(
        open().history_size(2).open().err(),
        Some(PublishSubscribeOpenError::DoesNotSupportRequestedMinHistorySize)
    );
    assert_eq!(
        open().subscriber_max_buffer_size(5).open().err(),
        Some(PublishSubscribeOpenError::DoesNotSupportRequestedMinBufferSize)
    );
    assert_eq!(
        open().enable_safe_overflow(false).open().err(),
        Some(PublishSubscribeOpenError::IncompatibleOverflowBehavior)
    );
}

#[test]
fn attributes_are_stored_and_verified() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let key = AttributeKey::new("camera").unwrap();
    let value = AttributeValue::new("front").unwrap();
    let other = AttributeValue::new("rear").unwrap();

    let factory = node
        .service_builder(&name("attrs"))
        .event()
        .create_with_attributes(&AttributeSpecifier::new().define(&key, &value))
        .unwrap();
    assert_eq!(factory.attributes().key_value(&key, 0), Some(&value));

    let ok = node
        .service_builder(&name("attrs"))
        .event()
        .open_with_attributes(&AttributeVerifier::new().require(&key, &value));
    assert!(ok.is_ok());

    let mismatch = node
        .service_builder(&name("attrs"))
        .event()
        .open_with_attributes(&AttributeVerifier::new().require(&key, &other));
    assert_eq!(mismatch.err(), Some(EventOpenError::IncompatibleAttributes));

    let missing_key = node
        .service_builder(&name("attrs"))
        .event()
        .open_with_attributes(
            &AttributeVerifier::new().require_key(&AttributeKey::new("lens").unwrap()),
        );
    assert_eq!(missing_key.err(), Some(EventOpenError::IncompatibleAttributes));
}

#[test]
fn open_or_create_creates_then_opens() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let first = node
        .service_builder(&name("ooc"))
        .publish_subscribe::<u64>()
        .open_or_create()
        .unwrap();
    let second = node
        .service_builder(&name("ooc"))
        .publish_subscribe::<u64>()
        .open_or_create()
        .unwrap();
    assert_eq!(first.service_id(), second.service_id());

    let wrong = node
        .service_builder(&name("ooc"))
        .publish_subscribe::<u8>()
        .open_or_create();
    assert_eq!(
        wrong.err(),
        Some(PublishSubscribeOpenOrCreateError::Open(
            PublishSubscribeOpenError::IncompatibleTypes
        ))
    );
}

#[test]
fn history_must_fit_buffer_without_safe_overflow() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let result = node
        .service_builder(&name("history"))
        .publish_subscribe::<u64>()
        .enable_safe_overflow(false)
        .history_size(5)
        .subscriber_max_buffer_size(2)
        .create();
    assert_eq!(
        result.err(),
        Some(PublishSubscribeCreateError::SubscriberBufferMustBeLargerThanHistorySize)
    );

    // with safe overflow the history simply overwrites
    assert!(node
        .service_builder(&name("history"))
        .publish_subscribe::<u64>()
        .enable_safe_overflow(true)
        .history_size(5)
        .subscriber_max_buffer_size(2)
        .create()
        .is_ok());
}

#[test]
fn zero_limits_are_raised_to_one() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let factory = node
        .service_builder(&name("zero"))
        .publish_subscribe::<u64>()
        .max_publishers(0)
        .max_subscribers(0)
        .create()
        .unwrap();
    assert_eq!(factory.static_config().max_publishers(), 1);
    assert_eq!(factory.static_config().max_subscribers(), 1);
}

#[test]
fn event_open_checks_limits_and_announcements() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let svc_name = name("event/limits");
    let _svc = node
        .service_builder(&svc_name)
        .event()
        .max_notifiers(2)
        .max_listeners(2)
        .event_id_max_value(10)
        .notifier_created_event(EventId::new(1))
        .create()
        .unwrap();

    let open = || node.service_builder(&svc_name).event();
    assert_eq!(
        open().max_notifiers(3).open().err(),
        Some(EventOpenError::DoesNotSupportRequestedAmountOfNotifiers)
    );
    assert_eq!(
        open().max_listeners(3).open().err(),
        Some(EventOpenError::DoesNotSupportRequestedAmountOfListeners)
    );
    assert_eq!(
        open().event_id_max_value(11).open().err(),
        Some(EventOpenError::DoesNotSupportRequestedMaxEventId)
    );
    assert_eq!(
        open().notifier_created_event(EventId::new(2)).open().err(),
        Some(EventOpenError::IncompatibleNotifierCreatedEvent)
    );
    assert_eq!(
        open().notifier_dropped_event(EventId::new(2)).open().err(),
        Some(EventOpenError::IncompatibleNotifierDroppedEvent)
    );
    assert!(open().notifier_created_event(EventId::new(1)).open().is_ok());

    assert_eq!(
        node.service_builder(&svc_name).event().create().err(),
        Some(EventCreateError::AlreadyExists)
    );
}

#[test]
fn node_limit_of_a_service_is_enforced() {
    let (config, _dir) = test_config();
    let first = node(&config);
    let second = node(&config);
    let _svc = first
        .service_builder(&name("nodes"))
        .event()
        .max_nodes(1)
        .create()
        .unwrap();

    let result = second.service_builder(&name("nodes")).event().open();
    assert_eq!(result.err(), Some(EventOpenError::ExceedsMaxNumberOfNodes));
}

#[test]
fn port_factory_reports_its_nodes() {
    let (config, _dir) = test_config();
    let first = node(&config);
    let second = node(&config);
    let factory = first
        .service_builder(&name("factory/nodes"))
        .event()
        .create()
        .unwrap();
    let _opened = second
        .service_builder(&name("factory/nodes"))
        .event()
        .open()
        .unwrap();

    let mut ids = Vec::new();
    factory.nodes(|state| {
        assert!(matches!(state, NodeState::Alive(_)));
        ids.push(state.id());
        CallbackProgression::Continue
    });
    ids.sort();
    let mut expected = vec![first.id(), second.id()];
    expected.sort();
    assert_eq!(ids, expected);
}
