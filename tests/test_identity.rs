// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Port and node identities as seen through the public API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use zcipc::prelude::*;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config() -> (Config, TempDir) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::with_prefix(&format!("zid{}_{n}_", std::process::id()));
    config.global.root_path = dir.path().to_path_buf();
    (config, dir)
}

#[test]
fn display_is_fixed_width_hex() {
    let id = UniquePortId::new();
    let text = id.to_string();
    assert_eq!(text.len(), 32);
    assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(u128::from_str_radix(&text, 16).unwrap(), id.value());
    assert!(format!("{id:?}").starts_with("UniquePortId("));
}

#[test]
fn every_port_gets_its_own_id() {
    let (config, _dir) = test_config();
    let node = NodeBuilder::new()
        .config(&config)
        .signal_handling_mode(SignalHandlingMode::Disabled)
        .create()
        .unwrap();
    let pubsub = node
        .service_builder(&ServiceName::new("ids/pubsub").unwrap())
        .publish_subscribe::<u8>()
        .create()
        .unwrap();
    let event = node
        .service_builder(&ServiceName::new("ids/event").unwrap())
        .event()
        .create()
        .unwrap();

    let publisher = pubsub.publisher_builder().create().unwrap();
    let subscriber = pubsub.subscriber_builder().create().unwrap();
    let notifier = event.notifier_builder().create().unwrap();
    let listener = event.listener_builder().create().unwrap();

    let ids: HashSet<UniquePortId> =
        [publisher.id(), subscriber.id(), notifier.id(), listener.id()].into();
    assert_eq!(ids.len(), 4);
}

#[test]
fn service_id_depends_on_name_and_pattern() {
    let a = ServiceName::new("ids/same").unwrap();
    let b = ServiceName::new("ids/other").unwrap();
    let id = |name: &ServiceName, pattern: MessagingPattern| {
        zcipc::service::ServiceId::new(name, pattern)
    };

    assert_eq!(
        id(&a, MessagingPattern::Event),
        id(&a, MessagingPattern::Event)
    );
    assert_ne!(
        id(&a, MessagingPattern::Event),
        id(&a, MessagingPattern::PublishSubscribe)
    );
    assert_ne!(id(&a, MessagingPattern::Event), id(&b, MessagingPattern::Event));
    assert_eq!(id(&a, MessagingPattern::Event).as_hex().len(), 16);
}
