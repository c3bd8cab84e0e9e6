// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Publish-subscribe delivery: ordering, overflow, limits, slices, headers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use tempfile::TempDir;
use zcipc::port::{
    LoanError, PublisherCreateError, ReceiveError, SubscriberCreateError,
};
use zcipc::prelude::*;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config() -> (Config, TempDir) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::with_prefix(&format!("zps{}_{n}_", std::process::id()));
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

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
struct Pose {
    x: f64,
    y: f64,
    heading: f32,
}

unsafe impl ZeroCopySend for Pose {}

#[test]
fn samples_arrive_in_send_order() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("order"))
        .publish_subscribe::<u64>()
        .subscriber_max_buffer_size(8)
        .history_size(0)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();

    assert!(subscriber.receive().unwrap().is_none());
    for v in 0..5u64 {
        assert_eq!(publisher.send_copy(v).unwrap(), 1);
    }
    assert!(subscriber.has_samples().unwrap());
    for v in 0..5u64 {
        let sample = subscriber.receive().unwrap().expect("sample");
        assert_eq!(*sample.payload(), v);
        assert_eq!(sample.origin(), publisher.id());
        assert_eq!(sample.header().publisher_id(), publisher.id());
    }
    assert!(subscriber.receive().unwrap().is_none());
    assert!(!subscriber.has_samples().unwrap());
}

#[test]
fn struct_payload_is_shared_not_serialised() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("pose"))
        .publish_subscribe::<Pose>()
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();

    let mut sample = publisher.loan().unwrap();
    assert_eq!(*sample.payload(), Pose::default());
    sample.payload_mut().x = 1.5;
    sample.payload_mut().heading = 0.25;
    assert_eq!(sample.send().unwrap(), 1);

    let received = subscriber.receive().unwrap().unwrap();
    assert_eq!(received.payload().x, 1.5);
    assert_eq!(received.payload().heading, 0.25);
}

#[test]
fn user_header_travels_with_the_sample() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("header"))
        .publish_subscribe::<u32>()
        .user_header::<u64>()
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();

    let mut sample = publisher.loan_uninit().unwrap();
    assert_eq!(*sample.user_header(), 0);
    *sample.user_header_mut() = 0xfeed;
    sample.write_payload(42).send().unwrap();

    let received = subscriber.receive().unwrap().unwrap();
    assert_eq!(*received.user_header(), 0xfeed);
    assert_eq!(*received.payload(), 42);
}

#[test]
fn safe_overflow_replaces_the_oldest_sample() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("overflow"))
        .publish_subscribe::<u64>()
        .enable_safe_overflow(true)
        .subscriber_max_buffer_size(2)
        .history_size(0)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();

    for v in 1..=3u64 {
        publisher.send_copy(v).unwrap();
    }
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 2);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 3);
    assert!(subscriber.receive().unwrap().is_none());
}

#[test]
fn discard_strategy_drops_new_samples_when_full() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("discard"))
        .publish_subscribe::<u64>()
        .enable_safe_overflow(false)
        .subscriber_max_buffer_size(1)
        .history_size(0)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service
        .publisher_builder()
        .unable_to_deliver_strategy(UnableToDeliverStrategy::DiscardSample)
        .create()
        .unwrap();
    assert_eq!(
        publisher.unable_to_deliver_strategy(),
        UnableToDeliverStrategy::DiscardSample
    );

    assert_eq!(publisher.send_copy(1).unwrap(), 1);
    assert_eq!(publisher.send_copy(2).unwrap(), 0);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 1);
    assert!(subscriber.receive().unwrap().is_none());

    // room again
    assert_eq!(publisher.send_copy(3).unwrap(), 1);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 3);
}

#[test]
fn late_subscriber_receives_history() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("history"))
        .publish_subscribe::<u64>()
        .history_size(2)
        .subscriber_max_buffer_size(4)
        .create()
        .unwrap();
    let publisher = service.publisher_builder().create().unwrap();
    for v in 1..=3u64 {
        assert_eq!(publisher.send_copy(v).unwrap(), 0);
    }

    let subscriber = service.subscriber_builder().create().unwrap();
    publisher.update_connections().unwrap();
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 2);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 3);
    assert!(subscriber.receive().unwrap().is_none());
}

#[test]
fn late_subscriber_without_history_gets_only_new_samples() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("no_history"))
        .publish_subscribe::<u64>()
        .history_size(0)
        .subscriber_max_buffer_size(4)
        .create()
        .unwrap();
    let publisher = service.publisher_builder().create().unwrap();
    for v in 1..=3u64 {
        assert_eq!(publisher.send_copy(v).unwrap(), 0);
    }

    let subscriber = service.subscriber_builder().create().unwrap();
    publisher.update_connections().unwrap();
    subscriber.update_connections().unwrap();
    assert!(subscriber.receive().unwrap().is_none());

    assert_eq!(publisher.send_copy(9).unwrap(), 1);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 9);
    assert!(subscriber.receive().unwrap().is_none());
}

#[test]
fn borrowed_samples_are_limited() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("borrow"))
        .publish_subscribe::<u64>()
        .subscriber_max_borrowed_samples(1)
        .subscriber_max_buffer_size(4)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();
    publisher.send_copy(1).unwrap();
    publisher.send_copy(2).unwrap();

    let first = subscriber.receive().unwrap().unwrap();
    assert_eq!(subscriber.receive().err(), Some(ReceiveError::ExceedsMaxBorrows));
    drop(first);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 2);
}

#[test]
fn loans_are_limited_and_returned_on_drop() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("loans"))
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
    let publisher = service
        .publisher_builder()
        .max_loaned_samples(1)
        .create()
        .unwrap();

    let loan = publisher.loan().unwrap();
    assert_eq!(publisher.loan().err(), Some(LoanError::ExceedsMaxLoanedSamples));
    drop(loan);
    assert!(publisher.loan().is_ok());
}

#[test]
fn slices_respect_the_allocation_strategy() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("slices"))
        .publish_subscribe::<[u8]>()
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();

    let fixed = service
        .publisher_builder()
        .initial_max_slice_len(4)
        .create()
        .unwrap();
    assert_eq!(fixed.initial_max_slice_len(), 4);
    assert_eq!(fixed.loan_slice(0).err(), Some(LoanError::ExceedsMaxLoanSize));
    assert_eq!(fixed.loan_slice(5).err(), Some(LoanError::ExceedsMaxLoanSize));
    fixed.send_slice_copy(&[1, 2, 3]).unwrap();

    let received = subscriber.receive().unwrap().unwrap();
    assert_eq!(received.payload(), &[1, 2, 3]);
    assert_eq!(received.header().number_of_elements(), 3);
    drop(received);
    drop(fixed);

    let growing = service
        .publisher_builder()
        .initial_max_slice_len(4)
        .allocation_strategy(AllocationStrategy::PowerOfTwo)
        .create()
        .unwrap();
    let data: Vec<u8> = (0..10).collect();
    let mut sample = growing.loan_slice(data.len()).unwrap();
    sample.payload_mut().copy_from_slice(&data);
    sample.send().unwrap();
    assert!(growing.initial_max_slice_len() >= 10);

    let received = subscriber.receive().unwrap().unwrap();
    assert_eq!(received.payload(), data.as_slice());
}

#[test]
fn samples_outlive_their_publisher() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("outlive"))
        .publish_subscribe::<u64>()
        .subscriber_max_buffer_size(4)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let publisher = service.publisher_builder().create().unwrap();
    publisher.send_copy(7).unwrap();
    publisher.send_copy(8).unwrap();

    let held = subscriber.receive().unwrap().unwrap();
    drop(publisher);
    assert_eq!(*held.payload(), 7);
    assert_eq!(*subscriber.receive().unwrap().unwrap().payload(), 8);
    assert!(subscriber.receive().unwrap().is_none());
}

#[test]
fn ordering_holds_per_publisher() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("fifo"))
        .publish_subscribe::<u64>()
        .max_publishers(2)
        .subscriber_max_buffer_size(8)
        .history_size(0)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();
    let a = service.publisher_builder().create().unwrap();
    let b = service.publisher_builder().create().unwrap();
    for v in 0..4u64 {
        a.send_copy(v).unwrap();
        b.send_copy(100 + v).unwrap();
    }

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    while let Some(sample) = subscriber.receive().unwrap() {
        if sample.origin() == a.id() {
            from_a.push(*sample.payload());
        } else {
            assert_eq!(sample.origin(), b.id());
            from_b.push(*sample.payload());
        }
    }
    assert_eq!(from_a, [0, 1, 2, 3]);
    assert_eq!(from_b, [100, 101, 102, 103]);
}

#[test]
fn port_limits_are_enforced() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("port/limits"))
        .publish_subscribe::<u64>()
        .max_publishers(1)
        .max_subscribers(1)
        .subscriber_max_buffer_size(2)
        .create()
        .unwrap();

    let _publisher = service.publisher_builder().create().unwrap();
    assert_eq!(
        service.publisher_builder().create().err(),
        Some(PublisherCreateError::ExceedsMaxSupportedPublishers)
    );
    assert_eq!(
        service.subscriber_builder().buffer_size(3).create().err(),
        Some(SubscriberCreateError::BufferSizeExceedsMaxSupportedBufferSizeOfService)
    );
    let subscriber = service.subscriber_builder().buffer_size(1).create().unwrap();
    assert_eq!(subscriber.buffer_size(), 1);
    assert_eq!(
        service.subscriber_builder().create().err(),
        Some(SubscriberCreateError::ExceedsMaxSupportedSubscribers)
    );
}

#[test]
fn dynamic_config_lists_ports() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("dynamic"))
        .publish_subscribe::<u64>()
        .create()
        .unwrap();
    assert_eq!(service.dynamic_config().number_of_publishers(), 0);

    let publisher = service.publisher_builder().create().unwrap();
    let subscriber = service.subscriber_builder().buffer_size(2).create().unwrap();
    let dynamic = service.dynamic_config();
    assert_eq!(dynamic.number_of_publishers(), 1);
    assert_eq!(dynamic.number_of_subscribers(), 1);

    let mut publishers = Vec::new();
    dynamic.list_publishers(|p| {
        publishers.push(p.publisher_id);
        CallbackProgression::Continue
    });
    assert_eq!(publishers, [publisher.id()]);

    let mut subscribers = Vec::new();
    dynamic.list_subscribers(|s| {
        subscribers.push((s.subscriber_id, s.node_id, s.buffer_size));
        CallbackProgression::Continue
    });
    assert_eq!(subscribers, [(subscriber.id(), node.id(), 2)]);

    drop(publisher);
    assert_eq!(service.dynamic_config().number_of_publishers(), 0);
}

#[test]
fn threads_with_their_own_nodes_exchange_samples() {
    let (config, _dir) = test_config();
    let node = node(&config);
    let service = node
        .service_builder(&name("threads"))
        .publish_subscribe::<u64>()
        .enable_safe_overflow(false)
        .subscriber_max_buffer_size(4)
        .history_size(0)
        .create()
        .unwrap();
    let subscriber = service.subscriber_builder().create().unwrap();

    const N: u64 = 1_000;
    let (ready_tx, ready_rx) = mpsc::channel();
    let thread_config = config.clone();
    let sender = std::thread::spawn(move || {
        let node = NodeBuilder::new()
            .config(&thread_config)
            .signal_handling_mode(SignalHandlingMode::Disabled)
            .create()
            .unwrap();
        let service = node
            .service_builder(&ServiceName::new("threads").unwrap())
            .publish_subscribe::<u64>()
            .open()
            .unwrap();
        let publisher = service
            .publisher_builder()
            .unable_to_deliver_strategy(UnableToDeliverStrategy::Block)
            .create()
            .unwrap();
        ready_tx.send(()).unwrap();
        for v in 0..N {
            publisher.send_copy(v).unwrap();
        }
    });

    ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let mut expected = 0;
    while expected < N {
        match subscriber.receive().unwrap() {
            Some(sample) => {
                assert_eq!(*sample.payload(), expected);
                expected += 1;
            }
            None => std::thread::yield_now(),
        }
    }
    sender.join().unwrap();
}
