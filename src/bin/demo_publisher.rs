// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Publishes a TransmissionData sample every cycle.
//
// Usage:
//   demo_publisher [service-name]      (default "My/Funk/ServiceName")
//
// Start demo_subscriber in another terminal to receive the samples. Ctrl-C
// or SIGTERM stops the loop. Set RUST_LOG=debug for middleware logs.

use std::time::Duration;

use zcipc::prelude::*;

const CYCLE_TIME: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
struct TransmissionData {
    x: i32,
    y: i32,
    funky: f64,
}

// Same layout as in demo_subscriber, which lives in another binary.
unsafe impl ZeroCopySend for TransmissionData {
    fn type_name() -> &'static str {
        "TransmissionData"
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let service_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "My/Funk/ServiceName".to_string());

    let node = NodeBuilder::new()
        .name(&NodeName::new("demo_publisher")?)
        .create()?;
    let service = node
        .service_builder(&ServiceName::new(&service_name)?)
        .publish_subscribe::<TransmissionData>()
        .open_or_create()?;
    let publisher = service.publisher_builder().create()?;
    println!("publishing on \"{service_name}\" as {}", publisher.id());

    let mut counter: u64 = 0;
    while node.wait(CYCLE_TIME).is_ok() {
        counter += 1;
        let sample = publisher.loan_uninit()?.write_payload(TransmissionData {
            x: counter as i32,
            y: counter as i32 * 3,
            funky: counter as f64 * 812.12,
        });
        let delivered = sample.send()?;
        println!("sent sample {counter} to {delivered} subscriber(s)");
    }

    println!("exit");
    Ok(())
}
