// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Prints every TransmissionData sample received.
//
// Usage:
//   demo_subscriber [service-name]     (default "My/Funk/ServiceName")

use std::time::Duration;

use zcipc::prelude::*;

const CYCLE_TIME: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
struct TransmissionData {
    x: i32,
    y: i32,
    funky: f64,
}

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
        .name(&NodeName::new("demo_subscriber")?)
        .create()?;
    let service = node
        .service_builder(&ServiceName::new(&service_name)?)
        .publish_subscribe::<TransmissionData>()
        .open_or_create()?;
    let subscriber = service.subscriber_builder().create()?;
    println!("subscribed to \"{service_name}\" as {}", subscriber.id());

    while node.wait(CYCLE_TIME).is_ok() {
        while let Some(sample) = subscriber.receive()? {
            println!("received {:?} from {}", *sample.payload(), sample.origin());
        }
    }

    println!("exit");
    Ok(())
}
