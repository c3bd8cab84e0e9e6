// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Sends a rotating event id every cycle.
//
// Usage:
//   demo_notifier [service-name]       (default "MyEventName")

use std::time::Duration;

use zcipc::prelude::*;

const CYCLE_TIME: Duration = Duration::from_secs(1);
const MAX_EVENT_ID: usize = 15;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let service_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "MyEventName".to_string());

    let node = NodeBuilder::new()
        .name(&NodeName::new("demo_notifier")?)
        .create()?;
    let event = node
        .service_builder(&ServiceName::new(&service_name)?)
        .event()
        .event_id_max_value(MAX_EVENT_ID)
        .open_or_create()?;
    let notifier = event.notifier_builder().create()?;

    let mut counter: usize = 0;
    while node.wait(CYCLE_TIME).is_ok() {
        counter += 1;
        let id = EventId::new(counter % (MAX_EVENT_ID + 1));
        let reached = notifier.notify_with_custom_event_id(id)?;
        println!("sent {id} to {reached} listener(s)");
    }

    println!("exit");
    Ok(())
}
