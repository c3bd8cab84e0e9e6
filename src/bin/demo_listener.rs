// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Waits for events on a WaitSet and reports silence as a missed deadline.
//
// Usage:
//   demo_listener [service-name]       (default "MyEventName")

use std::time::Duration;

use zcipc::prelude::*;

const DEADLINE: Duration = Duration::from_secs(3);
const MAX_EVENT_ID: usize = 15;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let service_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "MyEventName".to_string());

    let node = NodeBuilder::new()
        .name(&NodeName::new("demo_listener")?)
        .create()?;
    let event = node
        .service_builder(&ServiceName::new(&service_name)?)
        .event()
        .event_id_max_value(MAX_EVENT_ID)
        .open_or_create()?;
    let listener = event.listener_builder().create()?;

    let waitset = WaitSetBuilder::new().create()?;
    let guard = waitset.attach_deadline(&listener, DEADLINE)?;
    println!("waiting for events on \"{service_name}\"");

    let result = waitset.wait_and_process(|id| {
        if id.has_event_from(&guard) {
            if let Err(e) = listener.try_wait_all(|event_id| println!("received {event_id}")) {
                eprintln!("listener failed: {e}");
                return CallbackProgression::Stop;
            }
        } else if id.has_missed_deadline(&guard) {
            println!("no event within {DEADLINE:?}");
        }
        CallbackProgression::Continue
    })?;

    println!("exit ({result:?})");
    Ok(())
}
