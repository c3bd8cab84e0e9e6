// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lists the nodes and services of the default config.
//
// Usage:
//   demo_discovery            (list)
//   demo_discovery cleanup    (remove dead nodes and abandoned services first)

use zcipc::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = Config::global_config();

    if std::env::args().nth(1).as_deref() == Some("cleanup") {
        let removed = Node::cleanup_dead_nodes(config)?;
        println!("removed {removed} dead node(s)");
    }

    println!("nodes:");
    Node::list(config, |state| {
        match state {
            NodeState::Alive(view) => {
                println!("  alive  {} pid {} \"{}\"", view.id(), view.pid(), view.name())
            }
            NodeState::Dead(view) => {
                println!("  dead   {} pid {} \"{}\"", view.id(), view.pid(), view.name())
            }
            NodeState::Inaccessible(id) => println!("  ?      {id}"),
        }
        CallbackProgression::Continue
    })?;

    println!("services:");
    zcipc::service::list(config, |details| {
        let s = &details.static_details;
        let d = &details.dynamic_details;
        println!(
            "  {} {:<16} \"{}\" nodes {} producers {} consumers {}",
            s.service_id(),
            s.messaging_pattern().to_string(),
            s.name(),
            d.nodes().len(),
            d.number_of_producers(),
            d.number_of_consumers(),
        );
        for attribute in s.attributes().iter() {
            println!("      {} = {}", attribute.key(), attribute.value());
        }
        CallbackProgression::Continue
    })?;
    Ok(())
}
