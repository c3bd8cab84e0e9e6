// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Notifier: sets event bits of every listener of a service and rings their
// doorbells.

use std::fmt;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::UniquePortId;
use crate::platform;
use crate::port::listener::{socket_path, EventBits};
use crate::port::{EventId, NotifierCreateError, NotifierNotifyError};
use crate::service::dynamic_config::{PortRecord, PortSide};
use crate::service::ServiceState;
use crate::shm_name;

struct ListenerConnection {
    listener_id: UniquePortId,
    bits: EventBits,
    path: PathBuf,
}

struct NotifierState {
    connections: Vec<ListenerConnection>,
    last_change_counter: Option<u64>,
}

/// Creates a [`Notifier`] for an event service.
#[derive(Debug)]
pub struct NotifierBuilder {
    service: Arc<ServiceState>,
    default_event_id: EventId,
}

impl NotifierBuilder {
    pub(crate) fn new(service: Arc<ServiceState>) -> Self {
        Self {
            service,
            default_event_id: EventId::default(),
        }
    }

    /// Id sent by [`Notifier::notify`].
    pub fn default_event_id(mut self, value: EventId) -> Self {
        self.default_event_id = value;
        self
    }

    pub fn create(self) -> Result<Notifier, NotifierCreateError> {
        let event = self
            .service
            .static_config
            .event()
            .cloned()
            .ok_or(NotifierCreateError::InternalFailure)?;

        let socket = UnixDatagram::unbound()
            .and_then(|s| s.set_nonblocking(true).map(|()| s))
            .map_err(|e| {
                log::error!("unable to create notifier socket: {e}");
                NotifierCreateError::InternalFailure
            })?;

        let port_id = UniquePortId::new();
        let added = self.service.dynamic.add_port(
            PortSide::Producer,
            PortRecord {
                port_id,
                node_id: self.service.node.id(),
                pid: platform::current_pid(),
                buffer_size: 0,
            },
        );
        if !added {
            return Err(NotifierCreateError::ExceedsMaxSupportedNotifiers);
        }
        log::debug!(
            "notifier {port_id} created on service {}",
            self.service.static_config.name()
        );

        let notifier = Notifier {
            service: self.service,
            port_id,
            default_event_id: self.default_event_id,
            event_id_max_value: event.event_id_max_value,
            dropped_event: event.notifier_dropped_event.map(EventId::new),
            socket,
            state: Mutex::new(NotifierState {
                connections: Vec::new(),
                last_change_counter: None,
            }),
        };

        if let Some(id) = event.notifier_created_event {
            if let Err(e) = notifier.notify_with_custom_event_id(EventId::new(id)) {
                log::warn!("notifier {port_id}: unable to announce its creation: {e}");
            }
        }
        Ok(notifier)
    }
}

/// Sending port of an event service.
pub struct Notifier {
    service: Arc<ServiceState>,
    port_id: UniquePortId,
    default_event_id: EventId,
    event_id_max_value: usize,
    dropped_event: Option<EventId>,
    socket: UnixDatagram,
    state: Mutex<NotifierState>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.port_id)
            .field("service", &self.service.static_config.name())
            .field("default_event_id", &self.default_event_id)
            .finish()
    }
}

impl Notifier {
    pub fn id(&self) -> UniquePortId {
        self.port_id
    }

    pub fn default_event_id(&self) -> EventId {
        self.default_event_id
    }

    fn update_connections_locked(&self, state: &mut NotifierState) {
        let counter = self.service.dynamic.change_counter();
        if state.last_change_counter == Some(counter) {
            return;
        }
        let listeners = self.service.dynamic.ports(PortSide::Consumer);
        state
            .connections
            .retain(|c| listeners.iter().any(|l| l.port_id == c.listener_id));

        let mut complete = true;
        for l in &listeners {
            if state.connections.iter().any(|c| c.listener_id == l.port_id) {
                continue;
            }
            let name = shm_name::listener_events(
                self.service.prefix(),
                &self.service.id_hex(),
                &l.port_id.to_hex(),
            );
            match EventBits::open(&name) {
                Ok(bits) => state.connections.push(ListenerConnection {
                    listener_id: l.port_id,
                    bits,
                    path: socket_path(&self.service, l.port_id),
                }),
                Err(e) => {
                    log::debug!(
                        "notifier {}: listener {} not reachable yet: {e}",
                        self.port_id,
                        l.port_id
                    );
                    complete = false;
                }
            }
        }
        if complete {
            state.last_change_counter = Some(counter);
        }
    }

    /// Send the default event id. Returns how many listeners were reached.
    pub fn notify(&self) -> Result<usize, NotifierNotifyError> {
        self.notify_with_custom_event_id(self.default_event_id)
    }

    /// Send `id` to every listener. Returns how many listeners were reached.
    pub fn notify_with_custom_event_id(&self, id: EventId) -> Result<usize, NotifierNotifyError> {
        if id.as_value() > self.event_id_max_value {
            return Err(NotifierNotifyError::EventIdOutOfBounds);
        }

        let mut state = self.state.lock();
        self.update_connections_locked(&mut state);

        let mut reached = 0;
        for c in &state.connections {
            if !c.bits.set(id.as_value()) {
                log::warn!(
                    "notifier {}: listener {} cannot hold {id}",
                    self.port_id,
                    c.listener_id
                );
                continue;
            }
            match self.socket.send_to(&[1], &c.path) {
                Ok(_) => {}
                // a full socket buffer already guarantees a wake-up
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::debug!(
                        "notifier {}: doorbell of listener {} failed: {e}",
                        self.port_id,
                        c.listener_id
                    );
                    continue;
                }
            }
            reached += 1;
        }
        Ok(reached)
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Some(id) = self.dropped_event {
            if let Err(e) = self.notify_with_custom_event_id(id) {
                log::warn!("notifier {}: unable to announce its drop: {e}", self.port_id);
            }
        }
        self.service
            .dynamic
            .remove_port(PortSide::Producer, self.port_id);
        log::debug!("notifier {} dropped", self.port_id);
    }
}
