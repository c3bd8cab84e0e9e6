// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Subscriber: reads chunk offsets from one queue per connected publisher
// and maps the publisher's data segments on first use.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::data_segment::{decode_offset, DataSegment};
use crate::identity::UniquePortId;
use crate::payload::{PayloadType, ZeroCopySend};
use crate::port::{ConnectionFailure, ReceiveError, SubscriberCreateError};
use crate::sample::{Header, Sample};
use crate::service::dynamic_config::{PortRecord, PortSide};
use crate::service::ServiceState;
use crate::shm_name;

struct IncomingConnection {
    publisher_id: UniquePortId,
    /// `None` until the publisher has created the queue.
    queue: Option<Connection>,
    segments: Vec<Arc<DataSegment>>,
    publisher_alive: bool,
}

impl IncomingConnection {
    fn has_pending(&self) -> bool {
        self.queue.as_ref().is_some_and(|q| !q.is_empty())
    }

    fn segment(&mut self, service: &ServiceState, index: u32) -> io::Result<Arc<DataSegment>> {
        if let Some(segment) = self.segments.iter().find(|s| s.index() == index) {
            return Ok(Arc::clone(segment));
        }
        let name = DataSegment::name(service.prefix(), &service.id_hex(), self.publisher_id, index);
        let segment = Arc::new(DataSegment::open(&name, index)?);
        log::debug!("mapped data segment {index} of publisher {}", self.publisher_id);
        self.segments.push(Arc::clone(&segment));
        Ok(segment)
    }

    /// Release every chunk still queued.
    fn drain(&mut self, service: &ServiceState) {
        let Some(queue) = self.queue.take() else {
            return;
        };
        while let Some(offset) = queue.pop() {
            let (index, chunk) = decode_offset(offset);
            match self.segment(service, index) {
                Ok(segment) => {
                    segment.release(chunk);
                }
                Err(e) => log::warn!(
                    "unable to release chunk {offset:#x} of publisher {}: {e}",
                    self.publisher_id
                ),
            }
        }
    }
}

struct SubscriberState {
    connections: Vec<IncomingConnection>,
    last_change_counter: Option<u64>,
    /// Round-robin cursor over `connections`.
    next: usize,
}

/// State shared by a [`Subscriber`] and the samples it handed out.
pub(crate) struct SubscriberShared {
    service: Arc<ServiceState>,
    port_id: UniquePortId,
    buffer_size: usize,
    max_borrowed_samples: usize,
    borrowed: AtomicUsize,
    state: Mutex<SubscriberState>,
}

impl SubscriberShared {
    fn connection_name(&self, publisher_id: UniquePortId) -> String {
        shm_name::connection(
            self.service.prefix(),
            &self.service.id_hex(),
            &publisher_id.to_hex(),
            &self.port_id.to_hex(),
        )
    }

    fn update_connections_locked(
        &self,
        state: &mut SubscriberState,
    ) -> Result<(), ConnectionFailure> {
        let counter = self.service.dynamic.change_counter();
        if state.last_change_counter != Some(counter) {
            let publishers = self.service.dynamic.ports(PortSide::Producer);
            for c in state.connections.iter_mut() {
                c.publisher_alive = publishers.iter().any(|p| p.port_id == c.publisher_id);
            }
            for p in &publishers {
                if !state.connections.iter().any(|c| c.publisher_id == p.port_id) {
                    log::debug!("subscriber {}: publisher {} appeared", self.port_id, p.port_id);
                    state.connections.push(IncomingConnection {
                        publisher_id: p.port_id,
                        queue: None,
                        segments: Vec::new(),
                        publisher_alive: true,
                    });
                }
            }
            state.last_change_counter = Some(counter);
        }

        // samples of a publisher that left stay receivable until drained
        state.connections.retain(|c| c.publisher_alive || c.has_pending());
        if state.next >= state.connections.len() {
            state.next = 0;
        }

        let mut result = Ok(());
        for c in state.connections.iter_mut().filter(|c| c.queue.is_none()) {
            if !c.publisher_alive {
                continue;
            }
            match Connection::open(&self.connection_name(c.publisher_id)) {
                Ok(queue) => {
                    log::debug!(
                        "subscriber {}: connected to publisher {}",
                        self.port_id,
                        c.publisher_id
                    );
                    c.queue = Some(queue);
                }
                // the publisher connects on its next send or update
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::WouldBlock) => {}
                Err(e) => {
                    log::warn!(
                        "subscriber {}: unable to open connection to publisher {}: {e}",
                        self.port_id,
                        c.publisher_id
                    );
                    result = Err(ConnectionFailure::FailedToEstablishConnection);
                }
            }
        }
        result
    }

    fn has_samples(&self) -> Result<bool, ConnectionFailure> {
        let mut state = self.state.lock();
        self.update_connections_locked(&mut state)?;
        Ok(state.connections.iter().any(|c| c.has_pending()))
    }

    /// Pop the next chunk, visiting publishers round-robin.
    fn receive_chunk(&self) -> Result<Option<(Arc<DataSegment>, u32, usize)>, ReceiveError> {
        let mut state = self.state.lock();
        let update = self.update_connections_locked(&mut state);

        if self.borrowed.load(Ordering::Acquire) >= self.max_borrowed_samples {
            if state.connections.iter().any(|c| c.has_pending()) {
                return Err(ReceiveError::ExceedsMaxBorrows);
            }
            return Ok(None);
        }

        let n = state.connections.len();
        for k in 0..n {
            let i = (state.next + k) % n;
            let Some(offset) = state.connections[i].queue.as_ref().and_then(|q| q.pop()) else {
                continue;
            };
            state.next = (i + 1) % n;

            let (index, chunk) = decode_offset(offset);
            let connection = &mut state.connections[i];
            let segment = connection.segment(&self.service, index).map_err(|e| {
                log::error!(
                    "subscriber {}: unable to map data segment {index} of publisher {}: {e}",
                    self.port_id,
                    connection.publisher_id
                );
                ReceiveError::UnableToMapPublishersDataSegment
            })?;
            if !segment.contains(chunk) {
                log::error!(
                    "subscriber {}: publisher {} sent chunk {chunk} outside its segment",
                    self.port_id,
                    connection.publisher_id
                );
                return Err(ReceiveError::UnableToMapPublishersDataSegment);
            }

            let header = unsafe { &*(segment.header_ptr(chunk) as *const Header) };
            let len = header.number_of_elements() as usize;
            if len > segment.layout().max_elements {
                log::error!(
                    "subscriber {}: sample of {len} elements exceeds its segment",
                    self.port_id
                );
                segment.release(chunk);
                return Err(ReceiveError::UnableToMapPublishersDataSegment);
            }

            self.borrowed.fetch_add(1, Ordering::AcqRel);
            return Ok(Some((segment, chunk, len)));
        }

        match update {
            Err(_) => Err(ReceiveError::FailedToEstablishConnection),
            Ok(()) => Ok(None),
        }
    }

    /// A received sample was dropped.
    pub(crate) fn release_borrow(&self) {
        self.borrowed.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for SubscriberShared {
    fn drop(&mut self) {
        self.service
            .dynamic
            .remove_port(PortSide::Consumer, self.port_id);

        let state = self.state.get_mut();
        for c in state.connections.iter_mut() {
            c.drain(&self.service);
        }
        state.connections.clear();
        log::debug!("subscriber {} dropped", self.port_id);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Creates a [`Subscriber`] for a publish-subscribe service.
pub struct SubscriberBuilder<Payload: ?Sized, UserHeader> {
    service: Arc<ServiceState>,
    buffer_size: Option<usize>,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend>
    SubscriberBuilder<Payload, UserHeader>
{
    pub(crate) fn new(service: Arc<ServiceState>) -> Self {
        Self {
            service,
            buffer_size: None,
            _marker: PhantomData,
        }
    }

    /// Capacity of this subscriber's queues. Defaults to the service's
    /// maximum buffer size.
    pub fn buffer_size(mut self, value: usize) -> Self {
        self.buffer_size = Some(value);
        self
    }

    pub fn create(self) -> Result<Subscriber<Payload, UserHeader>, SubscriberCreateError> {
        let config = self
            .service
            .static_config
            .publish_subscribe()
            .ok_or(SubscriberCreateError::ExceedsMaxSupportedSubscribers)?;

        let max_buffer_size = config.subscriber_max_buffer_size;
        let buffer_size = match self.buffer_size {
            Some(n) if n > max_buffer_size => {
                log::warn!(
                    "subscriber buffer size {n} exceeds the service maximum {max_buffer_size}"
                );
                return Err(SubscriberCreateError::BufferSizeExceedsMaxSupportedBufferSizeOfService);
            }
            Some(n) => n.max(1),
            None => max_buffer_size,
        };
        let max_borrowed_samples = config.subscriber_max_borrowed_samples;

        let port_id = UniquePortId::new();
        let added = self.service.dynamic.add_port(
            PortSide::Consumer,
            PortRecord {
                port_id,
                node_id: self.service.node.id(),
                pid: crate::platform::current_pid(),
                buffer_size,
            },
        );
        if !added {
            return Err(SubscriberCreateError::ExceedsMaxSupportedSubscribers);
        }
        log::debug!(
            "subscriber {port_id} created on service {}",
            self.service.static_config.name()
        );

        Ok(Subscriber {
            shared: Arc::new(SubscriberShared {
                service: self.service,
                port_id,
                buffer_size,
                max_borrowed_samples,
                borrowed: AtomicUsize::new(0),
                state: Mutex::new(SubscriberState {
                    connections: Vec::new(),
                    last_change_counter: None,
                    next: 0,
                }),
            }),
            _marker: PhantomData,
        })
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Receiving port of a publish-subscribe service.
pub struct Subscriber<Payload: ?Sized, UserHeader> {
    shared: Arc<SubscriberShared>,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for Subscriber<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.shared.port_id)
            .field("service", &self.shared.service.static_config.name())
            .field("buffer_size", &self.shared.buffer_size)
            .finish()
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> Subscriber<Payload, UserHeader> {
    pub fn id(&self) -> UniquePortId {
        self.shared.port_id
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Take the oldest pending sample, or `None` when every queue is empty.
    /// Never blocks.
    pub fn receive(&self) -> Result<Option<Sample<Payload, UserHeader>>, ReceiveError> {
        Ok(self
            .shared
            .receive_chunk()?
            .map(|(segment, chunk, len)| Sample::new(Arc::clone(&self.shared), segment, chunk, len)))
    }

    /// `true` when at least one sample is waiting. Does not consume it.
    pub fn has_samples(&self) -> Result<bool, ConnectionFailure> {
        self.shared.has_samples()
    }

    /// Pick up publishers that appeared or left since the last call.
    pub fn update_connections(&self) -> Result<(), ConnectionFailure> {
        let mut state = self.shared.state.lock();
        self.shared.update_connections_locked(&mut state)
    }
}
