// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Publisher: loans chunks from its own data segment and pushes their
// offsets into one queue per connected subscriber.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::data_segment::{decode_offset, encode_offset, ChunkLayout, DataSegment, MAX_DATA_SEGMENTS};
use crate::identity::UniquePortId;
use crate::payload::{PayloadType, ZeroCopySend};
use crate::port::{
    AllocationStrategy, ConnectionFailure, LoanError, PublisherCreateError, SendError,
    UnableToDeliverStrategy,
};
use crate::platform;
use crate::sample::{Header, LoanedChunk, SampleMut, SampleMutUninit};
use crate::service::dynamic_config::{PortRecord, PortSide};
use crate::service::static_config::PublishSubscribeConfig;
use crate::service::ServiceState;
use crate::shm_name;
use crate::spin_lock::adaptive_yield;

/// Blocked sends check the subscriber process every this many retries.
const LIVENESS_CHECK_INTERVAL: u32 = 64;

struct OutgoingConnection {
    subscriber_id: UniquePortId,
    subscriber_pid: i32,
    queue: Connection,
}

struct PublisherState {
    current: Arc<DataSegment>,
    /// Outgrown segments that still have chunks in flight.
    retired: Vec<Arc<DataSegment>>,
    connections: Vec<OutgoingConnection>,
    history: VecDeque<(Arc<DataSegment>, u32)>,
    last_change_counter: Option<u64>,
}

impl PublisherState {
    fn segment(&self, index: u32) -> Option<&Arc<DataSegment>> {
        if self.current.index() == index {
            return Some(&self.current);
        }
        self.retired.iter().find(|s| s.index() == index)
    }

    fn release_offset(&self, offset: u64) {
        let (index, chunk) = decode_offset(offset);
        match self.segment(index) {
            Some(segment) => {
                segment.release(chunk);
            }
            None => log::warn!("offset {offset:#x} refers to an unknown data segment"),
        }
    }

    fn drain(&self, queue: &Connection) {
        while let Some(offset) = queue.pop() {
            self.release_offset(offset);
        }
    }

    fn drop_unused_segments(&mut self) {
        self.retired.retain(|s| s.in_use() > 0);
    }
}

/// State shared by a [`Publisher`] and the samples it loaned.
pub(crate) struct PublisherShared {
    service: Arc<ServiceState>,
    port_id: UniquePortId,
    config: PublishSubscribeConfig,
    state: Mutex<PublisherState>,
    loaned: AtomicUsize,
    max_loaned_samples: usize,
    strategy: UnableToDeliverStrategy,
    allocation_strategy: AllocationStrategy,
    chunk_count: usize,
}

impl PublisherShared {
    fn segment_name(&self, index: u32) -> String {
        DataSegment::name(
            self.service.prefix(),
            &self.service.id_hex(),
            self.port_id,
            index,
        )
    }

    fn create_segment(&self, index: u32, max_elements: usize) -> Option<Arc<DataSegment>> {
        let layout = ChunkLayout::new(&self.config.message_type_details, max_elements)?;
        match DataSegment::create(&self.segment_name(index), index, layout, self.chunk_count) {
            Ok(segment) => Some(Arc::new(segment)),
            Err(e) => {
                log::error!(
                    "publisher {}: unable to create data segment {index}: {e}",
                    self.port_id
                );
                None
            }
        }
    }

    fn connection_name(&self, subscriber_id: UniquePortId) -> String {
        shm_name::connection(
            self.service.prefix(),
            &self.service.id_hex(),
            &self.port_id.to_hex(),
            &subscriber_id.to_hex(),
        )
    }

    /// Bring the subscriber queues in line with the dynamic config.
    fn update_connections_locked(
        &self,
        state: &mut PublisherState,
    ) -> Result<(), ConnectionFailure> {
        let counter = self.service.dynamic.change_counter();
        if state.last_change_counter == Some(counter) {
            return Ok(());
        }

        let subscribers = self.service.dynamic.ports(PortSide::Consumer);

        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut state.connections)
            .into_iter()
            .partition(|c| subscribers.iter().any(|s| s.port_id == c.subscriber_id));
        state.connections = kept;
        for c in gone {
            log::debug!("publisher {}: subscriber {} left", self.port_id, c.subscriber_id);
            state.drain(&c.queue);
        }

        let mut result = Ok(());
        for s in &subscribers {
            if state.connections.iter().any(|c| c.subscriber_id == s.port_id) {
                continue;
            }
            let queue = match Connection::create(&self.connection_name(s.port_id), s.buffer_size) {
                Ok(q) => q,
                Err(e) => {
                    log::warn!(
                        "publisher {}: unable to connect to subscriber {}: {e}",
                        self.port_id,
                        s.port_id
                    );
                    result = Err(ConnectionFailure::FailedToEstablishConnection);
                    continue;
                }
            };

            // late joiners receive the most recent history that fits
            let n = state.history.len().min(queue.capacity());
            for (segment, chunk) in state.history.iter().skip(state.history.len() - n) {
                segment.retain(*chunk);
                if !queue.push(encode_offset(segment.index(), *chunk)) {
                    segment.release(*chunk);
                }
            }

            log::debug!("publisher {}: connected to subscriber {}", self.port_id, s.port_id);
            state.connections.push(OutgoingConnection {
                subscriber_id: s.port_id,
                subscriber_pid: s.pid,
                queue,
            });
        }

        if result.is_ok() {
            state.last_change_counter = Some(counter);
        }
        result
    }

    fn loan_chunk(self: &Arc<Self>, number_of_elements: usize) -> Result<LoanedChunk, LoanError> {
        if self.loaned.load(Ordering::Acquire) >= self.max_loaned_samples {
            return Err(LoanError::ExceedsMaxLoanedSamples);
        }

        let mut state = self.state.lock();
        state.drop_unused_segments();

        if number_of_elements > state.current.layout().max_elements {
            let max_elements = match self.allocation_strategy {
                AllocationStrategy::Static => return Err(LoanError::ExceedsMaxLoanSize),
                AllocationStrategy::BestFit => number_of_elements,
                AllocationStrategy::PowerOfTwo => number_of_elements
                    .checked_next_power_of_two()
                    .ok_or(LoanError::ExceedsMaxLoanSize)?,
            };
            let index = state.current.index() + 1;
            if index >= MAX_DATA_SEGMENTS {
                return Err(LoanError::OutOfMemory);
            }
            let segment = self
                .create_segment(index, max_elements)
                .ok_or(LoanError::OutOfMemory)?;
            log::debug!(
                "publisher {}: grew data segment to {max_elements} elements",
                self.port_id
            );
            let old = std::mem::replace(&mut state.current, segment);
            state.retired.push(old);
        }

        let segment = Arc::clone(&state.current);
        drop(state);

        let chunk = segment.allocate().ok_or(LoanError::OutOfMemory)?;
        unsafe {
            std::ptr::write(
                segment.header_ptr(chunk) as *mut Header,
                Header::new(self.port_id, number_of_elements as u64),
            );
        }
        self.loaned.fetch_add(1, Ordering::AcqRel);
        Ok(LoanedChunk::new(
            Arc::clone(self),
            segment,
            chunk,
            number_of_elements,
        ))
    }

    /// Take a loan back without sending it.
    pub(crate) fn return_loan(&self, segment: &DataSegment, chunk: u32) {
        segment.release(chunk);
        self.loaned.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn send_chunk(
        &self,
        segment: &Arc<DataSegment>,
        chunk: u32,
    ) -> Result<usize, SendError> {
        let mut state = self.state.lock();
        let update = self.update_connections_locked(&mut state);

        let offset = encode_offset(segment.index(), chunk);
        let mut delivered = 0;
        for c in &state.connections {
            segment.retain(chunk);
            if self.config.enable_safe_overflow {
                if let Some(evicted) = c.queue.push_overwrite(offset) {
                    state.release_offset(evicted);
                }
                delivered += 1;
                continue;
            }
            if c.queue.push(offset) {
                delivered += 1;
                continue;
            }
            match self.strategy {
                UnableToDeliverStrategy::DiscardSample => {
                    segment.release(chunk);
                }
                UnableToDeliverStrategy::Block => {
                    let mut k = 0u32;
                    let mut retries = 0u32;
                    loop {
                        adaptive_yield(&mut k);
                        if c.queue.push(offset) {
                            delivered += 1;
                            break;
                        }
                        retries = retries.wrapping_add(1);
                        if retries % LIVENESS_CHECK_INTERVAL == 0
                            && !platform::is_pid_alive(c.subscriber_pid)
                        {
                            log::warn!(
                                "publisher {}: subscriber {} died while the publisher was blocked",
                                self.port_id,
                                c.subscriber_id
                            );
                            self.service.purge_dead_ports();
                        }
                        if !self
                            .service
                            .dynamic
                            .contains_port(PortSide::Consumer, c.subscriber_id)
                        {
                            segment.release(chunk);
                            break;
                        }
                    }
                }
            }
        }

        if self.config.history_size > 0 {
            segment.retain(chunk);
            state.history.push_back((Arc::clone(segment), chunk));
            while state.history.len() > self.config.history_size {
                if let Some((old_segment, old_chunk)) = state.history.pop_front() {
                    old_segment.release(old_chunk);
                }
            }
        }

        self.return_loan(segment, chunk);
        state.drop_unused_segments();

        match update {
            Err(e) if delivered == 0 => Err(SendError::ConnectionError(e)),
            _ => Ok(delivered),
        }
    }
}

impl Drop for PublisherShared {
    fn drop(&mut self) {
        self.service
            .dynamic
            .remove_port(PortSide::Producer, self.port_id);

        let port_id = self.port_id;
        let state = self.state.get_mut();
        while let Some((segment, chunk)) = state.history.pop_front() {
            segment.release(chunk);
        }
        // queues nobody ever opened would strand their chunks
        for c in &state.connections {
            if c.queue.mapping_count() <= 1 {
                state.drain(&c.queue);
            }
        }
        state.connections.clear();
        state.drop_unused_segments();

        // subscribers that still hold chunks need the name to map the segment
        for segment in state.retired.iter_mut().chain(std::iter::once(&mut state.current)) {
            if segment.in_use() == 0 {
                continue;
            }
            match Arc::get_mut(segment) {
                Some(segment) => {
                    log::debug!(
                        "publisher {port_id}: data segment {} outlives the publisher",
                        segment.index()
                    );
                    segment.keep_on_drop();
                }
                None => log::warn!("publisher {port_id}: data segment still shared on drop"),
            }
        }
        log::debug!("publisher {port_id} dropped");
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Creates a [`Publisher`] for a publish-subscribe service.
pub struct PublisherBuilder<Payload: ?Sized, UserHeader> {
    service: Arc<ServiceState>,
    max_loaned_samples: usize,
    strategy: UnableToDeliverStrategy,
    initial_max_slice_len: usize,
    allocation_strategy: AllocationStrategy,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend + Default>
    PublisherBuilder<Payload, UserHeader>
{
    pub(crate) fn new(service: Arc<ServiceState>) -> Self {
        let defaults = &service.config().defaults.publish_subscribe;
        Self {
            max_loaned_samples: defaults.publisher_max_loaned_samples,
            strategy: defaults.unable_to_deliver_strategy,
            initial_max_slice_len: 1,
            allocation_strategy: AllocationStrategy::Static,
            service,
            _marker: PhantomData,
        }
    }

    /// How many samples may be loaned at the same time.
    pub fn max_loaned_samples(mut self, value: usize) -> Self {
        self.max_loaned_samples = value.max(1);
        self
    }

    pub fn unable_to_deliver_strategy(mut self, value: UnableToDeliverStrategy) -> Self {
        self.strategy = value;
        self
    }

    pub fn create(self) -> Result<Publisher<Payload, UserHeader>, PublisherCreateError> {
        let config = self
            .service
            .static_config
            .publish_subscribe()
            .cloned()
            .ok_or(PublisherCreateError::UnableToCreateDataSegment)?;

        let port_id = UniquePortId::new();
        let chunk_count = config.max_subscribers
            * (config.subscriber_max_buffer_size + config.subscriber_max_borrowed_samples)
            + config.history_size
            + self.max_loaned_samples
            + 1;
        let max_elements = self.initial_max_slice_len.max(1);

        let layout = ChunkLayout::new(&config.message_type_details, max_elements)
            .ok_or(PublisherCreateError::UnableToCreateDataSegment)?;
        let name = DataSegment::name(
            self.service.prefix(),
            &self.service.id_hex(),
            port_id,
            0,
        );
        let segment = DataSegment::create(&name, 0, layout, chunk_count).map_err(|e| {
            log::error!("unable to create data segment {name}: {e}");
            PublisherCreateError::UnableToCreateDataSegment
        })?;

        let added = self.service.dynamic.add_port(
            PortSide::Producer,
            PortRecord {
                port_id,
                node_id: self.service.node.id(),
                pid: crate::platform::current_pid(),
                buffer_size: 0,
            },
        );
        if !added {
            return Err(PublisherCreateError::ExceedsMaxSupportedPublishers);
        }

        let shared = Arc::new(PublisherShared {
            service: self.service,
            port_id,
            config,
            state: Mutex::new(PublisherState {
                current: Arc::new(segment),
                retired: Vec::new(),
                connections: Vec::new(),
                history: VecDeque::new(),
                last_change_counter: None,
            }),
            loaned: AtomicUsize::new(0),
            max_loaned_samples: self.max_loaned_samples,
            strategy: self.strategy,
            allocation_strategy: self.allocation_strategy,
            chunk_count,
        });

        {
            let mut state = shared.state.lock();
            if let Err(e) = shared.update_connections_locked(&mut state) {
                log::warn!("publisher {port_id}: initial connection update failed: {e}");
            }
        }
        log::debug!(
            "publisher {port_id} created on service {}",
            shared.service.static_config.name()
        );

        Ok(Publisher {
            shared,
            _marker: PhantomData,
        })
    }
}

impl<T: ZeroCopySend, UserHeader: ZeroCopySend + Default> PublisherBuilder<[T], UserHeader> {
    /// Slice length the first data segment is sized for.
    pub fn initial_max_slice_len(mut self, value: usize) -> Self {
        self.initial_max_slice_len = value.max(1);
        self
    }

    /// What to do when a loan exceeds the current maximum slice length.
    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> Self {
        self.allocation_strategy = value;
        self
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Sending port of a publish-subscribe service.
pub struct Publisher<Payload: ?Sized, UserHeader> {
    shared: Arc<PublisherShared>,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for Publisher<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.shared.port_id)
            .field("service", &self.shared.service.static_config.name())
            .finish()
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend + Default>
    Publisher<Payload, UserHeader>
{
    pub fn id(&self) -> UniquePortId {
        self.shared.port_id
    }

    pub fn unable_to_deliver_strategy(&self) -> UnableToDeliverStrategy {
        self.shared.strategy
    }

    /// Connect to subscribers that appeared since the last call and deliver
    /// history to them.
    pub fn update_connections(&self) -> Result<(), ConnectionFailure> {
        let mut state = self.shared.state.lock();
        self.shared.update_connections_locked(&mut state)
    }

    fn loan_raw<P: ?Sized + PayloadType>(
        &self,
        number_of_elements: usize,
    ) -> Result<SampleMutUninit<P, UserHeader>, LoanError> {
        let chunk = self.shared.loan_chunk(number_of_elements)?;
        let mut sample = SampleMutUninit::new(chunk);
        sample.init_user_header();
        Ok(sample)
    }
}

impl<Payload: ZeroCopySend, UserHeader: ZeroCopySend + Default> Publisher<Payload, UserHeader> {
    /// Loan a sample without initialising its payload.
    pub fn loan_uninit(&self) -> Result<SampleMutUninit<Payload, UserHeader>, LoanError> {
        self.loan_raw(1)
    }

    /// Loan a sample initialised with `Payload::default()`.
    pub fn loan(&self) -> Result<SampleMut<Payload, UserHeader>, LoanError>
    where
        Payload: Default,
    {
        Ok(self.loan_uninit()?.write_payload(Payload::default()))
    }

    /// Copy `value` into a fresh sample and send it.
    pub fn send_copy(&self, value: Payload) -> Result<usize, SendError> {
        self.loan_uninit()?.write_payload(value).send()
    }
}

impl<T: ZeroCopySend, UserHeader: ZeroCopySend + Default> Publisher<[T], UserHeader> {
    /// Largest slice that can currently be loaned without growing.
    pub fn initial_max_slice_len(&self) -> usize {
        self.shared.state.lock().current.layout().max_elements
    }

    /// Loan a slice of `len` elements without initialising them.
    pub fn loan_slice_uninit(
        &self,
        len: usize,
    ) -> Result<SampleMutUninit<[T], UserHeader>, LoanError> {
        if len == 0 {
            return Err(LoanError::ExceedsMaxLoanSize);
        }
        self.loan_raw(len)
    }

    /// Loan a slice of `len` default-initialised elements.
    pub fn loan_slice(&self, len: usize) -> Result<SampleMut<[T], UserHeader>, LoanError>
    where
        T: Default,
    {
        Ok(self.loan_slice_uninit(len)?.write_from_fn(|_| T::default()))
    }

    /// Copy `value` into a fresh sample and send it.
    pub fn send_slice_copy(&self, value: &[T]) -> Result<usize, SendError>
    where
        T: Copy,
    {
        self.loan_slice_uninit(value.len())?
            .write_from_slice(value)
            .send()
    }
}
