// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Loaned and received samples.
//
// A loan moves through `SampleMutUninit` (payload not yet written) and
// `SampleMut` (ready to send). Dropping either without sending returns the
// chunk to the publisher's pool. A received `Sample` is a read-only view
// that hands its chunk reference back when dropped.

use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;

use crate::data_segment::DataSegment;
use crate::identity::UniquePortId;
use crate::payload::{PayloadType, ZeroCopySend};
use crate::port::publisher::PublisherShared;
use crate::port::subscriber::SubscriberShared;
use crate::port::SendError;

/// Sample header written by the publisher in front of every payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    publisher_id: UniquePortId,
    number_of_elements: u64,
}

unsafe impl ZeroCopySend for Header {
    fn type_name() -> &'static str {
        "zcipc::sample::Header"
    }
}

impl Header {
    pub(crate) fn new(publisher_id: UniquePortId, number_of_elements: u64) -> Self {
        Self {
            publisher_id,
            number_of_elements,
        }
    }

    /// Port that sent the sample.
    pub fn publisher_id(&self) -> UniquePortId {
        self.publisher_id
    }

    /// 1 for fixed-size payloads, the slice length otherwise.
    pub fn number_of_elements(&self) -> u64 {
        self.number_of_elements
    }
}

// ---------------------------------------------------------------------------
// Loaned chunk
// ---------------------------------------------------------------------------

/// A chunk owned by a publisher loan. Returned to the pool on drop unless it
/// was handed to `send`.
pub(crate) struct LoanedChunk {
    publisher: Arc<PublisherShared>,
    segment: Arc<DataSegment>,
    chunk: u32,
    len: usize,
    sent: bool,
}

impl LoanedChunk {
    pub(crate) fn new(
        publisher: Arc<PublisherShared>,
        segment: Arc<DataSegment>,
        chunk: u32,
        len: usize,
    ) -> Self {
        Self {
            publisher,
            segment,
            chunk,
            len,
            sent: false,
        }
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.segment.header_ptr(self.chunk) as *const Header) }
    }

    fn user_header_ptr(&self) -> *mut u8 {
        self.segment.user_header_ptr(self.chunk)
    }

    fn payload_ptr(&self) -> *mut u8 {
        self.segment.payload_ptr(self.chunk)
    }

    fn send(mut self) -> Result<usize, SendError> {
        self.sent = true;
        self.publisher.send_chunk(&self.segment, self.chunk)
    }
}

impl Drop for LoanedChunk {
    fn drop(&mut self) {
        if !self.sent {
            self.publisher.return_loan(&self.segment, self.chunk);
        }
    }
}

// ---------------------------------------------------------------------------
// SampleMutUninit
// ---------------------------------------------------------------------------

/// A loaned sample whose payload has not been initialised.
pub struct SampleMutUninit<Payload: ?Sized, UserHeader> {
    chunk: LoanedChunk,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> SampleMutUninit<Payload, UserHeader> {
    pub(crate) fn new(chunk: LoanedChunk) -> Self {
        Self {
            chunk,
            _marker: PhantomData,
        }
    }

    pub(crate) fn init_user_header(&mut self)
    where
        UserHeader: Default,
    {
        unsafe {
            std::ptr::write(
                self.chunk.user_header_ptr() as *mut UserHeader,
                UserHeader::default(),
            )
        };
    }

    pub fn header(&self) -> &Header {
        self.chunk.header()
    }

    pub fn user_header(&self) -> &UserHeader {
        unsafe { &*(self.chunk.user_header_ptr() as *const UserHeader) }
    }

    pub fn user_header_mut(&mut self) -> &mut UserHeader {
        unsafe { &mut *(self.chunk.user_header_ptr() as *mut UserHeader) }
    }

    /// Mark the payload as written.
    ///
    /// # Safety
    /// Every element of the payload must have been initialised.
    pub unsafe fn assume_init(self) -> SampleMut<Payload, UserHeader> {
        SampleMut {
            chunk: self.chunk,
            _marker: PhantomData,
        }
    }
}

impl<Payload: ZeroCopySend, UserHeader: ZeroCopySend> SampleMutUninit<Payload, UserHeader> {
    pub fn payload(&self) -> &MaybeUninit<Payload> {
        unsafe { &*(self.chunk.payload_ptr() as *const MaybeUninit<Payload>) }
    }

    pub fn payload_mut(&mut self) -> &mut MaybeUninit<Payload> {
        unsafe { &mut *(self.chunk.payload_ptr() as *mut MaybeUninit<Payload>) }
    }

    pub fn write_payload(mut self, value: Payload) -> SampleMut<Payload, UserHeader> {
        self.payload_mut().write(value);
        unsafe { self.assume_init() }
    }
}

impl<T: ZeroCopySend, UserHeader: ZeroCopySend> SampleMutUninit<[T], UserHeader> {
    pub fn len(&self) -> usize {
        self.chunk.len
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.len == 0
    }

    pub fn payload(&self) -> &[MaybeUninit<T>] {
        unsafe {
            std::slice::from_raw_parts(
                self.chunk.payload_ptr() as *const MaybeUninit<T>,
                self.chunk.len,
            )
        }
    }

    pub fn payload_mut(&mut self) -> &mut [MaybeUninit<T>] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.chunk.payload_ptr() as *mut MaybeUninit<T>,
                self.chunk.len,
            )
        }
    }

    /// Initialise element `i` with `f(i)`.
    pub fn write_from_fn<F: FnMut(usize) -> T>(mut self, mut f: F) -> SampleMut<[T], UserHeader> {
        for (i, element) in self.payload_mut().iter_mut().enumerate() {
            element.write(f(i));
        }
        unsafe { self.assume_init() }
    }

    /// Copy `value` into the payload.
    ///
    /// # Panics
    /// When `value.len()` differs from the loaned length.
    pub fn write_from_slice(mut self, value: &[T]) -> SampleMut<[T], UserHeader>
    where
        T: Copy,
    {
        assert_eq!(
            value.len(),
            self.len(),
            "slice length must match the loaned length"
        );
        for (element, v) in self.payload_mut().iter_mut().zip(value) {
            element.write(*v);
        }
        unsafe { self.assume_init() }
    }
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for SampleMutUninit<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleMutUninit")
            .field("segment", &self.chunk.segment.index())
            .field("chunk", &self.chunk.chunk)
            .field("len", &self.chunk.len)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SampleMut
// ---------------------------------------------------------------------------

/// A loaned sample with an initialised payload, ready to be sent.
pub struct SampleMut<Payload: ?Sized, UserHeader> {
    chunk: LoanedChunk,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> SampleMut<Payload, UserHeader> {
    pub fn header(&self) -> &Header {
        self.chunk.header()
    }

    pub fn user_header(&self) -> &UserHeader {
        unsafe { &*(self.chunk.user_header_ptr() as *const UserHeader) }
    }

    pub fn user_header_mut(&mut self) -> &mut UserHeader {
        unsafe { &mut *(self.chunk.user_header_ptr() as *mut UserHeader) }
    }

    pub fn payload(&self) -> &Payload {
        unsafe { Payload::from_raw(self.chunk.payload_ptr(), self.chunk.len) }
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        unsafe { Payload::from_raw_mut(self.chunk.payload_ptr(), self.chunk.len) }
    }

    /// Deliver the sample to every connected subscriber. Returns how many
    /// subscribers received it.
    pub fn send(self) -> Result<usize, SendError> {
        self.chunk.send()
    }
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for SampleMut<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleMut")
            .field("segment", &self.chunk.segment.index())
            .field("chunk", &self.chunk.chunk)
            .field("len", &self.chunk.len)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// A received, read-only sample.
pub struct Sample<Payload: ?Sized, UserHeader> {
    subscriber: Arc<SubscriberShared>,
    segment: Arc<DataSegment>,
    chunk: u32,
    len: usize,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> Sample<Payload, UserHeader> {
    pub(crate) fn new(
        subscriber: Arc<SubscriberShared>,
        segment: Arc<DataSegment>,
        chunk: u32,
        len: usize,
    ) -> Self {
        Self {
            subscriber,
            segment,
            chunk,
            len,
            _marker: PhantomData,
        }
    }

    pub fn header(&self) -> &Header {
        unsafe { &*(self.segment.header_ptr(self.chunk) as *const Header) }
    }

    pub fn user_header(&self) -> &UserHeader {
        unsafe { &*(self.segment.user_header_ptr(self.chunk) as *const UserHeader) }
    }

    pub fn payload(&self) -> &Payload {
        unsafe { Payload::from_raw(self.segment.payload_ptr(self.chunk), self.len) }
    }

    /// Id of the publisher that sent this sample.
    pub fn origin(&self) -> UniquePortId {
        self.header().publisher_id()
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> std::ops::Deref
    for Sample<Payload, UserHeader>
{
    type Target = Payload;

    fn deref(&self) -> &Payload {
        self.payload()
    }
}

impl<Payload: ?Sized, UserHeader> Drop for Sample<Payload, UserHeader> {
    fn drop(&mut self) {
        self.segment.release(self.chunk);
        self.subscriber.release_borrow();
    }
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for Sample<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("segment", &self.segment.index())
            .field("chunk", &self.chunk)
            .field("len", &self.len)
            .finish()
    }
}
