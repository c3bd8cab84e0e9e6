// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-publisher payload pool.
//
// Shared-memory layout:
//
//   [ SegmentHeader ]
//   [ next: u32 × chunk_count ]          free-list links
//   [ chunk ] × chunk_count              starting at `chunks_offset`
//
// Each chunk:
//
//   [ refs: AtomicU32 | pad ]            holders of the chunk
//   [ sample header ]                    at `header_offset`
//   [ user header ]                      at `user_header_offset`
//   [ payload × max_elements ]           at `payload_offset`
//
// The free list is protected by the in-segment spin lock; reference counts
// are plain atomics. Whoever drops the count to zero (publisher or any
// subscriber process) pushes the chunk back onto the free list.
//
// A publisher that outgrows its segment creates a new one with the next
// index; chunks are addressed by `(segment index << 32) | chunk index`.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::identity::UniquePortId;
use crate::service::static_config::MessageTypeDetails;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::shm_name;
use crate::spin_lock::SpinLock;

/// Number of segments a publisher may create over its lifetime.
pub(crate) const MAX_DATA_SEGMENTS: u32 = 256;

const NO_CHUNK: u32 = u32::MAX;
const CHUNK_CTL: usize = 8;
const MIN_CHUNK_ALIGN: usize = 8;

#[repr(C)]
struct SegmentHeader {
    lock: SpinLock,
    ready: AtomicU32,
    free_head: u32,
    chunk_count: u32,
    in_use: AtomicU32,
    _reserved: u32,
    chunk_size: u64,
    chunk_align: u64,
    chunks_offset: u64,
    header_offset: u64,
    user_header_offset: u64,
    payload_offset: u64,
    max_elements: AtomicU64,
}

const fn align_up(v: usize, a: usize) -> usize {
    (v + a - 1) / a * a
}

fn checked_align_up(v: usize, a: usize) -> Option<usize> {
    Some(v.checked_add(a - 1)? / a * a)
}

/// Where the parts of a sample live inside one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkLayout {
    pub(crate) header_offset: usize,
    pub(crate) user_header_offset: usize,
    pub(crate) payload_offset: usize,
    pub(crate) chunk_size: usize,
    pub(crate) chunk_align: usize,
    pub(crate) max_elements: usize,
}

impl ChunkLayout {
    /// `None` when the chunk size overflows.
    pub(crate) fn new(types: &MessageTypeDetails, max_elements: usize) -> Option<Self> {
        let header = types.header();
        let user_header = types.user_header();
        let payload = types.payload();

        let chunk_align = MIN_CHUNK_ALIGN
            .max(header.alignment())
            .max(user_header.alignment())
            .max(payload.alignment());

        let header_offset = align_up(CHUNK_CTL, header.alignment());
        let user_header_offset =
            align_up(header_offset + header.size(), user_header.alignment().max(1));
        let payload_offset = checked_align_up(
            user_header_offset + user_header.size(),
            payload.alignment().max(1),
        )?;
        let payload_bytes = payload.size().checked_mul(max_elements)?;
        let chunk_size = checked_align_up(payload_offset.checked_add(payload_bytes)?, chunk_align)?;

        Some(Self {
            header_offset,
            user_header_offset,
            payload_offset,
            chunk_size,
            chunk_align,
            max_elements,
        })
    }
}

/// Encode a chunk address for the connection queues.
pub(crate) fn encode_offset(segment: u32, chunk: u32) -> u64 {
    ((segment as u64) << 32) | chunk as u64
}

pub(crate) fn decode_offset(offset: u64) -> (u32, u32) {
    ((offset >> 32) as u32, offset as u32)
}

pub(crate) struct DataSegment {
    shm: ShmHandle,
    index: u32,
    layout: ChunkLayout,
    chunk_count: u32,
    chunks_offset: usize,
}

// Safety: the free list is guarded by the spin lock, reference counts are
// atomics, and chunk contents are owned by exactly one writer at a time.
unsafe impl Send for DataSegment {}
unsafe impl Sync for DataSegment {}

impl DataSegment {
    pub(crate) fn name(prefix: &str, service: &str, publisher: UniquePortId, index: u32) -> String {
        shm_name::data_segment(prefix, service, &publisher.to_hex(), index)
    }

    /// Create segment `index` of a publisher with `chunk_count` chunks.
    pub(crate) fn create(
        name: &str,
        index: u32,
        layout: ChunkLayout,
        chunk_count: usize,
    ) -> io::Result<Self> {
        let chunk_count = u32::try_from(chunk_count)
            .ok()
            .filter(|&c| c > 0 && c != NO_CHUNK)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk count"))?;

        let links = std::mem::size_of::<SegmentHeader>() + chunk_count as usize * 4;
        let chunks_offset = align_up(links, layout.chunk_align);
        let size = (chunk_count as usize)
            .checked_mul(layout.chunk_size)
            .and_then(|s| s.checked_add(chunks_offset))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "segment too large"))?;

        let shm = ShmHandle::acquire(name, size, ShmOpenMode::Create)?;
        let segment = Self {
            shm,
            index,
            layout,
            chunk_count,
            chunks_offset,
        };

        let hdr = segment.raw();
        unsafe {
            (*hdr).free_head = 0;
            (*hdr).chunk_count = chunk_count;
            (*hdr).chunk_size = layout.chunk_size as u64;
            (*hdr).chunk_align = layout.chunk_align as u64;
            (*hdr).chunks_offset = chunks_offset as u64;
            (*hdr).header_offset = layout.header_offset as u64;
            (*hdr).user_header_offset = layout.user_header_offset as u64;
            (*hdr).payload_offset = layout.payload_offset as u64;
            (*hdr)
                .max_elements
                .store(layout.max_elements as u64, Ordering::Relaxed);
        }
        for i in 0..chunk_count {
            let next = if i + 1 < chunk_count { i + 1 } else { NO_CHUNK };
            unsafe { *segment.next_ptr(i) = next };
        }
        segment.hdr().ready.store(1, Ordering::Release);
        Ok(segment)
    }

    /// Map a segment created by another process.
    pub(crate) fn open(name: &str, index: u32) -> io::Result<Self> {
        let shm = ShmHandle::open_existing(name)?;
        if shm.user_size() < std::mem::size_of::<SegmentHeader>() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "data segment not sized"));
        }
        let hdr = unsafe { &*(shm.get() as *const SegmentHeader) };
        if hdr.ready.load(Ordering::Acquire) == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "data segment not ready"));
        }

        let layout = ChunkLayout {
            header_offset: hdr.header_offset as usize,
            user_header_offset: hdr.user_header_offset as usize,
            payload_offset: hdr.payload_offset as usize,
            chunk_size: hdr.chunk_size as usize,
            chunk_align: hdr.chunk_align as usize,
            max_elements: hdr.max_elements.load(Ordering::Relaxed) as usize,
        };
        let chunk_count = hdr.chunk_count;
        let chunks_offset = hdr.chunks_offset as usize;
        let end = (chunk_count as usize)
            .checked_mul(layout.chunk_size)
            .and_then(|s| s.checked_add(chunks_offset));
        if end.map_or(true, |end| end > shm.user_size()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "data segment header does not match its size",
            ));
        }

        Ok(Self {
            shm,
            index,
            layout,
            chunk_count,
            chunks_offset,
        })
    }

    /// Unlink every segment name a publisher could have created.
    pub(crate) fn remove_all(prefix: &str, service: &str, publisher: UniquePortId) {
        for index in 0..MAX_DATA_SEGMENTS {
            if ShmHandle::unlink_by_name(&Self::name(prefix, service, publisher, index)) {
                log::debug!("removed data segment {index} of publisher {publisher}");
            }
        }
    }

    fn hdr(&self) -> &SegmentHeader {
        unsafe { &*(self.shm.get() as *const SegmentHeader) }
    }

    fn raw(&self) -> *mut SegmentHeader {
        self.shm.get() as *mut SegmentHeader
    }

    fn next_ptr(&self, chunk: u32) -> *mut u32 {
        unsafe {
            (self.shm.get().add(std::mem::size_of::<SegmentHeader>()) as *mut u32)
                .add(chunk as usize)
        }
    }

    fn refs(&self, chunk: u32) -> &AtomicU32 {
        unsafe { &*(self.chunk_ptr(chunk) as *const AtomicU32) }
    }

    /// Leave the name in place when this handle is the last mapping.
    pub(crate) fn keep_on_drop(&mut self) {
        self.shm.keep_on_drop();
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunk_count as usize
    }

    /// Chunks currently held by anyone.
    pub(crate) fn in_use(&self) -> usize {
        self.hdr().in_use.load(Ordering::Acquire) as usize
    }

    pub(crate) fn contains(&self, chunk: u32) -> bool {
        chunk < self.chunk_count
    }

    /// Pop a free chunk; its reference count starts at one.
    pub(crate) fn allocate(&self) -> Option<u32> {
        let chunk = {
            let _guard = self.hdr().lock.lock();
            let hdr = self.raw();
            let head = unsafe { (*hdr).free_head };
            if head == NO_CHUNK {
                return None;
            }
            unsafe { (*hdr).free_head = *self.next_ptr(head) };
            head
        };
        self.refs(chunk).store(1, Ordering::Release);
        self.hdr().in_use.fetch_add(1, Ordering::AcqRel);
        Some(chunk)
    }

    pub(crate) fn retain(&self, chunk: u32) {
        self.refs(chunk).fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference; returns `true` when the chunk went back to the
    /// free list.
    pub(crate) fn release(&self, chunk: u32) -> bool {
        if !self.contains(chunk) {
            return false;
        }
        let prev = self.refs(chunk).fetch_sub(1, Ordering::AcqRel);
        if prev != 1 {
            return false;
        }
        {
            let _guard = self.hdr().lock.lock();
            let hdr = self.raw();
            unsafe {
                *self.next_ptr(chunk) = (*hdr).free_head;
                (*hdr).free_head = chunk;
            }
        }
        self.hdr().in_use.fetch_sub(1, Ordering::AcqRel);
        true
    }

    pub(crate) fn chunk_ptr(&self, chunk: u32) -> *mut u8 {
        debug_assert!(self.contains(chunk));
        unsafe {
            self.shm
                .get()
                .add(self.chunks_offset + chunk as usize * self.layout.chunk_size)
        }
    }

    pub(crate) fn header_ptr(&self, chunk: u32) -> *mut u8 {
        unsafe { self.chunk_ptr(chunk).add(self.layout.header_offset) }
    }

    pub(crate) fn user_header_ptr(&self, chunk: u32) -> *mut u8 {
        unsafe { self.chunk_ptr(chunk).add(self.layout.user_header_offset) }
    }

    pub(crate) fn payload_ptr(&self, chunk: u32) -> *mut u8 {
        unsafe { self.chunk_ptr(chunk).add(self.layout.payload_offset) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadType;
    use crate::sample::Header;
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name() -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("zcipc_ut_data_{}_{n}", std::process::id())
    }

    fn layout_for<P: PayloadType + ?Sized, U: PayloadType>(max_elements: usize) -> ChunkLayout {
        let types = MessageTypeDetails::new(
            <Header as PayloadType>::type_detail(),
            U::type_detail(),
            P::type_detail(),
        );
        ChunkLayout::new(&types, max_elements).unwrap()
    }

    #[test]
    fn layout_respects_alignment_of_every_part() {
        let l = layout_for::<u128, u8>(1);
        assert_eq!(l.header_offset % std::mem::align_of::<Header>(), 0);
        assert_eq!(l.payload_offset % std::mem::align_of::<u128>(), 0);
        assert_eq!(l.chunk_size % l.chunk_align, 0);
        assert!(l.payload_offset >= l.user_header_offset + 1);

        let slice = layout_for::<[u32], ()>(10);
        assert!(slice.chunk_size >= slice.payload_offset + 40);
    }

    #[test]
    fn layout_rejects_overflowing_slices() {
        let types = MessageTypeDetails::new(
            <Header as PayloadType>::type_detail(),
            <() as PayloadType>::type_detail(),
            <[u64] as PayloadType>::type_detail(),
        );
        assert!(ChunkLayout::new(&types, usize::MAX / 2).is_none());
    }

    #[test]
    fn offsets_round_trip() {
        assert_eq!(decode_offset(encode_offset(3, 77)), (3, 77));
        assert_eq!(decode_offset(encode_offset(0, 0)), (0, 0));
    }

    #[test]
    fn chunks_are_recycled_after_last_release() {
        let name = unique_name();
        let seg = DataSegment::create(&name, 0, layout_for::<u64, ()>(1), 2).unwrap();

        let a = seg.allocate().unwrap();
        let b = seg.allocate().unwrap();
        assert_ne!(a, b);
        assert!(seg.allocate().is_none());
        assert_eq!(seg.in_use(), 2);

        seg.retain(a);
        assert!(!seg.release(a));
        assert!(seg.release(a));
        assert_eq!(seg.in_use(), 1);
        assert_eq!(seg.allocate(), Some(a));
    }

    #[test]
    fn other_mapping_sees_layout_and_writes() {
        let name = unique_name();
        let layout = layout_for::<[u16], u32>(8);
        let seg = DataSegment::create(&name, 4, layout, 3).unwrap();
        let other = DataSegment::open(&name, 4).unwrap();
        assert_eq!(other.layout(), &layout);
        assert_eq!(other.chunk_count(), 3);

        let c = seg.allocate().unwrap();
        unsafe { *(seg.payload_ptr(c) as *mut u16) = 0xbeef };
        assert_eq!(unsafe { *(other.payload_ptr(c) as *const u16) }, 0xbeef);
        other.retain(c);
        assert!(!seg.release(c));
        assert!(other.release(c));
        assert_eq!(seg.in_use(), 0);
    }
}
