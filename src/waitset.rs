// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-threaded multiplexer over listeners and timers.
//
// Listener attachments are polled through their doorbell descriptor; timers
// are folded into the poll timeout. One wait cycle:
//
//   1. compute the nearest timer due time
//   2. poll every attached descriptor until then (or the caller's timeout)
//   3. collect fired attachments, in attachment order
//   4. invoke the callback once per fired attachment

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use crate::platform;
use crate::signal::{self, SignalHandlingMode, SignalState};
use crate::CallbackProgression;

/// Maximum number of attachments per WaitSet.
pub const WAITSET_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitSetCreateError {
    #[error("internal failure while creating the waitset")]
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitSetAttachmentError {
    #[error("the waitset has no capacity left")]
    InsufficientCapacity,
    #[error("the attachment is already attached to the waitset")]
    AlreadyAttached,
    #[error("internal failure while attaching to the waitset")]
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitSetRunError {
    #[error("insufficient permissions to wait on an attachment")]
    InsufficientPermissions,
    #[error("internal failure while waiting")]
    InternalError,
    #[error("the waitset has no attachments")]
    NoAttachments,
}

/// Why a wait call returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSetRunResult {
    TerminationRequest,
    Interrupt,
    /// The callback returned [`CallbackProgression::Stop`].
    StopRequest,
    AllEventsHandled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Reason {
    Event,
    MissedDeadline,
}

/// Identifies the attachment that fired and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId {
    index: u64,
    reason: Reason,
}

impl AttachmentId {
    /// Id of an event of the attachment behind `guard`.
    pub fn from_guard(guard: &WaitSetGuard<'_, '_>) -> Self {
        Self {
            index: guard.index,
            reason: Reason::Event,
        }
    }

    /// The attachment behind `guard` received an event or its interval elapsed.
    pub fn has_event_from(&self, guard: &WaitSetGuard<'_, '_>) -> bool {
        self.index == guard.index && self.reason == Reason::Event
    }

    /// The deadline attachment behind `guard` saw no event in time.
    pub fn has_missed_deadline(&self, guard: &WaitSetGuard<'_, '_>) -> bool {
        self.index == guard.index && self.reason == Reason::MissedDeadline
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Notification { fd: RawFd },
    Deadline { fd: RawFd, period: Duration },
    Interval { period: Duration },
}

impl Kind {
    fn fd(&self) -> Option<RawFd> {
        match *self {
            Self::Notification { fd } | Self::Deadline { fd, .. } => Some(fd),
            Self::Interval { .. } => None,
        }
    }
}

#[derive(Debug)]
struct Attachment {
    index: u64,
    kind: Kind,
    next_due: Option<Instant>,
}

/// Keeps an attachment alive. Dropping it detaches.
pub struct WaitSetGuard<'waitset, 'attachment> {
    waitset: &'waitset WaitSet,
    index: u64,
    _attachment: PhantomData<&'attachment ()>,
}

impl fmt::Debug for WaitSetGuard<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSetGuard").field("index", &self.index).finish()
    }
}

impl Drop for WaitSetGuard<'_, '_> {
    fn drop(&mut self) {
        self.waitset.detach(self.index);
    }
}

/// Builds a [`WaitSet`].
#[derive(Debug, Default)]
pub struct WaitSetBuilder {
    signal_handling_mode: SignalHandlingMode,
}

impl WaitSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_handling_mode(mut self, value: SignalHandlingMode) -> Self {
        self.signal_handling_mode = value;
        self
    }

    pub fn create(self) -> Result<WaitSet, WaitSetCreateError> {
        if self.signal_handling_mode == SignalHandlingMode::HandleTerminationRequests {
            signal::install_handlers();
        }
        Ok(WaitSet {
            attachments: RefCell::new(Vec::new()),
            next_index: Cell::new(0),
            signal_handling_mode: self.signal_handling_mode,
        })
    }
}

/// Waits on listeners, deadlines and intervals from one thread.
pub struct WaitSet {
    attachments: RefCell<Vec<Attachment>>,
    next_index: Cell<u64>,
    signal_handling_mode: SignalHandlingMode,
}

impl fmt::Debug for WaitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSet")
            .field("len", &self.len())
            .field("signal_handling_mode", &self.signal_handling_mode)
            .finish()
    }
}

impl WaitSet {
    pub fn len(&self) -> usize {
        self.attachments.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.borrow().is_empty()
    }

    pub fn capacity(&self) -> usize {
        WAITSET_CAPACITY
    }

    pub fn signal_handling_mode(&self) -> SignalHandlingMode {
        self.signal_handling_mode
    }

    fn attach<'a>(&self, kind: Kind) -> Result<WaitSetGuard<'_, 'a>, WaitSetAttachmentError> {
        let mut attachments = self.attachments.borrow_mut();
        if attachments.len() >= WAITSET_CAPACITY {
            return Err(WaitSetAttachmentError::InsufficientCapacity);
        }
        if let Some(fd) = kind.fd() {
            if attachments.iter().any(|a| a.kind.fd() == Some(fd)) {
                return Err(WaitSetAttachmentError::AlreadyAttached);
            }
        }

        let index = self.next_index.get();
        self.next_index.set(index + 1);
        let next_due = match kind {
            Kind::Notification { .. } => None,
            Kind::Deadline { period, .. } | Kind::Interval { period } => {
                Some(Instant::now() + period)
            }
        };
        attachments.push(Attachment {
            index,
            kind,
            next_due,
        });
        log::debug!("waitset: attached {kind:?} as {index}");

        Ok(WaitSetGuard {
            waitset: self,
            index,
            _attachment: PhantomData,
        })
    }

    fn detach(&self, index: u64) {
        self.attachments.borrow_mut().retain(|a| a.index != index);
    }

    /// Fire whenever `attachment` becomes readable.
    pub fn attach_notification<'waitset, 'attachment, T: AsRawFd>(
        &'waitset self,
        attachment: &'attachment T,
    ) -> Result<WaitSetGuard<'waitset, 'attachment>, WaitSetAttachmentError> {
        self.attach(Kind::Notification {
            fd: attachment.as_raw_fd(),
        })
    }

    /// Fire when `attachment` becomes readable, or report a missed deadline
    /// when it stays silent for `deadline`. Either outcome restarts the
    /// deadline.
    pub fn attach_deadline<'waitset, 'attachment, T: AsRawFd>(
        &'waitset self,
        attachment: &'attachment T,
        deadline: Duration,
    ) -> Result<WaitSetGuard<'waitset, 'attachment>, WaitSetAttachmentError> {
        self.attach(Kind::Deadline {
            fd: attachment.as_raw_fd(),
            period: deadline,
        })
    }

    /// Fire every `interval`.
    pub fn attach_interval(
        &self,
        interval: Duration,
    ) -> Result<WaitSetGuard<'_, 'static>, WaitSetAttachmentError> {
        self.attach(Kind::Interval { period: interval })
    }

    fn signal_result(&self) -> Option<WaitSetRunResult> {
        match signal::check(self.signal_handling_mode) {
            SignalState::None => None,
            SignalState::Interrupt => Some(WaitSetRunResult::Interrupt),
            SignalState::TerminationRequest => Some(WaitSetRunResult::TerminationRequest),
        }
    }

    /// Poll once and return the fired attachments.
    fn collect(&self, timeout: Option<Duration>) -> Result<Result<Vec<AttachmentId>, WaitSetRunResult>, WaitSetRunError> {
        let (fds, nearest_due) = {
            let attachments = self.attachments.borrow();
            if attachments.is_empty() {
                return Err(WaitSetRunError::NoAttachments);
            }
            let fds: Vec<RawFd> = attachments.iter().filter_map(|a| a.kind.fd()).collect();
            let nearest_due = attachments.iter().filter_map(|a| a.next_due).min();
            (fds, nearest_due)
        };

        let now = Instant::now();
        let until_due = nearest_due.map(|due| due.saturating_duration_since(now));
        let wait = match (until_due, timeout) {
            (Some(d), Some(t)) => Some(d.min(t)),
            (d, t) => d.or(t),
        };

        let readable = match platform::poll_readable(&fds, wait) {
            Ok(readable) => readable,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return Ok(match self.signal_result() {
                    Some(result) => Err(result),
                    None => {
                        log::debug!("waitset: wait interrupted by an unhandled signal");
                        Ok(Vec::new())
                    }
                });
            }
            Err(e) => {
                log::error!("waitset: poll failed: {e}");
                return Err(match e.kind() {
                    io::ErrorKind::PermissionDenied => WaitSetRunError::InsufficientPermissions,
                    _ => WaitSetRunError::InternalError,
                });
            }
        };

        let now = Instant::now();
        let mut fired = Vec::new();
        let mut readable = readable.into_iter();
        for a in self.attachments.borrow_mut().iter_mut() {
            let has_data = a.kind.fd().is_some() && readable.next().unwrap_or(false);
            match a.kind {
                Kind::Notification { .. } => {
                    if has_data {
                        fired.push(AttachmentId { index: a.index, reason: Reason::Event });
                    }
                }
                Kind::Deadline { period, .. } => {
                    let due = a.next_due.is_some_and(|d| now >= d);
                    if has_data {
                        fired.push(AttachmentId { index: a.index, reason: Reason::Event });
                        a.next_due = Some(now + period);
                    } else if due {
                        fired.push(AttachmentId { index: a.index, reason: Reason::MissedDeadline });
                        a.next_due = Some(now + period);
                    }
                }
                Kind::Interval { period } => {
                    if let Some(due) = a.next_due.filter(|d| now >= *d) {
                        fired.push(AttachmentId { index: a.index, reason: Reason::Event });
                        let next = due + period;
                        a.next_due = Some(if next <= now { now + period } else { next });
                    }
                }
            }
        }
        Ok(Ok(fired))
    }

    fn run_once<F>(&self, callback: &mut F, timeout: Option<Duration>) -> Result<WaitSetRunResult, WaitSetRunError>
    where
        F: FnMut(AttachmentId) -> CallbackProgression,
    {
        if let Some(result) = self.signal_result() {
            return Ok(result);
        }
        let fired = match self.collect(timeout)? {
            Ok(fired) => fired,
            Err(result) => return Ok(result),
        };
        for id in fired {
            if callback(id) == CallbackProgression::Stop {
                return Ok(WaitSetRunResult::StopRequest);
            }
        }
        Ok(WaitSetRunResult::AllEventsHandled)
    }

    /// Wait and dispatch until the callback stops or a signal arrives.
    pub fn wait_and_process<F>(&self, mut callback: F) -> Result<WaitSetRunResult, WaitSetRunError>
    where
        F: FnMut(AttachmentId) -> CallbackProgression,
    {
        loop {
            match self.run_once(&mut callback, None)? {
                WaitSetRunResult::AllEventsHandled => {}
                result => return Ok(result),
            }
        }
    }

    /// Wait until at least one attachment fires, dispatch, return.
    pub fn wait_and_process_once<F>(&self, mut callback: F) -> Result<WaitSetRunResult, WaitSetRunError>
    where
        F: FnMut(AttachmentId) -> CallbackProgression,
    {
        self.run_once(&mut callback, None)
    }

    /// Like [`wait_and_process_once`](Self::wait_and_process_once) but gives
    /// up after `timeout`.
    pub fn wait_and_process_once_with_timeout<F>(
        &self,
        mut callback: F,
        timeout: Duration,
    ) -> Result<WaitSetRunResult, WaitSetRunError>
    where
        F: FnMut(AttachmentId) -> CallbackProgression,
    {
        self.run_once(&mut callback, Some(timeout))
    }
}
