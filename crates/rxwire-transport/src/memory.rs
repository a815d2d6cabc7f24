use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::status::OfferStatus;
use crate::traits::Channel;

/// Default number of frames a loopback channel holds before back-pressuring.
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process loopback channel.
///
/// Offered frames are queued and come back out of [`Channel::try_poll`] in
/// order. The channel can be paused, disconnected or closed, and upcoming
/// offer results can be scripted with [`MemoryChannel::inject`].
#[derive(Debug)]
pub struct MemoryChannel {
    state: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    queue: VecDeque<Bytes>,
    capacity: usize,
    position: u64,
    attempts: u64,
    paused: bool,
    connected: bool,
    closed: bool,
    injected: VecDeque<OfferStatus>,
}

impl MemoryChannel {
    /// Create a connected loopback channel with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a connected loopback channel holding at most `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                queue: VecDeque::new(),
                capacity,
                position: 0,
                attempts: 0,
                paused: false,
                connected: true,
                closed: false,
                injected: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script the result of the next un-scripted offer.
    ///
    /// Injected statuses are consumed in order, one per offer. An injected
    /// `Success` lets that offer take the normal path, so the frame is still
    /// queued and the real position is reported.
    pub fn inject(&self, status: OfferStatus) {
        self.state().injected.push_back(status);
    }

    /// Script several offer results at once.
    pub fn inject_all(&self, statuses: impl IntoIterator<Item = OfferStatus>) {
        self.state().injected.extend(statuses);
    }

    /// Pause the channel; offers answer [`OfferStatus::AdminAction`].
    pub fn pause(&self) {
        self.state().paused = true;
    }

    /// Undo [`MemoryChannel::pause`].
    pub fn resume(&self) {
        self.state().paused = false;
    }

    /// Drop the peer; offers answer [`OfferStatus::NotConnected`].
    pub fn disconnect(&self) {
        self.state().connected = false;
    }

    /// Undo [`MemoryChannel::disconnect`].
    pub fn reconnect(&self) {
        self.state().connected = true;
    }

    /// Close the channel for good.
    pub fn close(&self) {
        self.state().closed = true;
    }

    /// Number of `try_offer` calls so far, whatever their outcome.
    pub fn offer_attempts(&self) -> u64 {
        self.state().attempts
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// True if no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.state().queue.is_empty()
    }

    /// Take every queued frame.
    pub fn drain(&self) -> Vec<Bytes> {
        self.state().queue.drain(..).collect()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MemoryChannel {
    fn try_offer(&self, frame: &[u8]) -> OfferStatus {
        let mut state = self.state();
        state.attempts += 1;

        match state.injected.pop_front() {
            None | Some(OfferStatus::Success(_)) => {}
            Some(scripted) => return scripted,
        }

        if state.closed {
            return OfferStatus::Closed;
        }
        if !state.connected {
            return OfferStatus::NotConnected;
        }
        if state.paused {
            return OfferStatus::AdminAction;
        }
        if state.queue.len() >= state.capacity {
            return OfferStatus::BackPressured;
        }

        state.queue.push_back(Bytes::copy_from_slice(frame));
        state.position += frame.len() as u64;
        OfferStatus::Success(state.position)
    }

    fn try_poll(&self) -> Option<Bytes> {
        self.state().queue.pop_front()
    }

    fn is_connected(&self) -> bool {
        let state = self.state();
        state.connected && !state.closed
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }
}
