use bytes::Bytes;

use crate::status::OfferStatus;

/// A message channel with non-blocking offer and poll.
///
/// Every method takes `&self`: one channel handle is shared by the data path
/// and the heartbeat path of a session, and each offer is atomic for one
/// complete frame. Implementations must tolerate concurrent offers without
/// external locking.
pub trait Channel: Send + Sync {
    /// Offer one complete frame. Never blocks.
    fn try_offer(&self, frame: &[u8]) -> OfferStatus;

    /// Take the next received frame, if one is ready. Never blocks.
    fn try_poll(&self) -> Option<Bytes>;

    /// Whether a peer is currently connected.
    fn is_connected(&self) -> bool;

    /// Whether the channel has been closed.
    fn is_closed(&self) -> bool;
}

impl<C: Channel + ?Sized> Channel for std::sync::Arc<C> {
    fn try_offer(&self, frame: &[u8]) -> OfferStatus {
        (**self).try_offer(frame)
    }

    fn try_poll(&self) -> Option<Bytes> {
        (**self).try_poll()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
