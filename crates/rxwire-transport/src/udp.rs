use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::status::OfferStatus;
use crate::traits::Channel;

/// Largest datagram we are prepared to receive.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// OS error codes map into `Unknown` below this base so they never collide
/// with the transport sentinels.
const UNKNOWN_OS_ERROR_BASE: i64 = -1000;

/// UDP datagram channel.
///
/// One offer sends exactly one datagram, so a frame is never split or
/// interleaved with another caller's frame. The socket is non-blocking:
/// a full send buffer surfaces as [`OfferStatus::BackPressured`].
pub struct UdpChannel {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
    position: AtomicU64,
    closed: AtomicBool,
    recv_buf: Mutex<Vec<u8>>,
}

impl UdpChannel {
    /// Bind a receiving channel with no connected peer.
    ///
    /// Offers on this channel answer [`OfferStatus::NotConnected`].
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        info!(%local_addr, "bound udp channel");

        Ok(Self::from_parts(socket, local_addr, None))
    }

    /// Connect to `peer` from an ephemeral local port of the same address family.
    pub fn connect(peer: SocketAddr) -> Result<Self> {
        let bind_addr = match peer.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        Self::connect_from(bind_addr, peer)
    }

    /// Connect to `peer` from an explicit local address.
    pub fn connect_from(bind_addr: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).map_err(|source| TransportError::Bind {
            addr: bind_addr,
            source,
        })?;
        socket
            .connect(peer)
            .map_err(|source| TransportError::Connect { addr: peer, source })?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        info!(%local_addr, %peer, "connected udp channel");

        Ok(Self::from_parts(socket, local_addr, Some(peer)))
    }

    fn from_parts(
        socket: UdpSocket,
        local_addr: SocketAddr,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            socket,
            local_addr,
            peer_addr,
            position: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            recv_buf: Mutex::new(vec![0u8; RECV_BUFFER_SIZE]),
        }
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connected peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Close the channel. Later offers answer [`OfferStatus::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(local_addr = %self.local_addr, "closed udp channel");
        }
    }

    /// Receive one datagram together with its sender.
    pub fn try_poll_from(&self) -> Option<(Bytes, SocketAddr)> {
        if self.is_closed() {
            return None;
        }

        let mut buf = self.recv_buf.lock().unwrap_or_else(PoisonError::into_inner);
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => Some((Bytes::copy_from_slice(&buf[..len]), from)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => None,
            Err(err) if err.kind() == ErrorKind::Interrupted => None,
            Err(err) => {
                // Connected UDP sockets report ICMP errors from earlier sends here.
                trace!(error = %err, "udp receive failed");
                None
            }
        }
    }
}

impl Channel for UdpChannel {
    fn try_offer(&self, frame: &[u8]) -> OfferStatus {
        if self.is_closed() {
            return OfferStatus::Closed;
        }
        if self.peer_addr.is_none() {
            return OfferStatus::NotConnected;
        }

        match self.socket.send(frame) {
            Ok(sent) => {
                let sent = sent as u64;
                OfferStatus::Success(self.position.fetch_add(sent, Ordering::AcqRel) + sent)
            }
            Err(err) => classify_send_error(&err),
        }
    }

    fn try_poll(&self) -> Option<Bytes> {
        self.try_poll_from().map(|(payload, _)| payload)
    }

    fn is_connected(&self) -> bool {
        self.peer_addr.is_some() && !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpChannel")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn classify_send_error(err: &std::io::Error) -> OfferStatus {
    match err.kind() {
        ErrorKind::WouldBlock => OfferStatus::BackPressured,
        ErrorKind::Interrupted => OfferStatus::AdminAction,
        ErrorKind::ConnectionRefused | ErrorKind::NotConnected => OfferStatus::NotConnected,
        _ => {
            let errno = err.raw_os_error().map(i64::from).unwrap_or(0).abs();
            OfferStatus::Unknown(UNKNOWN_OS_ERROR_BASE - errno)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().expect("loopback addr should parse")
    }

    fn poll_until(channel: &UdpChannel, timeout: Duration) -> Option<(Bytes, SocketAddr)> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(received) = channel.try_poll_from() {
                return Some(received);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn offer_reaches_bound_peer() {
        let server = UdpChannel::bind(loopback()).expect("server should bind");
        let client = UdpChannel::connect(server.local_addr()).expect("client should connect");

        let status = client.try_offer(b"hello");
        assert_eq!(status, OfferStatus::Success(5));

        let (payload, from) =
            poll_until(&server, Duration::from_secs(2)).expect("datagram should arrive");
        assert_eq!(payload.as_ref(), b"hello");
        assert_eq!(from, client.local_addr());
    }

    #[test]
    fn position_accumulates_sent_bytes() {
        let server = UdpChannel::bind(loopback()).expect("server should bind");
        let client = UdpChannel::connect(server.local_addr()).expect("client should connect");

        assert_eq!(client.try_offer(b"abc"), OfferStatus::Success(3));
        assert_eq!(client.try_offer(b"defg"), OfferStatus::Success(7));
    }

    #[test]
    fn unconnected_channel_reports_not_connected() {
        let server = UdpChannel::bind(loopback()).expect("server should bind");
        assert_eq!(server.try_offer(b"x"), OfferStatus::NotConnected);
        assert!(!server.is_connected());
    }

    #[test]
    fn closed_channel_rejects_offers_and_polls() {
        let server = UdpChannel::bind(loopback()).expect("server should bind");
        let client = UdpChannel::connect(server.local_addr()).expect("client should connect");

        client.close();
        assert!(client.is_closed());
        assert_eq!(client.try_offer(b"x"), OfferStatus::Closed);
        assert!(client.try_poll().is_none());
    }

    #[test]
    fn poll_on_idle_channel_is_empty() {
        let server = UdpChannel::bind(loopback()).expect("server should bind");
        assert!(server.try_poll().is_none());
    }

    #[test]
    fn unknown_os_errors_stay_clear_of_sentinels() {
        let err = std::io::Error::from_raw_os_error(5);
        match classify_send_error(&err) {
            OfferStatus::Unknown(code) => assert!(code <= UNKNOWN_OS_ERROR_BASE),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn would_block_is_back_pressure() {
        let err = std::io::Error::from(ErrorKind::WouldBlock);
        assert_eq!(classify_send_error(&err), OfferStatus::BackPressured);
    }
}
