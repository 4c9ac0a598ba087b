use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::hints::{Hints, HintsError};
use crate::mmap_area::{MmapAreaOptions, MmapError};
use crate::recv_buf::{RecvBuf, RecvFrames};
use crate::send_buf::{SendBuf, SendFrames};
use crate::socket::{SocketError, SocketOptions, UdpEndpoint};
use crate::subsystem::{self, SubsystemError};
use crate::{DEFAULT_FRAME_SIZE, DEFAULT_NUM_FRAMES, MAX_OUTSTANDING_SENDS};

/// Datagram transport handing out reusable receive and send frames.
///
/// Receive: [`get_recv_buf`](Transport::get_recv_buf) takes a free frame, reads one datagram
/// into it and lends it out until the returned buffer is released or dropped. Any number of
/// threads may receive at once.
///
/// Send: [`get_send_buf`](Transport::get_send_buf) walks the send frames round robin. Each
/// frame is handed out only once its previous transmission has completed. Sending is meant to
/// be driven from one thread at a time.
#[derive(Debug)]
pub struct Transport<E> {
    recv: RecvFrames,
    send: SendFrames,
    next_send: AtomicUsize,
    endpoint: E,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("num_send_frames {requested} exceeds the limit of {max} outstanding sends")]
    TooManySendFrames { requested: usize, max: usize },

    #[error("receive pool: {0}")]
    RecvPool(#[source] MmapError),

    #[error("send pool: {0}")]
    SendPool(#[source] MmapError),

    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Hints(#[from] HintsError),
}

/// Configuration options for Transport
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Bytes per receive frame
    pub recv_frame_size: usize,

    /// Number of receive frames
    pub num_recv_frames: usize,

    /// Bytes per send frame
    pub send_frame_size: usize,

    /// Number of send frames, at most MAX_OUTSTANDING_SENDS
    pub num_send_frames: usize,

    /// If set to true, both pools are mapped with MAP_HUGETLB
    pub huge_tlb: bool,
}

impl Default for TransportOptions {
    fn default() -> TransportOptions {
        TransportOptions {
            recv_frame_size: DEFAULT_FRAME_SIZE,
            num_recv_frames: DEFAULT_NUM_FRAMES,
            send_frame_size: DEFAULT_FRAME_SIZE,
            num_send_frames: DEFAULT_NUM_FRAMES,
            huge_tlb: false,
        }
    }
}

impl TransportOptions {
    /// Read `recv_frame_size`, `num_recv_frames`, `send_frame_size`, `num_send_frames` and
    /// `huge_tlb`, falling back to the defaults for anything not given.
    pub fn from_hints(hints: &Hints) -> Result<TransportOptions, HintsError> {
        let d = TransportOptions::default();

        Ok(TransportOptions {
            recv_frame_size: hints.get_usize("recv_frame_size", d.recv_frame_size)?,
            num_recv_frames: hints.get_usize("num_recv_frames", d.num_recv_frames)?,
            send_frame_size: hints.get_usize("send_frame_size", d.send_frame_size)?,
            num_send_frames: hints.get_usize("num_send_frames", d.num_send_frames)?,
            huge_tlb: hints.get_bool("huge_tlb", d.huge_tlb)?,
        })
    }

    /// Check limits that do not depend on the memory available.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.num_send_frames > MAX_OUTSTANDING_SENDS {
            return Err(SetupError::TooManySendFrames {
                requested: self.num_send_frames,
                max: MAX_OUTSTANDING_SENDS,
            });
        }

        Ok(())
    }
}

impl<E: Endpoint> Transport<E> {
    /// Build a transport on top of a connected endpoint.
    pub fn new(endpoint: E, options: TransportOptions) -> Result<Transport<E>, SetupError> {
        subsystem::ensure_initialized()?;
        options.validate()?;

        let area_options = MmapAreaOptions {
            huge_tlb: options.huge_tlb,
        };

        let recv = RecvFrames::new(
            options.num_recv_frames,
            options.recv_frame_size,
            area_options,
        )
        .map_err(SetupError::RecvPool)?;

        let send = SendFrames::new(
            options.num_send_frames,
            options.send_frame_size,
            area_options,
        )
        .map_err(SetupError::SendPool)?;

        debug!(?options, "transport created");

        Ok(Transport {
            recv,
            send,
            next_send: AtomicUsize::new(0),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Receive one datagram, waiting at most `timeout` in total.
    ///
    /// A free frame is taken first. The receive is tried without blocking, and if nothing is
    /// queued we wait for the socket to become readable with whatever is left of the timeout
    /// and try once more. Returns None on timeout, with the frame back in the free queue.
    pub fn get_recv_buf(&self, timeout: Duration) -> Option<RecvBuf<'_>> {
        let deadline = Instant::now().checked_add(timeout);

        let index = self.recv.pop(timeout)?;
        // We popped `index`, nobody else can touch the frame until we fill or give it back.
        let frame = unsafe { self.recv.frame_mut(index) };

        match self.endpoint.try_recv(frame) {
            Ok(Some(len)) => return Some(self.recv.fill(index, len)),
            Ok(None) => {}
            Err(err) => debug!(%err, "non-blocking receive failed"),
        }

        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };

        match self.endpoint.wait_readable(remaining) {
            Ok(true) => match self.endpoint.try_recv(frame) {
                Ok(Some(len)) => return Some(self.recv.fill(index, len)),
                Ok(None) => debug!("readable but no datagram queued"),
                Err(err) => warn!(%err, "receive failed"),
            },
            Ok(false) => {}
            Err(err) => warn!(%err, "wait for readable failed"),
        }

        self.recv.give_back(index);
        None
    }

    /// Get the next send frame in round robin order, waiting up to `timeout` for its previous
    /// transmission to complete.
    ///
    /// The rotation only moves forward when a frame is handed out, so after a timeout the next
    /// call retries the same frame.
    pub fn get_send_buf(&self, timeout: Duration) -> Option<SendBuf<'_>> {
        let mut index = self.next_send.load(Ordering::Relaxed);
        if index >= self.send.frame_num() {
            index = 0;
            self.next_send.store(index, Ordering::Relaxed);
        }

        let buf = self.send.acquire(index, &self.endpoint, timeout)?;
        self.next_send.store(index + 1, Ordering::Relaxed);

        Some(buf)
    }

    pub fn num_recv_frames(&self) -> usize {
        self.recv.frame_num()
    }

    pub fn recv_frame_size(&self) -> usize {
        self.recv.frame_size()
    }

    pub fn num_send_frames(&self) -> usize {
        self.send.frame_num()
    }

    pub fn send_frame_size(&self) -> usize {
        self.send.frame_size()
    }

    /// Receive frames currently free, neither lent out nor being filled.
    pub fn num_pending_recv_frames(&self) -> usize {
        self.recv.num_pending()
    }
}

impl Transport<UdpEndpoint> {
    /// Connect a UDP transport to `addr:port`.
    ///
    /// `hints` is a `key=value,...` string. Besides the frame geometry understood by
    /// [`TransportOptions::from_hints`] it may set `recv_buff_size` and `send_buff_size` for
    /// the socket.
    pub fn connect_udp(
        addr: &str,
        port: &str,
        hints: &str,
    ) -> Result<Transport<UdpEndpoint>, SetupError> {
        info!("Creating UDP transport for {}:{}", addr, port);
        subsystem::ensure_initialized()?;

        let hints = Hints::parse(hints)?;
        let options = TransportOptions::from_hints(&hints)?;
        let socket_options = SocketOptions::from_hints(&hints)?;
        options.validate()?;

        let endpoint = UdpEndpoint::connect(addr, port, socket_options)?;
        Transport::new(endpoint, options)
    }
}
