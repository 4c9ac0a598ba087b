use std::convert::TryFrom;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use errno::errno;
use libc::{c_int, poll, pollfd, EINTR, POLLIN, POLLOUT};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Submission};
use crate::hints::{Hints, HintsError};

/// How long a send waits for room in the kernel buffer before the datagram is dropped.
const SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// A connected, non-blocking UDP socket.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("failed to resolve {addr}:{port}: {source}")]
    Resolve {
        addr: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no IPv4 address for {addr}:{port}")]
    NoAddress { addr: String, port: u16 },

    #[error("failed to create socket: {0}")]
    Create(#[source] io::Error),

    #[error("failed to set {name}: {source}")]
    SetOption {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {remote}: {source}")]
    Connect {
        remote: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Configuration options for UdpEndpoint
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketOptions {
    /// Kernel receive buffer size in bytes, 0 keeps the system default
    pub recv_buff_size: usize,

    /// Kernel send buffer size in bytes, 0 keeps the system default
    pub send_buff_size: usize,
}

impl SocketOptions {
    /// Read `recv_buff_size` and `send_buff_size`.
    pub fn from_hints(hints: &Hints) -> Result<SocketOptions, HintsError> {
        Ok(SocketOptions {
            recv_buff_size: hints.get_usize("recv_buff_size", 0)?,
            send_buff_size: hints.get_usize("send_buff_size", 0)?,
        })
    }
}

impl UdpEndpoint {
    /// Resolve `addr:port` to an IPv4 address and connect a new socket to it.
    pub fn connect(addr: &str, port: &str, options: SocketOptions) -> Result<UdpEndpoint, SocketError> {
        let port: u16 = port
            .parse()
            .map_err(|_| SocketError::InvalidPort(port.to_string()))?;

        let remote = (addr, port)
            .to_socket_addrs()
            .map_err(|source| SocketError::Resolve {
                addr: addr.to_string(),
                port,
                source,
            })?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| SocketError::NoAddress {
                addr: addr.to_string(),
                port,
            })?;

        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(SocketError::Create)?;
        socket.set_nonblocking(true).map_err(SocketError::Create)?;

        if options.recv_buff_size > 0 {
            socket
                .set_recv_buffer_size(options.recv_buff_size)
                .map_err(|source| SocketError::SetOption {
                    name: "SO_RCVBUF",
                    source,
                })?;
        }
        if options.send_buff_size > 0 {
            socket
                .set_send_buffer_size(options.send_buff_size)
                .map_err(|source| SocketError::SetOption {
                    name: "SO_SNDBUF",
                    source,
                })?;
        }

        socket.bind(&local.into()).map_err(SocketError::Create)?;
        socket
            .connect(&remote.into())
            .map_err(|source| SocketError::Connect { remote, source })?;

        let socket: UdpSocket = socket.into();
        debug!(%remote, local = ?socket.local_addr().ok(), "udp endpoint connected");

        Ok(UdpEndpoint { socket })
    }

    /// Wrap a socket that is already connected. It is switched to non-blocking mode.
    pub fn from_socket(socket: UdpSocket) -> io::Result<UdpEndpoint> {
        socket.set_nonblocking(true)?;
        Ok(UdpEndpoint { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

impl AsRawFd for UdpEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl Endpoint for UdpEndpoint {
    #[inline]
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        wait_for(self.socket.as_raw_fd(), POLLIN, timeout)
    }

    /// The kernel copies the payload during `send`, so the submission completes before this
    /// returns.
    fn send_async(&self, submission: Submission) {
        let payload = submission.payload();

        let mut r = self.socket.send(payload);
        if matches!(&r, Err(err) if err.kind() == io::ErrorKind::WouldBlock) {
            r = match wait_for(self.socket.as_raw_fd(), POLLOUT, SEND_TIMEOUT) {
                Ok(true) => self.socket.send(payload),
                Ok(false) => Err(io::ErrorKind::TimedOut.into()),
                Err(err) => Err(err),
            };
        }

        match r {
            Ok(n) if n != payload.len() => {
                warn!(sent = n, len = payload.len(), "short datagram send");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(index = submission.index(), len = payload.len(), %err, "datagram send failed");
            }
        }

        submission.complete();
    }
}

/// poll() a single descriptor, retrying on EINTR with whatever is left of `timeout`.
fn wait_for(fd: RawFd, events: i16, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };

        let mut fds = [pollfd {
            fd,
            events,
            revents: 0,
        }];

        let ret = unsafe { poll(fds.as_mut_ptr(), 1, poll_millis(remaining)) };
        if ret > 0 {
            return Ok(true);
        }
        if ret == 0 {
            return Ok(false);
        }

        let errno = errno().0;
        if errno != EINTR {
            return Err(io::Error::from_raw_os_error(errno));
        }
    }
}

/// Milliseconds for poll(), rounded up so short timeouts do not turn into a non-blocking check.
fn poll_millis(timeout: Duration) -> c_int {
    let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
    c_int::try_from(millis).unwrap_or(c_int::MAX)
}
