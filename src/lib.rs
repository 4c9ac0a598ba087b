pub mod completion;
pub mod endpoint;
pub mod hints;
pub mod mmap_area;
pub mod pending;
pub mod recv_buf;
pub mod send_buf;
pub mod socket;
pub mod subsystem;
pub mod transport;

pub use endpoint::{Endpoint, Submission};
pub use recv_buf::RecvBuf;
pub use send_buf::SendBuf;
pub use socket::{SocketOptions, UdpEndpoint};
pub use transport::{SetupError, Transport, TransportOptions};

/// UDP payload of a 1500 byte Ethernet MTU (20 byte IPv4 header, 8 byte UDP header)
pub const DEFAULT_FRAME_SIZE: usize = 1500 - 20 - 8;

/// Default number of frames in each direction
pub const DEFAULT_NUM_FRAMES: usize = 32;

/// Limit on send frames, and so on transmissions in flight at once
pub const MAX_OUTSTANDING_SENDS: usize = 64;
