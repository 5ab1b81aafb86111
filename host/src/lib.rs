//! Host link protocol: framed, chunked, sequenced, CRC-protected packets
//! over the USB bulk endpoints.
//!
//! At most one command is in flight. The interface that carried a
//! command's first chunk stays pinned until the final result or error is
//! sent; the other interface is answered with a busy status meanwhile. No
//! chunk is ever dropped silently: every malformed or unexpected packet is
//! answered with an error frame carrying a sub-code.

pub mod frame;
pub mod session;

pub use frame::{ErrorCode, Header, Packet, PacketType, FrameError};
pub use session::{CmdState, HostEvent, HostOutput, HostSession, Interface};
