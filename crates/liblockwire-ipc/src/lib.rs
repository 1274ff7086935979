//! Lock-contention signalling for lockwire
//!
//! This crate provides:
//! - The lock packet wire format (packet::encode / packet::decode)
//! - The datagram socket seam (DatagramSocket)
//! - The communicator owning one UDP socket (LockCommunicator)
//! - The listener/dispatch loop for owners and requesters (ContentionHandler)
//! - Owner records publishing a lock's id and port (OwnerRecord)

pub mod communicator;
pub mod contention;
pub mod error;
pub mod packet;
pub mod record;
pub mod socket;

pub use communicator::{InboundPacket, LockCommunicator, ReceivedDatagram};
pub use contention::{ContentionHandler, ReleaseOutcome, ReleaseRequest};
pub use error::{DecodeError, IpcError};
pub use packet::{Packet, MAX_BYTES, PROTOCOL_VERSION};
pub use record::OwnerRecord;
pub use socket::DatagramSocket;
