//! Lock packet wire format
//!
//! Every datagram is exactly [`MAX_BYTES`] long:
//!
//! ```text
//! +---------+---------------------------+------+
//! | version | lock id (u64, big-endian) | kind |
//! | 1 byte  | 8 bytes                   | 1 B  |
//! +---------+---------------------------+------+
//! ```
//!
//! Small enough that it never fragments on a local interface.

use liblockwire_core::{LockId, MessageKind};

use crate::error::DecodeError;

/// Wire format version written in the first byte
pub const PROTOCOL_VERSION: u8 = 1;

/// Encoded size of every packet
pub const MAX_BYTES: usize = 10;

const LOCK_ID_RANGE: std::ops::Range<usize> = 1..9;
const KIND_OFFSET: usize = 9;

/// One lock signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    pub lock_id: LockId,
    pub kind: MessageKind,
}

impl Packet {
    pub fn new(lock_id: LockId, kind: MessageKind) -> Self {
        Self { lock_id, kind }
    }

    pub fn encode(&self) -> [u8; MAX_BYTES] {
        encode(self.lock_id, self.kind)
    }
}

/// Encode a packet. The output length is the same for every input.
pub fn encode(lock_id: LockId, kind: MessageKind) -> [u8; MAX_BYTES] {
    let mut bytes = [0u8; MAX_BYTES];
    bytes[0] = PROTOCOL_VERSION;
    bytes[LOCK_ID_RANGE].copy_from_slice(&lock_id.get().to_be_bytes());
    bytes[KIND_OFFSET] = kind.tag();
    bytes
}

/// Decode the first `len` bytes of `bytes`.
///
/// Anything in the buffer past `len` is ignored. `len` larger than the buffer
/// is clamped to it.
pub fn decode(bytes: &[u8], len: usize) -> Result<Packet, DecodeError> {
    let frame = &bytes[..len.min(bytes.len())];

    if frame.len() < MAX_BYTES {
        return Err(DecodeError::Truncated {
            expected: MAX_BYTES,
            actual: frame.len(),
        });
    }
    if frame.len() > MAX_BYTES {
        return Err(DecodeError::Oversized {
            expected: MAX_BYTES,
            actual: frame.len(),
        });
    }
    if frame[0] != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(frame[0]));
    }

    let mut raw_id = [0u8; 8];
    raw_id.copy_from_slice(&frame[LOCK_ID_RANGE]);
    let kind = MessageKind::from_tag(frame[KIND_OFFSET])
        .ok_or(DecodeError::UnknownKind(frame[KIND_OFFSET]))?;

    Ok(Packet::new(LockId::new(u64::from_be_bytes(raw_id)), kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_every_kind() {
        for kind in MessageKind::ALL {
            for raw in [0, 1, 42, u64::MAX / 3, u64::MAX] {
                let bytes = encode(LockId::new(raw), kind);
                let packet = decode(&bytes, bytes.len()).unwrap();
                assert_eq!(packet, Packet::new(LockId::new(raw), kind));
            }
        }
    }

    #[test]
    fn test_encoded_length_is_constant() {
        for kind in MessageKind::ALL {
            assert_eq!(encode(LockId::new(7), kind).len(), MAX_BYTES);
        }
    }

    #[test]
    fn test_layout() {
        let bytes = encode(LockId::new(0x0102_0304_0506_0708), MessageKind::UnlockRequestAck);
        assert_eq!(bytes, [1, 1, 2, 3, 4, 5, 6, 7, 8, 2]);
    }

    #[test]
    fn test_empty_and_truncated() {
        assert_eq!(
            decode(&[], 0),
            Err(DecodeError::Truncated { expected: MAX_BYTES, actual: 0 })
        );

        let bytes = encode(LockId::new(42), MessageKind::UnlockRequest);
        assert_eq!(
            decode(&bytes, MAX_BYTES - 1),
            Err(DecodeError::Truncated { expected: MAX_BYTES, actual: MAX_BYTES - 1 })
        );
    }

    #[test]
    fn test_reads_exactly_len_bytes() {
        let mut buffer = [0xAAu8; 64];
        buffer[..MAX_BYTES].copy_from_slice(&encode(LockId::new(9), MessageKind::UnlockRequest));

        let packet = decode(&buffer, MAX_BYTES).unwrap();
        assert_eq!(packet.lock_id, LockId::new(9));
    }

    #[test]
    fn test_oversized() {
        let buffer = [1u8; MAX_BYTES + 1];
        assert_eq!(
            decode(&buffer, buffer.len()),
            Err(DecodeError::Oversized { expected: MAX_BYTES, actual: MAX_BYTES + 1 })
        );
    }

    #[test]
    fn test_len_past_buffer_is_clamped() {
        let bytes = encode(LockId::new(3), MessageKind::LockReleasedConfirmation);
        assert_eq!(
            decode(&bytes[..4], 100),
            Err(DecodeError::Truncated {
                expected: MAX_BYTES,
                actual: 4
            })
        );
    }

    #[test]
    fn test_bad_version_and_kind() {
        let mut bytes = encode(LockId::new(1), MessageKind::UnlockRequest);
        bytes[0] = 9;
        assert_eq!(decode(&bytes, MAX_BYTES), Err(DecodeError::UnsupportedVersion(9)));

        let mut bytes = encode(LockId::new(1), MessageKind::UnlockRequest);
        bytes[MAX_BYTES - 1] = 0;
        assert_eq!(decode(&bytes, MAX_BYTES), Err(DecodeError::UnknownKind(0)));
    }
}
