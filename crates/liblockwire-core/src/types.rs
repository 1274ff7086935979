//! Lock identifiers and signal kinds

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque 64-bit token identifying one file lock instance.
///
/// Lock ids are always supplied by the caller; this crate never generates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(u64);

impl LockId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for LockId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LockId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(LockId)
    }
}

/// Kind of signal exchanged between a lock owner and a lock requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Please release the lock
    UnlockRequest,
    /// The owner received an unlock request (the lock is not released yet)
    UnlockRequestAck,
    /// The lock has been released
    LockReleasedConfirmation,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [
        MessageKind::UnlockRequest,
        MessageKind::UnlockRequestAck,
        MessageKind::LockReleasedConfirmation,
    ];

    /// One-byte wire tag
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::UnlockRequest => 1,
            MessageKind::UnlockRequestAck => 2,
            MessageKind::LockReleasedConfirmation => 3,
        }
    }

    /// Look up a kind by its wire tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::UnlockRequest),
            2 => Some(MessageKind::UnlockRequestAck),
            3 => Some(MessageKind::LockReleasedConfirmation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::UnlockRequest => "unlock_request",
            MessageKind::UnlockRequestAck => "unlock_request_ack",
            MessageKind::LockReleasedConfirmation => "lock_released_confirmation",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
