//! Core library for lockwire
//!
//! This crate provides:
//! - Lock identifiers and signal kinds (LockId, MessageKind)
//! - Local address resolution (AddressResolver and its implementations)
//! - Configuration loading (LockwireConfig)
//! - The core error type (CoreError)

pub mod config;
pub mod error;
pub mod net;
pub mod types;

pub use config::{load_config, resolve_config, ContentionConfig, LockwireConfig, NetworkConfig};
pub use error::CoreError;
pub use net::{AddressResolver, FixedAddressResolver, InterfaceAddressResolver};
pub use types::{LockId, MessageKind};
