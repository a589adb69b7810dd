//! Core abstractions for the Shishen breath bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `BreathPulse` - Outbound request record and its composer
//! - `RemoteStatus` - Remote agent status with per-field defaults
//! - `RemoteChannel` - Transport capability used by every bridge component
//! - `ChatStore` - Persistence collaborator for chat rows

pub mod pulse;
pub mod status;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use pulse::{BreathPulse, InputContext, MessageError, PulseResult, StateSnapshot, validate_message};
pub use status::RemoteStatus;
pub use traits::{ChatMessage, ChatStore, MessageRole, RemoteChannel, StorageError, TransportError};
