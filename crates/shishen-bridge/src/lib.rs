//! Breath protocol orchestration for the Shishen bridge.
//!
//! Provides:
//! - `PulseTransmitter` - Deliver pulses to the remote breath log
//! - `ResponseWaiter` - Poll the remote response log with a deadline
//! - `StatusFetcher` - Read the remote memory snapshot
//! - `BreathBridge` - The send use case exposed to the request layer
//! - `BridgeConfig` - File + environment configuration
//! - Chat storage implementations (memory)

pub mod config;
pub mod orchestrator;
pub mod status;
pub mod storage;
pub mod transmitter;
pub mod waiter;

pub use config::{BridgeConfig, ConfigError, RemotePaths};
pub use orchestrator::{BreathBridge, BridgeError, SendOutcome};
pub use status::StatusFetcher;
pub use transmitter::PulseTransmitter;
pub use waiter::{Correlation, ResponseWaiter, WaitConfig};
