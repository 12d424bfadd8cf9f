//! # Adapters Layer
//!
//! Implementations of the outbound ports.
//!
//! - `memory`: in-process transport for tests and simulations
//! - `udp`: UDP/IP transport (requires "network" feature)
//! - `spawner`: OS-thread `TaskSpawner`
//! - `config`: configuration providers

mod callbacks;
pub mod config;
pub mod memory;
pub mod spawner;

#[cfg(feature = "network")]
pub mod udp;

pub use callbacks::CallbackSlots;
pub use config::StaticConfigProvider;
pub use memory::{MemoryAdapter, MemoryNetwork, SentPacket};
pub use spawner::ThreadSpawner;

#[cfg(feature = "network")]
pub use config::{ConfigError, TomlConfigProvider};
#[cfg(feature = "network")]
pub use udp::UdpAdapter;
