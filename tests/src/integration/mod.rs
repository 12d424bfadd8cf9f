//! # Integration Scenarios
//!
//! Several contexts share one `MemoryNetwork`, each behaving like a separate
//! node, and talk only through the public `ConnectivityApi`.

pub mod discovery;
pub mod pump;
pub mod roundtrip;
pub mod selection;
