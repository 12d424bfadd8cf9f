//! # Connectivity Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (codec, tokens, delivery)
//! └── src/integration/  # Multi-node scenarios on the in-memory network
//!     ├── discovery.rs  # find/advertise over multicast
//!     ├── pump.rs       # cooperative and threaded delivery
//!     ├── roundtrip.rs  # unicast request/response fidelity
//!     └── selection.rs  # adapter selection and failures
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ca-tests
//!
//! # By scenario
//! cargo test -p ca-tests integration::discovery::
//!
//! # Benchmarks
//! cargo bench -p ca-tests
//! ```

pub mod integration;
