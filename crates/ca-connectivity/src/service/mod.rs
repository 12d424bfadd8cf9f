//! # Connectivity Service
//!
//! Implements the `ConnectivityApi` port on an explicit [`ConnectivityContext`].
//!
//! - `registry`: adapter table, selection mask and server roles
//! - `dispatcher`: handler pair, bounded inbound queue, threaded or
//!   cooperative delivery
//! - `discovery`: multicast find/advertise and group sends
//! - `api`: the port implementation

mod api;
mod core;
mod discovery;
pub mod dispatcher;
pub mod registry;

pub use core::{ConnectivityContext, ConnectivityContextBuilder};
pub use dispatcher::{DispatchStats, Dispatcher, InboundEvent, DISPATCH_TASK_NAME};
pub use registry::{AdapterRegistry, AdapterState, ServerRoles};
