//! Callback storage shared by the adapter implementations.

use parking_lot::RwLock;

use crate::ports::{
    AdapterException, ConnectionStateCallback, ConnectionStateEvent, ExceptionCallback,
    PacketReceiveCallback, ReceivedPacket,
};

/// The three adapter callbacks. Each `set_*` replaces the previous one.
///
/// `emit_*` clones the callback out of the lock before calling it, so a
/// callback may itself replace callbacks.
#[derive(Default)]
pub struct CallbackSlots {
    packet: RwLock<Option<PacketReceiveCallback>>,
    exception: RwLock<Option<ExceptionCallback>>,
    state: RwLock<Option<ConnectionStateCallback>>,
}

impl CallbackSlots {
    pub fn set_packet(&self, cb: PacketReceiveCallback) {
        *self.packet.write() = Some(cb);
    }

    pub fn set_exception(&self, cb: ExceptionCallback) {
        *self.exception.write() = Some(cb);
    }

    pub fn set_state(&self, cb: ConnectionStateCallback) {
        *self.state.write() = Some(cb);
    }

    /// Returns false if nobody is listening.
    pub fn emit_packet(&self, packet: ReceivedPacket) -> bool {
        let cb = self.packet.read().clone();
        match cb {
            Some(cb) => {
                cb(packet);
                true
            }
            None => {
                tracing::debug!(source = %packet.source, "no packet callback, dropping");
                false
            }
        }
    }

    pub fn emit_exception(&self, exception: AdapterException) {
        let cb = self.exception.read().clone();
        if let Some(cb) = cb {
            cb(exception);
        }
    }

    pub fn emit_state(&self, event: ConnectionStateEvent) {
        let cb = self.state.read().clone();
        if let Some(cb) = cb {
            cb(event);
        }
    }
}
