//! The protocol plugin contract.
//!
//! Every protocol implementation is a flat `{decode, encode}` capability set
//! composed over the core services - frame extraction, pattern parsing,
//! device sessions. Plugins are stateless `&self`: all per-connection state
//! lives in the [`ConnectionContext`] and in the per-connection frame
//! decoder instance, never in plugin fields shared across connections.

use crate::frame::FrameDecoder;
use crate::session::{ConnectionId, DeviceIdentity, DeviceSessionRegistry};
use std::sync::Arc;
use trackgate_core::{Command, PositionRecord};

/// Per-connection context threaded into every decode call.
///
/// Owns the connection's identity cache handle and its outbound reply
/// queue. Dropping the context closes the session, so a connection task
/// cannot leak its identity to a later connection.
pub struct ConnectionContext {
    id: ConnectionId,
    sessions: Arc<DeviceSessionRegistry>,
    replies: Vec<Vec<u8>>,
}

impl ConnectionContext {
    pub fn new(id: ConnectionId, sessions: Arc<DeviceSessionRegistry>) -> Self {
        Self {
            id,
            sessions,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Resolve declared identifier candidates and cache the result for this
    /// connection. See [`DeviceSessionRegistry::identify`].
    pub fn identify(&self, candidates: &[&str]) -> Option<DeviceIdentity> {
        self.sessions.identify(self.id, candidates)
    }

    /// The identity cached by an earlier `identify` on this connection.
    pub fn resume(&self) -> Option<DeviceIdentity> {
        self.sessions.resume(self.id)
    }

    /// Queue an acknowledgement or other protocol-mandated write back to the
    /// device. The server drains the queue to the socket after each decode.
    pub fn reply(&mut self, bytes: Vec<u8>) {
        self.replies.push(bytes);
    }

    /// Take all queued replies, leaving the queue empty.
    pub fn take_replies(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.replies)
    }
}

impl Drop for ConnectionContext {
    fn drop(&mut self) {
        self.sessions.close(self.id);
    }
}

/// One protocol implementation.
///
/// Implementations must be stateless with respect to connections: `decode`
/// receives everything connection-specific through the context, and
/// `encode` is purely functional.
pub trait ProtocolPlugin: Send + Sync {
    /// Protocol name recorded on every produced position.
    fn name(&self) -> &'static str;

    /// A fresh frame decoder for one connection, honoring the configured
    /// buffered-frame size cap.
    fn frame_decoder(&self, max_frame_size: usize) -> Box<dyn FrameDecoder>;

    /// Decode one frame into zero or more normalized positions.
    ///
    /// Never fails for malformed or unrecognized payload - such frames
    /// yield an empty vector and, where the protocol defines one, no
    /// acknowledgement, leaving retransmission to the device's firmware.
    /// Frames that require identity while the connection is unidentified
    /// are dropped the same way.
    fn decode(&self, ctx: &mut ConnectionContext, frame: &[u8]) -> Vec<PositionRecord>;

    /// Build the outbound wire form of a command, or `None` when the
    /// protocol does not support it.
    fn encode(&self, command: &Command) -> Option<Vec<u8>> {
        let _ = command;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryDeviceDirectory;

    fn registry() -> Arc<DeviceSessionRegistry> {
        let directory = MemoryDeviceDirectory::new();
        directory.register(1, "359586015829802");
        Arc::new(DeviceSessionRegistry::new(Arc::new(directory)))
    }

    #[test]
    fn test_context_identify_resume() {
        let registry = registry();
        let mut ctx = ConnectionContext::new(1, registry.clone());
        assert!(ctx.resume().is_none());
        assert!(ctx.identify(&["359586015829802"]).is_some());
        assert_eq!(ctx.resume().unwrap().id, 1);
    }

    #[test]
    fn test_context_drop_closes_session() {
        let registry = registry();
        {
            let ctx = ConnectionContext::new(7, registry.clone());
            ctx.identify(&["359586015829802"]);
            assert_eq!(registry.session_count(), 1);
        }
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_reply_queue_drains() {
        let mut ctx = ConnectionContext::new(1, registry());
        ctx.reply(b"LOAD".to_vec());
        ctx.reply(b"ON".to_vec());
        assert_eq!(ctx.take_replies(), vec![b"LOAD".to_vec(), b"ON".to_vec()]);
        assert!(ctx.take_replies().is_empty());
    }
}
