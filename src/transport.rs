//! Peer transport interface consumed by the game room.
//!
//! A transport puts peers of the same `(app_id, room_id)` in contact, hands each
//! of them an id, delivers named actions between them and reports peers coming
//! and going. Everything runs on one thread: handlers are invoked one at a time
//! from the transport's own event loop.

pub mod local;

use anyhow::Result;
use bytes::Bytes;
use std::rc::Rc;

use crate::PeerId;

pub type ReceiveHandler = Box<dyn FnMut(Bytes, PeerId)>;
pub type PeerHandler = Box<dyn FnMut(PeerId)>;

/// Transport-level options shared by every peer of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub app_id: String,
}

/// Entry point of a transport: joins rooms.
pub trait Network {
    fn join_room(&self, config: &TransportConfig, room_id: &str) -> Result<Rc<dyn Room>>;
}

/// One peer's membership in a transport room.
///
/// Every registration is single-slot: registering again replaces the
/// previous handler.
pub trait Room {
    fn self_id(&self) -> PeerId;
    /// Send on a named action. `None` broadcasts to every other peer.
    fn send(&self, action: &str, data: Bytes, target: Option<&PeerId>);
    fn on_receive(&self, action: &str, handler: ReceiveHandler);
    fn on_peer_join(&self, handler: PeerHandler);
    fn on_peer_leave(&self, handler: PeerHandler);
    fn leave(&self);
}

/// A named action on a room, the send/receive pair of one channel.
#[derive(Clone)]
pub struct RawAction {
    room: Rc<dyn Room>,
    name: Rc<str>,
}

impl RawAction {
    pub fn new(room: Rc<dyn Room>, name: &str) -> Self {
        Self {
            room,
            name: Rc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, data: Bytes, target: Option<&PeerId>) {
        self.room.send(&self.name, data, target);
    }

    pub fn on_receive(&self, handler: impl FnMut(Bytes, PeerId) + 'static) {
        self.room.on_receive(&self.name, Box::new(handler));
    }
}
