//! In-process transport: every peer lives in the same thread and messages go
//! through one FIFO queue, which the owner pumps explicitly.

use anyhow::{Result, ensure};
use bytes::Bytes;
use rand::{Rng as _, distr::Alphanumeric};
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};
use tracing::{trace, warn};

use super::{Network, PeerHandler, ReceiveHandler, Room, TransportConfig};
use crate::PeerId;

const PEER_ID_LEN: usize = 20;
/// Upper bound for one `run_until_idle` call, in case peers keep answering each other.
const MAX_DELIVERIES: usize = 100_000;

type RoomKey = (String, String);

/// A message as it was handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: PeerId,
    pub to: Option<PeerId>,
    pub action: String,
    pub data: Bytes,
}

enum Delivery {
    Message {
        to: PeerId,
        from: PeerId,
        action: String,
        data: Bytes,
    },
    PeerJoin {
        to: PeerId,
        peer: PeerId,
    },
    PeerLeave {
        to: PeerId,
        peer: PeerId,
    },
}

impl Delivery {
    fn recipient(&self) -> &PeerId {
        match self {
            Delivery::Message { to, .. } => to,
            Delivery::PeerJoin { to, .. } => to,
            Delivery::PeerLeave { to, .. } => to,
        }
    }
}

#[derive(Default)]
struct Handlers {
    actions: HashMap<String, ReceiveHandler>,
    peer_join: Option<PeerHandler>,
    peer_leave: Option<PeerHandler>,
}

#[derive(Default)]
struct Hub {
    rooms: HashMap<RoomKey, Vec<PeerId>>,
    handlers: HashMap<PeerId, Rc<RefCell<Handlers>>>,
    queue: VecDeque<Delivery>,
    reserved_ids: VecDeque<PeerId>,
    history: Vec<Envelope>,
}

/// Shared hub for in-process peers. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `peer_id` for the next peer that joins instead of a random id.
    pub fn reserve_peer_id(&self, peer_id: impl Into<PeerId>) {
        self.hub.borrow_mut().reserved_ids.push_back(peer_id.into());
    }

    /// Peers currently in a room, in join order.
    pub fn members(&self, config: &TransportConfig, room_id: &str) -> Vec<PeerId> {
        let key = (config.app_id.clone(), room_id.to_string());
        self.hub
            .borrow()
            .rooms
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of deliveries waiting in the queue.
    pub fn pending(&self) -> usize {
        self.hub.borrow().queue.len()
    }

    /// Everything sent since the last call, in send order.
    pub fn take_history(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.hub.borrow_mut().history)
    }

    /// Deliver the oldest queued event. Returns false when the queue is empty.
    pub fn deliver_next(&self) -> bool {
        let (delivery, handlers) = {
            let mut hub = self.hub.borrow_mut();
            let Some(delivery) = hub.queue.pop_front() else {
                return false;
            };
            let handlers = hub.handlers.get(delivery.recipient()).cloned();
            (delivery, handlers)
        };
        let Some(handlers) = handlers else {
            trace!("dropping delivery to departed peer {}", delivery.recipient());
            return true;
        };

        // Handlers are taken out while they run so they may register
        // replacements or send without tripping over the borrow.
        match delivery {
            Delivery::Message {
                to,
                from,
                action,
                data,
            } => {
                let handler = handlers.borrow_mut().actions.remove(&action);
                match handler {
                    Some(mut handler) => {
                        handler(data, from);
                        handlers.borrow_mut().actions.entry(action).or_insert(handler);
                    }
                    None => trace!("{to} has no handler for '{action}', dropping"),
                }
            }
            Delivery::PeerJoin { peer, .. } => {
                let handler = handlers.borrow_mut().peer_join.take();
                if let Some(mut handler) = handler {
                    handler(peer);
                    handlers.borrow_mut().peer_join.get_or_insert(handler);
                }
            }
            Delivery::PeerLeave { peer, .. } => {
                let handler = handlers.borrow_mut().peer_leave.take();
                if let Some(mut handler) = handler {
                    handler(peer);
                    handlers.borrow_mut().peer_leave.get_or_insert(handler);
                }
            }
        }
        true
    }

    /// Deliver until the queue drains. Returns the number of deliveries made.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while delivered < MAX_DELIVERIES {
            if !self.deliver_next() {
                return delivered;
            }
            delivered += 1;
        }
        warn!("local network still busy after {MAX_DELIVERIES} deliveries");
        delivered
    }

    fn next_peer_id(&self) -> PeerId {
        if let Some(id) = self.hub.borrow_mut().reserved_ids.pop_front() {
            return id;
        }
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(PEER_ID_LEN)
            .map(char::from)
            .collect();
        PeerId::new(id)
    }
}

impl Network for LocalNetwork {
    fn join_room(&self, config: &TransportConfig, room_id: &str) -> Result<Rc<dyn Room>> {
        ensure!(!room_id.is_empty(), "room id must not be empty");
        let id = self.next_peer_id();
        let key = (config.app_id.clone(), room_id.to_string());

        let mut hub = self.hub.borrow_mut();
        ensure!(
            !hub.handlers.contains_key(&id),
            "peer id {id} is already in use"
        );
        let members = hub.rooms.entry(key.clone()).or_default();
        let existing = members.clone();
        members.push(id.clone());
        hub.handlers.insert(id.clone(), Default::default());
        for peer in existing {
            hub.queue.push_back(Delivery::PeerJoin {
                to: peer.clone(),
                peer: id.clone(),
            });
            hub.queue.push_back(Delivery::PeerJoin {
                to: id.clone(),
                peer,
            });
        }
        trace!("{id} joined room {room_id}");

        Ok(Rc::new(LocalRoom {
            id,
            key,
            hub: self.hub.clone(),
        }))
    }
}

/// A peer's handle on a `LocalNetwork` room.
pub struct LocalRoom {
    id: PeerId,
    key: RoomKey,
    hub: Rc<RefCell<Hub>>,
}

impl LocalRoom {
    fn handlers(&self) -> Option<Rc<RefCell<Handlers>>> {
        self.hub.borrow().handlers.get(&self.id).cloned()
    }
}

impl Room for LocalRoom {
    fn self_id(&self) -> PeerId {
        self.id.clone()
    }

    fn send(&self, action: &str, data: Bytes, target: Option<&PeerId>) {
        let mut hub = self.hub.borrow_mut();
        let recipients: Vec<PeerId> = match hub.rooms.get(&self.key) {
            Some(members) if members.contains(&self.id) => members
                .iter()
                .filter(|peer| **peer != self.id)
                .filter(|peer| target.is_none_or(|target| *peer == target))
                .cloned()
                .collect(),
            _ => {
                trace!("{} is not in a room, dropping '{action}'", self.id);
                return;
            }
        };
        hub.history.push(Envelope {
            from: self.id.clone(),
            to: target.cloned(),
            action: action.to_string(),
            data: data.clone(),
        });
        for to in recipients {
            hub.queue.push_back(Delivery::Message {
                to,
                from: self.id.clone(),
                action: action.to_string(),
                data: data.clone(),
            });
        }
    }

    fn on_receive(&self, action: &str, handler: ReceiveHandler) {
        if let Some(handlers) = self.handlers() {
            handlers
                .borrow_mut()
                .actions
                .insert(action.to_string(), handler);
        }
    }

    fn on_peer_join(&self, handler: PeerHandler) {
        if let Some(handlers) = self.handlers() {
            handlers.borrow_mut().peer_join = Some(handler);
        }
    }

    fn on_peer_leave(&self, handler: PeerHandler) {
        if let Some(handlers) = self.handlers() {
            handlers.borrow_mut().peer_leave = Some(handler);
        }
    }

    fn leave(&self) {
        let mut hub = self.hub.borrow_mut();
        if hub.handlers.remove(&self.id).is_none() {
            return;
        }
        let remaining = match hub.rooms.get_mut(&self.key) {
            Some(members) => {
                members.retain(|peer| *peer != self.id);
                members.clone()
            }
            None => Vec::new(),
        };
        for to in remaining {
            hub.queue.push_back(Delivery::PeerLeave {
                to,
                peer: self.id.clone(),
            });
        }
        trace!("{} left room {}", self.id, self.key.1);
    }
}
