//! Game Room

mod channel;
mod events;
mod host;
mod state;

use anyhow::Result;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    Error, PeerId, PlayerInfo, PlayerMap, Session, WireFormat,
    transport::{Network, Room as Transport, TransportConfig},
    wire::{CHANNEL_GAME_JOIN, CHANNEL_PLAYER_INFO, CHANNEL_WELCOME, GameJoin, Welcome},
};
use state::Effect;

pub use channel::{Scope, ScopedReceiver, ScopedSender};
pub use events::RoomEvent;
pub use state::RoomState;

use events::RoomEvents;

pub struct GameRoom {
    session: Session,
    /// Registered handlers. Kept even when offline so registration never fails.
    events: Rc<RoomEvents>,
    /// Live membership, absent when the session names no room.
    link: Option<Rc<RoomLink>>,
}

/// A joined transport room together with its membership state.
pub(crate) struct RoomLink {
    transport: Rc<dyn Transport>,
    wire: WireFormat,
    chat_self_id: Option<String>,
    self_name: String,
    state: RefCell<RoomState>,
    events: Rc<RoomEvents>,
    /// Bots created so far, used to derive fresh bot ids.
    bot_count: Cell<usize>,
}

impl Drop for GameRoom {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.transport.leave();
        }
    }
}

impl GameRoom {
    /// Join the room named by `session`.
    ///
    /// Without a room id no transport is touched and the room stays offline
    /// for good, which is how solo play runs. Without a host id, or with our
    /// own id as host id, the local peer acts as host.
    pub fn join(network: &impl Network, session: Session) -> Result<Self> {
        let events = Rc::new(RoomEvents::default());
        let Some(room_id) = session.room_id.clone() else {
            info!("no room id given, playing offline");
            return Ok(Self {
                session,
                events,
                link: None,
            });
        };

        let config = TransportConfig {
            app_id: session.app_id.clone(),
        };
        let transport = network.join_room(&config, &room_id)?;
        let self_id = transport.self_id();
        let self_info = PlayerInfo::new(self_id.clone(), session.self_name.clone());
        let state = match &session.host_id {
            Some(host_id) if *host_id != self_id => RoomState::new(self_info, host_id.clone()),
            _ => RoomState::new_host(self_info),
        };
        info!(
            "{self_id} joined room {room_id} as {}",
            if state.is_host() { "host" } else { "guest" }
        );

        let link = Rc::new(RoomLink {
            transport,
            wire: session.wire_format,
            chat_self_id: session.chat_self_id.clone(),
            self_name: session.self_name.clone(),
            state: RefCell::new(state),
            events: events.clone(),
            bot_count: Cell::new(0),
        });
        link.register_handlers();

        Ok(Self {
            session,
            events,
            link: Some(link),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True when the session named no room.
    pub fn is_offline(&self) -> bool {
        self.link.is_none()
    }

    pub fn self_id(&self) -> Option<PeerId> {
        self.read(|state| state.self_id().clone())
    }

    pub fn host_id(&self) -> Option<PeerId> {
        self.read(|state| state.host_id().clone())
    }

    pub fn admin_id(&self) -> Option<PeerId> {
        self.read(|state| state.admin_id().cloned()).flatten()
    }

    pub fn is_admin(&self) -> bool {
        self.read(RoomState::is_admin).unwrap_or(false)
    }

    pub fn is_host(&self) -> bool {
        self.read(RoomState::is_host).unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.read(RoomState::is_connected).unwrap_or(false)
    }

    /// Snapshot of the membership state.
    pub fn state(&self) -> Option<RoomState> {
        self.read(RoomState::clone)
    }

    /// Every player ever listed by the host.
    pub fn player_info(&self) -> PlayerMap {
        self.read(|state| state.player_info().clone())
            .unwrap_or_default()
    }

    /// The host's latest roster.
    pub fn known_player_info(&self) -> PlayerMap {
        self.read(|state| state.known_player_info().clone())
            .unwrap_or_default()
    }

    /// Players currently present, ourselves included.
    pub fn connected_player_info(&self) -> PlayerMap {
        self.read(|state| state.connected_player_info().clone())
            .unwrap_or_default()
    }

    /// Peers present on the transport that no roster has named yet.
    pub fn infoless_players(&self) -> HashSet<PeerId> {
        self.read(|state| state.infoless_players().clone())
            .unwrap_or_default()
    }

    pub fn on_connected(&self, handler: impl FnMut() + 'static) {
        self.events.on_connected(handler);
    }

    pub fn on_disconnected(&self, handler: impl FnMut() + 'static) {
        self.events.on_disconnected(handler);
    }

    pub fn on_peer_join(&self, handler: impl FnMut(PeerId) + 'static) {
        self.events.on_peer_join(handler);
    }

    pub fn on_peer_leave(&self, handler: impl FnMut(PeerId) + 'static) {
        self.events.on_peer_leave(handler);
    }

    /// Receive every event through a channel as well. A new subscription
    /// replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Leave the transport room. Other peers see us leave.
    pub fn leave(&self) {
        let Some(link) = &self.link else {
            return;
        };
        link.transport.leave();
        let effects = link.state.borrow_mut().handle_local_leave();
        link.apply(effects);
    }

    /// The link of a room that has not been left yet.
    fn live_link(&self) -> Result<&Rc<RoomLink>, Error> {
        match &self.link {
            Some(link) if !link.state.borrow().has_left() => Ok(link),
            _ => Err(Error::Offline),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&RoomState) -> R) -> Option<R> {
        self.link.as_ref().map(|link| f(&*link.state.borrow()))
    }
}

impl RoomLink {
    fn register_handlers(self: &Rc<Self>) {
        self.listen(CHANNEL_WELCOME, RoomLink::on_welcome);
        self.listen(CHANNEL_PLAYER_INFO, RoomLink::on_player_info);
        self.listen(CHANNEL_GAME_JOIN, RoomLink::on_game_join);

        let link = Rc::downgrade(self);
        self.transport.on_peer_join(Box::new(move |peer| {
            if let Some(link) = link.upgrade() {
                link.on_peer_join(peer);
            }
        }));
        let link = Rc::downgrade(self);
        self.transport.on_peer_leave(Box::new(move |peer| {
            if let Some(link) = link.upgrade() {
                link.on_peer_leave(peer);
            }
        }));
    }

    fn listen(self: &Rc<Self>, channel: &str, handler: fn(&RoomLink, Bytes, PeerId)) {
        let link = Rc::downgrade(self);
        self.transport.on_receive(
            channel,
            Box::new(move |data, sender| {
                if let Some(link) = link.upgrade() {
                    handler(&link, data, sender);
                }
            }),
        );
    }

    fn on_welcome(&self, data: Bytes, sender: PeerId) {
        let Some(welcome) = self.decode::<Welcome>(CHANNEL_WELCOME, &data, &sender) else {
            return;
        };
        let effects = self.state.borrow_mut().handle_welcome(&sender, welcome);
        self.apply(effects);
    }

    fn on_player_info(&self, data: Bytes, sender: PeerId) {
        let Some(roster) = self.decode::<PlayerMap>(CHANNEL_PLAYER_INFO, &data, &sender) else {
            return;
        };
        let effects = self.state.borrow_mut().handle_player_info(&sender, roster);
        self.apply(effects);
    }

    fn on_peer_join(&self, peer: PeerId) {
        if self.is_host() {
            self.send_welcome(&peer);
        }
        let effects = self.state.borrow_mut().handle_peer_join(peer);
        self.apply(effects);
    }

    fn on_peer_leave(&self, peer: PeerId) {
        let effects = self.state.borrow_mut().handle_peer_leave(peer.clone());
        self.apply(effects);
        if self.is_host() {
            self.drop_from_roster(&peer);
        }
    }

    fn is_host(&self) -> bool {
        self.state.borrow().is_host()
    }

    /// Carry out effects in order. No state borrow is held here, so event
    /// handlers may call back into the room.
    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event) => self.events.emit(event),
                Effect::AnnounceSelf => self.announce_self(),
            }
        }
    }

    fn announce_self(&self) {
        let host_id = self.state.borrow().host_id().clone();
        let join = GameJoin {
            chat_self_id: self.chat_self_id.clone(),
            name: self.self_name.clone(),
        };
        debug!("asking host {host_id} to add us to the roster");
        self.send(CHANNEL_GAME_JOIN, &join, Some(&host_id));
    }

    fn send<T: Serialize>(&self, channel: &str, value: &T, target: Option<&PeerId>) {
        match self.wire.encode(value) {
            Ok(bytes) => self.transport.send(channel, bytes, target),
            Err(e) => warn!("failed to encode '{channel}' message: {e}"),
        }
    }

    fn decode<T: DeserializeOwned>(&self, channel: &str, data: &[u8], sender: &PeerId) -> Option<T> {
        match self.wire.decode(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("dropping malformed '{channel}' message from {sender}: {e}");
                None
            }
        }
    }
}
