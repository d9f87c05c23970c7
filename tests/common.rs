#![allow(dead_code)]

use p2p_game_room::{
    GameRoom, LocalNetwork, PeerId, PlayerMap, RoomEvent, Session, WireFormat,
    transport::{Network, Room, TransportConfig},
};
use serde::Serialize;
use std::{cell::RefCell, rc::Rc};

pub const ROOM: &str = "test-room";

pub type EventLog = Rc<RefCell<Vec<RoomEvent>>>;

pub fn config() -> TransportConfig {
    TransportConfig {
        app_id: Session::default().app_id,
    }
}

pub fn setup_host(network: &LocalNetwork, name: &str) -> anyhow::Result<GameRoom> {
    let room = GameRoom::join(network, Session::default().with_room(ROOM).with_name(name))?;
    assert!(room.is_host());
    assert!(room.is_connected());
    Ok(room)
}

pub fn join_guest(network: &LocalNetwork, host_id: &PeerId, name: &str) -> anyhow::Result<GameRoom> {
    let session = Session::default()
        .with_room(ROOM)
        .with_host(host_id.clone())
        .with_name(name);
    let room = GameRoom::join(network, session)?;
    assert!(!room.is_host());
    Ok(room)
}

/// Host plus `names.len()` guests, all settled and connected.
pub fn setup_lobby(network: &LocalNetwork, names: &[&str]) -> anyhow::Result<(GameRoom, Vec<GameRoom>)> {
    let host = setup_host(network, "host")?;
    let host_id = host.self_id().unwrap();
    let mut guests = Vec::new();
    for name in names {
        guests.push(join_guest(network, &host_id, name)?);
        network.run_until_idle();
    }
    for guest in &guests {
        assert!(guest.is_connected());
    }
    Ok((host, guests))
}

/// Record every callback event of a room.
pub fn record_events(room: &GameRoom) -> EventLog {
    let log = EventLog::default();
    let events = log.clone();
    room.on_connected(move || events.borrow_mut().push(RoomEvent::Connected));
    let events = log.clone();
    room.on_disconnected(move || events.borrow_mut().push(RoomEvent::Disconnected));
    let events = log.clone();
    room.on_peer_join(move |peer| events.borrow_mut().push(RoomEvent::PeerJoined(peer)));
    let events = log.clone();
    room.on_peer_leave(move |peer| events.borrow_mut().push(RoomEvent::PeerLeft(peer)));
    log
}

pub fn count(log: &EventLog, event: &RoomEvent) -> usize {
    log.borrow().iter().filter(|e| *e == event).count()
}

/// Join the test room as a bare transport peer, outside any `GameRoom`.
pub fn raw_peer(network: &LocalNetwork, id: &str) -> anyhow::Result<Rc<dyn Room>> {
    network.reserve_peer_id(id);
    network.join_room(&config(), ROOM)
}

pub fn raw_send<T: Serialize>(peer: &Rc<dyn Room>, action: &str, value: &T, target: Option<&PeerId>) {
    let bytes = WireFormat::Json.encode(value).unwrap();
    peer.send(action, bytes, target);
}

pub fn names(roster: &PlayerMap) -> Vec<String> {
    let mut names: Vec<String> = roster.values().map(|p| p.name.clone()).collect();
    names.sort();
    names
}
