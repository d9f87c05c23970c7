//! Membership and authority bookkeeping.
//!
//! `RoomState` never talks to the transport itself. Every inbound event is
//! turned into a list of [`Effect`]s which the room carries out in order once
//! the state has been updated.

use std::collections::HashSet;
use tracing::{debug, info};

use super::RoomEvent;
use crate::{PeerId, PlayerInfo, PlayerMap, wire::Welcome};

/// Something the room has to do after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    Emit(RoomEvent),
    /// Ask the host to put us in its roster.
    AnnounceSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    self_id: PeerId,
    host_id: PeerId,
    admin_id: Option<PeerId>,
    /// Last roster received from the host.
    known_player_info: PlayerMap,
    /// Every roster entry ever seen. Only grows.
    player_info: PlayerMap,
    /// Peers currently present, self included.
    connected_player_info: PlayerMap,
    /// Present on the transport, but not in any roster yet.
    infoless_players: HashSet<PeerId>,
    is_connected: bool,
    /// Set once the local peer leaves. Nothing reconnects after that.
    has_left: bool,
}

impl RoomState {
    /// State of a peer that waits for `host_id` to welcome it.
    pub(crate) fn new(self_info: PlayerInfo, host_id: PeerId) -> Self {
        let self_id = self_info.id.clone();
        let mut connected_player_info = PlayerMap::default();
        connected_player_info.insert(self_id.clone(), self_info);
        Self {
            self_id,
            host_id,
            admin_id: None,
            known_player_info: PlayerMap::default(),
            player_info: PlayerMap::default(),
            connected_player_info,
            infoless_players: HashSet::new(),
            is_connected: false,
            has_left: false,
        }
    }

    /// State of the host, which is its own admin and starts out connected.
    pub(crate) fn new_host(self_info: PlayerInfo) -> Self {
        let self_id = self_info.id.clone();
        let roster: PlayerMap = [self_info.clone()].into_iter().collect();
        let mut state = Self::new(self_info, self_id.clone());
        state.admin_id = Some(self_id);
        state.known_player_info = roster.clone();
        state.player_info = roster;
        state.is_connected = true;
        state
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    pub fn host_id(&self) -> &PeerId {
        &self.host_id
    }

    pub fn admin_id(&self) -> Option<&PeerId> {
        self.admin_id.as_ref()
    }

    pub fn known_player_info(&self) -> &PlayerMap {
        &self.known_player_info
    }

    pub fn player_info(&self) -> &PlayerMap {
        &self.player_info
    }

    pub fn connected_player_info(&self) -> &PlayerMap {
        &self.connected_player_info
    }

    pub fn infoless_players(&self) -> &HashSet<PeerId> {
        &self.infoless_players
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn has_left(&self) -> bool {
        self.has_left
    }

    pub fn is_admin(&self) -> bool {
        self.admin_id.as_ref() == Some(&self.self_id)
    }

    pub fn is_host(&self) -> bool {
        self.self_id == self.host_id
    }

    /// Whether the transport currently reports `peer` as present.
    pub fn is_present(&self, peer: &PeerId) -> bool {
        self.connected_player_info.contains_key(peer) || self.infoless_players.contains(peer)
    }

    /// A `welcome` from `sender` starts a new connection episode.
    pub(crate) fn handle_welcome(&mut self, sender: &PeerId, welcome: Welcome) -> Vec<Effect> {
        if *sender != self.host_id {
            debug!("ignoring welcome from {sender}, who is not the host");
            return Vec::new();
        }
        let mut effects = Vec::new();
        if self.is_connected {
            self.is_connected = false;
            effects.push(Effect::Emit(RoomEvent::Disconnected));
        }
        info!("{} is now the room admin", welcome.admin_id);
        self.admin_id = Some(welcome.admin_id);
        if let Some(info) = welcome.player_info.get(&self.self_id) {
            self.connected_player_info
                .insert(self.self_id.clone(), info.clone());
        }
        effects.extend(self.apply_roster(welcome.player_info));
        effects
    }

    /// A `playerInfo` roster broadcast.
    pub(crate) fn handle_player_info(&mut self, sender: &PeerId, roster: PlayerMap) -> Vec<Effect> {
        if *sender != self.host_id {
            debug!("ignoring roster from {sender}, who is not the host");
            return Vec::new();
        }
        self.apply_roster(roster)
    }

    /// Merge a roster that is known to come from the host.
    pub(crate) fn apply_roster(&mut self, roster: PlayerMap) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (id, info) in roster.iter() {
            self.player_info.insert(id.clone(), info.clone());
            if let Some(connected) = self.connected_player_info.get_mut(id) {
                *connected = info.clone();
            }
            if self.infoless_players.remove(id) {
                debug!("{id} is now known as '{info}'");
                self.connected_player_info.insert(id.clone(), info.clone());
                effects.push(Effect::Emit(RoomEvent::PeerJoined(id.clone())));
            }
        }
        self.known_player_info = roster;
        if !self.is_connected {
            effects.extend(self.check_connected());
        }
        effects
    }

    /// A peer appeared on the transport.
    pub(crate) fn handle_peer_join(&mut self, peer: PeerId) -> Vec<Effect> {
        let Some(info) = self.player_info.get(&peer).cloned() else {
            debug!("{peer} joined before we know who they are");
            self.infoless_players.insert(peer);
            return Vec::new();
        };
        let mut effects = Vec::new();
        self.connected_player_info.insert(peer.clone(), info);
        if !self.is_connected {
            effects.extend(self.check_connected());
        }
        effects.push(Effect::Emit(RoomEvent::PeerJoined(peer)));
        effects
    }

    /// A peer left the transport. Losing the admin or the host is terminal.
    pub(crate) fn handle_peer_leave(&mut self, peer: PeerId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.admin_id.as_ref() == Some(&peer) || peer == self.host_id {
            info!("authority {peer} left the room");
            self.is_connected = false;
            effects.push(Effect::Emit(RoomEvent::Disconnected));
        }
        self.connected_player_info.remove(&peer);
        self.infoless_players.remove(&peer);
        effects.push(Effect::Emit(RoomEvent::PeerLeft(peer)));
        effects
    }

    /// The local peer left the room.
    pub(crate) fn handle_local_leave(&mut self) -> Vec<Effect> {
        self.has_left = true;
        if !self.is_connected {
            return Vec::new();
        }
        self.is_connected = false;
        vec![Effect::Emit(RoomEvent::Disconnected)]
    }

    fn check_connected(&mut self) -> Vec<Effect> {
        if self.has_left {
            return Vec::new();
        }
        let Some(admin_id) = &self.admin_id else {
            return Vec::new();
        };
        if !self.connected_player_info.contains_key(admin_id) {
            return Vec::new();
        }
        if !self.known_player_info.contains_key(&self.self_id) {
            return vec![Effect::AnnounceSelf];
        }
        info!("connected to admin {admin_id}");
        self.is_connected = true;
        vec![Effect::Emit(RoomEvent::Connected)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> PlayerInfo {
        PlayerInfo::new(id.into(), id.to_lowercase())
    }

    fn roster(ids: &[&str]) -> PlayerMap {
        ids.iter().map(|id| info(id)).collect()
    }

    fn welcome(admin: &str, ids: &[&str]) -> Welcome {
        Welcome {
            admin_id: admin.into(),
            player_info: roster(ids),
        }
    }

    fn joiner(id: &str, host: &str) -> RoomState {
        RoomState::new(PlayerInfo::new(id.into(), "N00B"), host.into())
    }

    fn emitted(effects: &[Effect]) -> Vec<RoomEvent> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Emit(event) => Some(event.clone()),
                Effect::AnnounceSelf => None,
            })
            .collect()
    }

    /// The derived flag must agree with the predicate it is derived from.
    fn assert_predicate(state: &RoomState) {
        let expected = state
            .admin_id
            .as_ref()
            .is_some_and(|admin| state.connected_player_info.contains_key(admin))
            && state.known_player_info.contains_key(&state.self_id);
        assert_eq!(state.is_connected, expected);
    }

    #[test]
    fn test_self_is_seeded_as_connected() {
        let state = joiner("A", "H");
        assert_eq!(state.connected_player_info["A"].name, "N00B");
        assert!(!state.is_connected());
        assert!(!state.is_admin());
        assert_eq!(state.admin_id(), None);
    }

    #[test]
    fn test_host_starts_connected() {
        let state = RoomState::new_host(info("H"));
        assert!(state.is_connected());
        assert!(state.is_admin());
        assert!(state.is_host());
        assert!(state.known_player_info.contains_key("H"));
        assert_predicate(&state);
    }

    #[test]
    fn test_welcome_connects_joiner() {
        let mut state = joiner("A", "H");
        assert!(state.handle_peer_join("H".into()).is_empty());
        assert!(state.infoless_players.contains("H"));

        let effects = state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        assert_eq!(
            emitted(&effects),
            vec![RoomEvent::PeerJoined("H".into()), RoomEvent::Connected]
        );
        assert_eq!(state.admin_id(), Some(&PeerId::from("H")));
        assert!(state.is_connected());
        assert_eq!(state.connected_player_info["A"].name, "a");
        assert!(state.infoless_players.is_empty());
        assert_predicate(&state);
    }

    #[test]
    fn test_welcome_without_self_asks_host() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        let effects = state.handle_welcome(&"H".into(), welcome("H", &["H"]));
        assert_eq!(
            effects,
            vec![
                Effect::Emit(RoomEvent::PeerJoined("H".into())),
                Effect::AnnounceSelf
            ]
        );
        assert!(!state.is_connected());
        assert_eq!(state.connected_player_info["A"].name, "N00B");

        let effects = state.handle_player_info(&"H".into(), roster(&["H", "A"]));
        assert_eq!(effects, vec![Effect::Emit(RoomEvent::Connected)]);
        assert_predicate(&state);
    }

    #[test]
    fn test_welcome_while_connected_starts_new_episode() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        assert!(state.is_connected());

        let effects = state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        assert_eq!(
            emitted(&effects),
            vec![RoomEvent::Disconnected, RoomEvent::Connected]
        );
        assert!(state.is_connected());
    }

    #[test]
    fn test_welcome_from_stranger_is_ignored() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("M".into());
        let before = state.clone();
        let effects = state.handle_welcome(&"M".into(), welcome("M", &["M", "A"]));
        assert!(effects.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_roster_from_stranger_is_ignored() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_peer_join("M".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        let before = state.clone();

        let effects = state.handle_player_info(&"M".into(), roster(&["H", "A", "M"]));
        assert!(effects.is_empty());
        assert_eq!(state, before);
        assert!(state.infoless_players.contains("M"));
    }

    #[test]
    fn test_infoless_peer_joins_once_its_info_arrives() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));

        assert!(state.handle_peer_join("B".into()).is_empty());
        assert!(state.infoless_players.contains("B"));
        assert!(!state.connected_player_info.contains_key("B"));

        let effects = state.handle_player_info(&"H".into(), roster(&["H", "A"]));
        assert!(emitted(&effects).is_empty());

        let effects = state.handle_player_info(&"H".into(), roster(&["H", "A", "B"]));
        assert_eq!(emitted(&effects), vec![RoomEvent::PeerJoined("B".into())]);
        assert!(state.connected_player_info.contains_key("B"));

        let effects = state.handle_player_info(&"H".into(), roster(&["H", "A", "B"]));
        assert!(emitted(&effects).is_empty());
    }

    #[test]
    fn test_known_peer_joins_immediately() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A", "B"]));
        let effects = state.handle_peer_join("B".into());
        assert_eq!(emitted(&effects), vec![RoomEvent::PeerJoined("B".into())]);
        assert!(state.connected_player_info.contains_key("B"));
    }

    #[test]
    fn test_admin_rejoining_reconnects() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        state.handle_peer_leave("H".into());
        assert!(!state.is_connected());

        let effects = state.handle_peer_join("H".into());
        assert_eq!(
            emitted(&effects),
            vec![RoomEvent::Connected, RoomEvent::PeerJoined("H".into())]
        );
        assert_predicate(&state);
    }

    #[test]
    fn test_admin_leave_disconnects_once() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_peer_join("B".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A", "B"]));
        assert!(state.is_connected());

        let effects = state.handle_peer_leave("H".into());
        assert_eq!(
            emitted(&effects),
            vec![RoomEvent::Disconnected, RoomEvent::PeerLeft("H".into())]
        );
        assert!(!state.is_connected());
        assert!(!state.connected_player_info.contains_key("H"));
        assert!(state.connected_player_info.contains_key("B"));
        assert_predicate(&state);
    }

    #[test]
    fn test_host_leave_disconnects_even_when_admin_is_elsewhere() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_peer_join("B".into());
        state.handle_welcome(&"H".into(), welcome("B", &["H", "A", "B"]));
        assert!(state.is_connected());
        assert!(!state.is_admin());

        let effects = state.handle_peer_leave("H".into());
        assert_eq!(
            emitted(&effects),
            vec![RoomEvent::Disconnected, RoomEvent::PeerLeft("H".into())]
        );
        assert!(!state.is_connected());
    }

    #[test]
    fn test_ordinary_leave_keeps_connection() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        state.handle_peer_join("B".into());
        state.handle_peer_join("C".into());
        state.handle_welcome(&"H".into(), welcome("H", &["H", "A", "B"]));

        let effects = state.handle_peer_leave("B".into());
        assert_eq!(emitted(&effects), vec![RoomEvent::PeerLeft("B".into())]);
        assert!(state.is_connected());
        assert!(state.player_info.contains_key("B"));

        // An infoless peer that leaves is not promoted by a later roster.
        state.handle_peer_leave("C".into());
        let effects = state.handle_player_info(&"H".into(), roster(&["H", "A", "C"]));
        assert!(emitted(&effects).is_empty());
        assert!(!state.connected_player_info.contains_key("C"));
    }

    #[test]
    fn test_player_info_only_grows() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        let rosters = [
            roster(&["H", "A"]),
            roster(&["H", "A", "B"]),
            roster(&["H"]),
            roster(&["C"]),
            PlayerMap::default(),
        ];
        let mut previous: HashSet<PeerId> = HashSet::new();
        for roster in rosters {
            state.handle_player_info(&"H".into(), roster);
            let keys: HashSet<PeerId> = state.player_info.keys().cloned().collect();
            assert!(keys.is_superset(&previous));
            previous = keys;
        }
        assert_eq!(previous.len(), 4);
        assert!(state.known_player_info.is_empty());
    }

    #[test]
    fn test_connected_becomes_true_once_per_episode() {
        let mut state = joiner("A", "H");
        state.handle_peer_join("H".into());
        let mut connects = 0;
        for _ in 0..3 {
            let effects = state.handle_player_info(&"H".into(), roster(&["H", "A"]));
            connects += emitted(&effects)
                .iter()
                .filter(|event| **event == RoomEvent::Connected)
                .count();
        }
        // No admin is known without a welcome.
        assert_eq!(connects, 0);

        let effects = state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        assert!(emitted(&effects).contains(&RoomEvent::Connected));
        for _ in 0..3 {
            let effects = state.handle_player_info(&"H".into(), roster(&["H", "A"]));
            assert!(!emitted(&effects).contains(&RoomEvent::Connected));
        }
    }

    #[test]
    fn test_local_leave() {
        let mut state = RoomState::new_host(info("H"));
        assert_eq!(
            state.handle_local_leave(),
            vec![Effect::Emit(RoomEvent::Disconnected)]
        );
        assert!(state.handle_local_leave().is_empty());
    }

    #[test]
    fn test_roster_after_local_leave_does_not_reconnect() {
        let mut state = RoomState::new_host(info("H"));
        state.handle_local_leave();
        assert!(state.has_left());

        let effects = state.apply_roster(roster(&["H", "H_0"]));
        assert!(effects.is_empty());
        assert!(!state.is_connected());
    }

    #[test]
    fn test_guest_that_left_ignores_a_late_welcome() {
        let mut state = RoomState::new(info("A"), "H".into());
        state.handle_peer_join("H".into());
        state.handle_local_leave();

        let effects = state.handle_welcome(&"H".into(), welcome("H", &["H", "A"]));
        assert!(!emitted(&effects).contains(&RoomEvent::Connected));
        assert!(!effects.contains(&Effect::AnnounceSelf));
        assert!(!state.is_connected());
    }
}
