//! Roster keeping done by the host peer.

use bytes::Bytes;
use std::rc::Rc;
use tracing::{debug, info};

use super::{GameRoom, RoomLink};
use crate::{
    Error, PeerId, PlayerInfo, PlayerMap,
    wire::{CHANNEL_GAME_JOIN, CHANNEL_PLAYER_INFO, CHANNEL_WELCOME, GameJoin, Welcome},
};

impl GameRoom {
    /// (HOST-ONLY) Add a bot player to the roster. Returns its id.
    pub fn add_bot(&self, name: &str) -> Result<PeerId, Error> {
        let link = self.host_link()?;
        let bot_index = link.bot_count.get();
        link.bot_count.set(bot_index + 1);
        let id = PeerId::new(format!("{}_{bot_index}", link.state.borrow().self_id()));
        info!("adding bot '{name}' as {id}");
        let bot = PlayerInfo::bot(id.clone(), name);
        link.update_roster(|roster| {
            roster.insert(bot.id.clone(), bot);
        });
        Ok(id)
    }

    /// (HOST-ONLY) Remove a bot player from the roster.
    pub fn remove_bot(&self, id: &PeerId) -> Result<(), Error> {
        let link = self.host_link()?;
        let is_bot = link
            .state
            .borrow()
            .known_player_info()
            .get(id)
            .is_some_and(PlayerInfo::is_bot);
        if !is_bot {
            return Err(Error::UnknownBot(id.clone()));
        }
        info!("removing bot {id}");
        link.update_roster(|roster| {
            roster.remove(id);
        });
        Ok(())
    }

    /// Bots in the host's latest roster.
    pub fn bots(&self) -> Vec<PlayerInfo> {
        let mut bots: Vec<PlayerInfo> = self
            .known_player_info()
            .values()
            .filter(|player| player.is_bot())
            .cloned()
            .collect();
        bots.sort_by(|a, b| a.id.cmp(&b.id));
        bots
    }

    fn host_link(&self) -> Result<&Rc<RoomLink>, Error> {
        let link = self.live_link()?;
        if !link.is_host() {
            return Err(Error::NotHost);
        }
        Ok(link)
    }
}

impl RoomLink {
    /// Greet a peer that just showed up with the current roster.
    pub(super) fn send_welcome(&self, peer: &PeerId) {
        let welcome = {
            let state = self.state.borrow();
            Welcome {
                admin_id: state.self_id().clone(),
                player_info: state.known_player_info().clone(),
            }
        };
        debug!("welcoming {peer}");
        self.send(CHANNEL_WELCOME, &welcome, Some(peer));
    }

    /// A peer asks to be listed in the roster.
    pub(super) fn on_game_join(&self, data: Bytes, sender: PeerId) {
        if !self.is_host() {
            debug!("ignoring join request from {sender}, we are not the host");
            return;
        }
        if !self.state.borrow().is_present(&sender) {
            debug!("ignoring join request from {sender}, who is not in the room");
            return;
        }
        let Some(join) = self.decode::<GameJoin>(CHANNEL_GAME_JOIN, &data, &sender) else {
            return;
        };
        match &join.chat_self_id {
            Some(chat_id) => info!("{sender} ({chat_id}) joins the game as '{}'", join.name),
            None => info!("{sender} joins the game as '{}'", join.name),
        }
        let player = PlayerInfo::new(sender.clone(), join.name);
        self.update_roster(|roster| {
            roster.insert(sender, player);
        });
    }

    /// Drop a departed peer from the roster, if it was listed.
    pub(super) fn drop_from_roster(&self, peer: &PeerId) {
        let listed = self.state.borrow().known_player_info().contains_key(peer);
        if listed {
            self.update_roster(|roster| {
                roster.remove(peer);
            });
        }
    }

    /// Change the roster, broadcast it and apply it locally.
    fn update_roster(&self, change: impl FnOnce(&mut PlayerMap)) {
        let mut roster = self.state.borrow().known_player_info().clone();
        change(&mut roster);
        self.send(CHANNEL_PLAYER_INFO, &roster, None);
        let effects = self.state.borrow_mut().apply_roster(roster);
        self.apply(effects);
    }
}
