//! Application channels restricted to the room admin.
//!
//! The admin talks to anyone and hears everyone. Every other peer only talks
//! to the admin and only hears the admin. The admin is looked up once, when
//! the channel is made.

use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use tracing::{debug, trace, warn};

use super::GameRoom;
use crate::{Error, PeerId, WireFormat, transport::RawAction, wire::is_system_channel};

/// Who a scoped channel talks to, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// We are the admin: plain send and receive.
    Admin,
    /// Everything goes to, and must come from, this admin.
    Observer { admin_id: Option<PeerId> },
}

pub struct ScopedSender<T> {
    action: RawAction,
    scope: Scope,
    wire: WireFormat,
    _payload: PhantomData<fn(&T)>,
}

pub struct ScopedReceiver<T> {
    action: RawAction,
    scope: Scope,
    wire: WireFormat,
    _payload: PhantomData<fn() -> T>,
}

impl GameRoom {
    /// Make the send/receive pair of a channel scoped to the current admin.
    pub fn make_scoped_channel<T>(
        &self,
        name: &str,
    ) -> Result<(ScopedSender<T>, ScopedReceiver<T>), Error> {
        if is_system_channel(name) {
            return Err(Error::ReservedChannel(name.to_string()));
        }
        let link = self.live_link()?;
        let scope = {
            let state = link.state.borrow();
            if state.is_admin() {
                Scope::Admin
            } else {
                Scope::Observer {
                    admin_id: state.admin_id().cloned(),
                }
            }
        };
        debug!("made channel '{name}' with scope {scope:?}");
        let action = RawAction::new(link.transport.clone(), name);
        Ok((
            ScopedSender {
                action: action.clone(),
                scope: scope.clone(),
                wire: link.wire,
                _payload: PhantomData,
            },
            ScopedReceiver {
                action,
                scope,
                wire: link.wire,
                _payload: PhantomData,
            },
        ))
    }
}

impl<T: Serialize> ScopedSender<T> {
    /// Send `data`. The admin broadcasts on `None` and unicasts on `Some`;
    /// everyone else always sends to the admin and `target` is ignored.
    pub fn send(&self, data: &T, target: Option<&PeerId>) -> Result<(), Error> {
        let bytes = self.wire.encode(data)?;
        match &self.scope {
            Scope::Admin => self.action.send(bytes, target),
            Scope::Observer {
                admin_id: Some(admin_id),
            } => self.action.send(bytes, Some(admin_id)),
            Scope::Observer { admin_id: None } => {
                debug!("no admin known for '{}', dropping send", self.action.name())
            }
        }
        Ok(())
    }
}

impl<T> ScopedSender<T> {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }
}

impl<T: DeserializeOwned + 'static> ScopedReceiver<T> {
    /// Register the channel's single receive handler.
    pub fn on_receive(&self, mut callback: impl FnMut(T, PeerId) + 'static) {
        let scope = self.scope.clone();
        let wire = self.wire;
        let name = self.action.name().to_string();
        self.action.on_receive(move |data, sender| {
            if let Scope::Observer { admin_id } = &scope
                && admin_id.as_ref() != Some(&sender)
            {
                trace!("dropping '{name}' from {sender}, who is not the admin");
                return;
            }
            match wire.decode::<T>(&data) {
                Ok(value) => callback(value, sender),
                Err(e) => warn!("dropping malformed '{name}' message from {sender}: {e}"),
            }
        });
    }
}

impl<T> ScopedReceiver<T> {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }
}

impl<T> Clone for ScopedSender<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            scope: self.scope.clone(),
            wire: self.wire,
            _payload: PhantomData,
        }
    }
}

impl<T> Clone for ScopedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            scope: self.scope.clone(),
            wire: self.wire,
            _payload: PhantomData,
        }
    }
}
