use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt::Display,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::PeerId;

/// Public events the room sends to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// The admin is present and we are in its roster.
    Connected,
    /// Authority was lost or a new connection episode started.
    Disconnected,
    PeerJoined(PeerId),
    PeerLeft(PeerId),
}

impl Display for RoomEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomEvent::Connected => write!(f, "connected"),
            RoomEvent::Disconnected => write!(f, "disconnected"),
            RoomEvent::PeerJoined(peer) => write!(f, "{peer} joined"),
            RoomEvent::PeerLeft(peer) => write!(f, "{peer} left"),
        }
    }
}

/// A replaceable single subscriber.
struct EventSlot<A> {
    handler: RefCell<Option<Box<dyn FnMut(A)>>>,
}

impl<A> Default for EventSlot<A> {
    fn default() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }
}

impl<A: 'static> EventSlot<A> {
    fn set(&self, handler: impl FnMut(A) + 'static) {
        *self.handler.borrow_mut() = Some(Box::new(handler));
    }

    fn emit(&self, arg: A) {
        // Taken out for the call, so the handler may replace itself. Events
        // raised meanwhile are held back by `RoomEvents` until it returns.
        let handler = self.handler.borrow_mut().take();
        if let Some(mut handler) = handler {
            handler(arg);
            self.handler.borrow_mut().get_or_insert(handler);
        }
    }
}

#[derive(Default)]
pub(crate) struct RoomEvents {
    connected: EventSlot<()>,
    disconnected: EventSlot<()>,
    peer_join: EventSlot<PeerId>,
    peer_leave: EventSlot<PeerId>,
    inbox: RefCell<Option<mpsc::UnboundedSender<RoomEvent>>>,
    /// Events raised from inside a handler, fired after it returns.
    queued: RefCell<VecDeque<RoomEvent>>,
    dispatching: Cell<bool>,
}

impl RoomEvents {
    pub(crate) fn on_connected(&self, mut handler: impl FnMut() + 'static) {
        self.connected.set(move |()| handler());
    }

    pub(crate) fn on_disconnected(&self, mut handler: impl FnMut() + 'static) {
        self.disconnected.set(move |()| handler());
    }

    pub(crate) fn on_peer_join(&self, handler: impl FnMut(PeerId) + 'static) {
        self.peer_join.set(handler);
    }

    pub(crate) fn on_peer_leave(&self, handler: impl FnMut(PeerId) + 'static) {
        self.peer_leave.set(handler);
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.inbox.borrow_mut() = Some(sender);
        receiver
    }

    /// Fire `event`. Events raised by a handler while it runs are queued and
    /// fired in order once it returns.
    pub(crate) fn emit(&self, event: RoomEvent) {
        self.queued.borrow_mut().push_back(event);
        if self.dispatching.replace(true) {
            return;
        }
        loop {
            let next = self.queued.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.dispatch(event);
        }
        self.dispatching.set(false);
    }

    fn dispatch(&self, event: RoomEvent) {
        debug!("room event: {event}");
        let inbox = self.inbox.borrow().clone();
        if let Some(inbox) = inbox
            && inbox.send(event.clone()).is_err()
        {
            // Receiver dropped.
            self.inbox.borrow_mut().take();
        }
        match event {
            RoomEvent::Connected => self.connected.emit(()),
            RoomEvent::Disconnected => self.disconnected.emit(()),
            RoomEvent::PeerJoined(peer) => self.peer_join.emit(peer),
            RoomEvent::PeerLeft(peer) => self.peer_leave.emit(peer),
        }
    }
}
