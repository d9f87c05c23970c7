mod error;
mod peer;
mod player;
mod room;
mod session;
pub mod transport;
pub mod wire;

pub use error::Error;
pub use peer::PeerId;
pub use player::{PlayerControl, PlayerInfo, PlayerMap};
pub use room::{GameRoom, RoomEvent, RoomState, Scope, ScopedReceiver, ScopedSender};
pub use session::{DEFAULT_APP_ID, DEFAULT_SELF_NAME, Session};
pub use transport::local::LocalNetwork;
pub use wire::WireFormat;
