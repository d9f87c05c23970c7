use thiserror::Error;

use crate::PeerId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Room has no transport (no room id was given, or the room was left).")]
    Offline,
    #[error("Only the host can do that.")]
    NotHost,
    #[error("Channel name '{0}' is reserved for room coordination.")]
    ReservedChannel(String),
    #[error("No bot with id {0} in the roster.")]
    UnknownBot(PeerId),
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Postcard codec error: {0}")]
    Postcard(#[from] postcard::Error),
}
