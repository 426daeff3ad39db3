use thiserror::Error;

use crate::types::DestinationId;

pub type TrackingResult<T> = Result<T, TrackingError>;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid credential for {destination}: {reason}")]
    InvalidCredential {
        destination: DestinationId,
        reason: String,
    },

    #[error("Script load failed for {destination}: {reason}")]
    ScriptLoad {
        destination: DestinationId,
        reason: String,
    },

    #[error("Destination call failed for {destination}: {reason}")]
    Destination {
        destination: DestinationId,
        reason: String,
    },

    #[error("Server forwarding error: {0}")]
    Forwarding(String),
}
