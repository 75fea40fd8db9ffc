use std::time::Duration;

use btleplug::api::BDAddr;
use uuid::Uuid;

use crate::ServiceProfile;

/// Failure reported by a [`BleCentral`](crate::BleCentral) implementation.
///
/// Only the message survives; callers never branch on transport details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CentralError {
    message: String,
}

impl CentralError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<btleplug::Error> for CentralError {
    fn from(e: btleplug::Error) -> Self {
        CentralError::new(e.to_string())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Starting or stopping a scan failed. The scan is no longer running.
    #[error("Discovery failed: {0}")]
    Discovery(CentralError),

    /// A selection was committed for a candidate that is not known.
    #[error("Selected index {index} is out of range, {available} candidates known")]
    SelectionOutOfRange { index: usize, available: usize },

    /// The link to the peripheral could not be established.
    #[error("Could not connect to {address}: {source}")]
    Connect {
        address: BDAddr,
        source: CentralError,
    },

    /// Registering for notifications failed after connecting.
    #[error("Could not subscribe to {characteristic}: {source}")]
    Subscribe {
        characteristic: Uuid,
        source: CentralError,
    },

    /// A one-shot characteristic read failed.
    #[error("Could not read {characteristic}: {source}")]
    Read {
        characteristic: Uuid,
        source: CentralError,
    },

    /// Teardown did not finish in time. The link may have leaked.
    #[error("Teardown did not complete within {0:?}")]
    TeardownTimeout(Duration),

    /// The profile has no notify characteristic to stream from.
    #[error("{0} has no measurement characteristic to stream")]
    NoMeasurementCharacteristic(ServiceProfile),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-packet decode failure. Never fatal to a session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Payload too long: expected at most {max} bytes, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error("Characteristic {characteristic} is not decodable for {profile}")]
    UnknownCharacteristic {
        profile: ServiceProfile,
        characteristic: Uuid,
    },
}
