//! Live telemetry from BLE fitness sensors.
//!
//! Scans for heart rate monitors, running speed and cadence pods, treadmills
//! and similar peripherals, lets a [`Chooser`] pick one, and streams decoded
//! [`Measurement`]s from it until the link drops or the session is cancelled.
//!
//! ## Usage
//!
//! Here is an example on how to stream heart rate from the first heart rate
//! monitor found:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fitble::{
//!     BtleplugCentral, FirstMatch, ServiceProfile, Supervisor, SupervisorConfig, TelemetryEvent,
//! };
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     pretty_env_logger::init();
//!
//!     let central = Arc::new(BtleplugCentral::new(0).await?);
//!     let supervisor = Supervisor::new(central, FirstMatch::any(), SupervisorConfig::default());
//!     let mut events = supervisor.events();
//!
//!     // Scan for heart rate monitors and stream from the first one
//!     supervisor.connect(ServiceProfile::HeartRate).await?;
//!
//!     while let Some(event) = events.next().await {
//!         if let TelemetryEvent::Measurement(measurement) = event {
//!             println!("{:?}", measurement);
//!         }
//!     }
//!
//!     Ok(())
//! }
//!```

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use btleplug::api::BDAddr;

pub use btle::BtleplugCentral;
pub use central::{Advertisement, AdvertisementStream, BleCentral, NotificationStream, PeripheralRef};
pub use decoder::{
    decode, DeviceInfoField, Measurement, RscMeasurement, ZERO_SPEED_PACE_MIN_PER_KM,
};
pub use discovery::{DeviceStream, DiscoveryEvent, Scanner};
pub use error::{CentralError, DecodeError, Error, Result};
pub use inspect::{read_characteristics, CharacteristicReading};
pub use profile::ServiceProfile;
pub use selector::{
    CandidateList, CandidateStream, Chooser, FirstMatch, InteractiveSelector, SelectorControl,
    SelectorInput,
};
pub use session::{SessionConfig, SessionHandle, SessionState, TelemetrySession};
pub use sink::{EventSink, Lifecycle, Reading, TelemetryEvent, TelemetryStream};
pub use supervisor::{Supervisor, SupervisorConfig};

mod btle;
mod central;
mod decoder;
mod discovery;
mod error;
mod inspect;
mod profile;
mod selector;
mod session;
mod sink;
mod supervisor;

pub mod common;

#[cfg(test)]
mod testing;
