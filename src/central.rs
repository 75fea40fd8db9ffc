use std::pin::Pin;

use async_trait::async_trait;
use btleplug::api::BDAddr;
use futures::Stream;
use uuid::Uuid;

use crate::CentralError;

pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;

/// Raw notification payloads. The stream ends when the link is lost.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// A single advertisement sighting reported by the central.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub address: BDAddr,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
}

/// A discovered peripheral. The address is its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralRef {
    address: BDAddr,
    name: Option<String>,
    rssi: Option<i16>,
}

impl PeripheralRef {
    pub fn new(address: BDAddr, name: Option<String>, rssi: Option<i16>) -> Self {
        Self { address, name, rssi }
    }

    #[inline]
    pub fn address(&self) -> BDAddr {
        self.address
    }

    /// Local name of the device
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Signal strength at the last sighting
    #[inline]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Folds a later sighting into this one. Returns whether anything changed.
    pub(crate) fn update(&mut self, advertisement: &Advertisement) -> bool {
        let mut changed = false;

        if advertisement.local_name.is_some() && advertisement.local_name != self.name {
            self.name = advertisement.local_name.clone();
            changed = true;
        }
        if advertisement.rssi.is_some() && advertisement.rssi != self.rssi {
            self.rssi = advertisement.rssi;
            changed = true;
        }

        changed
    }
}

impl From<&Advertisement> for PeripheralRef {
    fn from(advertisement: &Advertisement) -> Self {
        PeripheralRef::new(
            advertisement.address,
            advertisement.local_name.clone(),
            advertisement.rssi,
        )
    }
}

/// The BLE central capability the telemetry pipeline is built on.
///
/// Implementations own the transport. Failures are reported as an opaque
/// [`CentralError`].
#[async_trait]
pub trait BleCentral: Send + Sync + 'static {
    /// An established connection to a peripheral.
    type Link: Clone + Send + Sync + 'static;

    /// Starts scanning. When `service` is set only peripherals advertising
    /// that service are reported.
    async fn scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream, CentralError>;

    async fn stop_scan(&self) -> Result<(), CentralError>;

    async fn connect(&self, peripheral: &PeripheralRef) -> Result<Self::Link, CentralError>;

    async fn read(&self, link: &Self::Link, characteristic: Uuid) -> Result<Vec<u8>, CentralError>;

    async fn subscribe(
        &self,
        link: &Self::Link,
        characteristic: Uuid,
    ) -> Result<NotificationStream, CentralError>;

    async fn unsubscribe(&self, link: &Self::Link, characteristic: Uuid) -> Result<(), CentralError>;

    async fn disconnect(&self, link: &Self::Link) -> Result<(), CentralError>;
}
