//! [`BleCentral`] backed by the platform adapter through btleplug.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{future, stream, StreamExt};
use uuid::Uuid;

use crate::central::{Advertisement, AdvertisementStream, BleCentral, NotificationStream};
use crate::{CentralError, PeripheralRef};

pub struct BtleplugCentral {
    _manager: Manager,
    adapter: Adapter,
}

impl BtleplugCentral {
    /// Opens the Bluetooth adapter at `adapter_index`. The first adapter is
    /// usually what you want.
    pub async fn new(adapter_index: usize) -> Result<Self, CentralError> {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;

        if adapter_index >= adapters.len() {
            return Err(CentralError::new(format!(
                "No Bluetooth adapter at index {}, {} found",
                adapter_index,
                adapters.len()
            )));
        }

        let adapter = adapters.swap_remove(adapter_index);

        log::trace!("Using adapter: {:?}", adapter);

        Ok(Self {
            _manager: manager,
            adapter,
        })
    }

    async fn find_peripheral(&self, peripheral: &PeripheralRef) -> Result<Peripheral, CentralError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == peripheral.address())
            .ok_or_else(|| CentralError::new(format!("{} is not known", peripheral.address())))
    }
}

fn find_characteristic(link: &Peripheral, uuid: Uuid) -> Result<Characteristic, CentralError> {
    link.characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| CentralError::new(format!("{} has no characteristic {}", link.address(), uuid)))
}

#[async_trait]
impl BleCentral for BtleplugCentral {
    type Link = Peripheral;

    async fn scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream, CentralError> {
        let events = self.adapter.events().await?;

        let filter = ScanFilter {
            services: service.into_iter().collect(),
        };
        self.adapter.start_scan(filter).await?;

        let adapter = self.adapter.clone();
        let advertisements = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => return None,
                };

                let peripheral = adapter.peripheral(&id).await.ok()?;
                let properties = peripheral.properties().await.ok().flatten();

                Some(Advertisement {
                    address: peripheral.address(),
                    local_name: properties.as_ref().and_then(|p| p.local_name.clone()),
                    rssi: properties.as_ref().and_then(|p| p.rssi),
                    services: properties.map(|p| p.services).unwrap_or_default(),
                })
            }
        });

        Ok(Box::pin(advertisements))
    }

    async fn stop_scan(&self) -> Result<(), CentralError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralRef) -> Result<Peripheral, CentralError> {
        let link = self.find_peripheral(peripheral).await?;

        if !link.is_connected().await? {
            log::debug!("Connecting to device {}", link.address());
            link.connect().await?;
        }

        if link.characteristics().is_empty() {
            log::debug!("Discovering characteristics for {}", link.address());
            link.discover_services().await?;
        }

        Ok(link)
    }

    async fn read(&self, link: &Peripheral, characteristic: Uuid) -> Result<Vec<u8>, CentralError> {
        let characteristic = find_characteristic(link, characteristic)?;
        Ok(link.read(&characteristic).await?)
    }

    async fn subscribe(
        &self,
        link: &Peripheral,
        characteristic: Uuid,
    ) -> Result<NotificationStream, CentralError> {
        let characteristic = find_characteristic(link, characteristic)?;
        let uuid = characteristic.uuid;

        // Subscribe to adapter events first so a disconnect during
        // registration is not missed.
        let events = self.adapter.events().await?;

        link.subscribe(&characteristic).await?;
        let notifications = link.notifications().await?;

        let values = notifications.filter_map(move |n| async move {
            if n.uuid == uuid {
                Some(Some(n.value))
            } else {
                None
            }
        });

        let id = link.id();
        let disconnects = events.filter_map(move |event| {
            let lost = matches!(&event, CentralEvent::DeviceDisconnected(lost) if *lost == id);
            future::ready(if lost { Some(None) } else { None })
        });

        // `None` marks link loss and ends the stream.
        let stream = stream::select(values, disconnects)
            .take_while(|value| future::ready(value.is_some()))
            .filter_map(future::ready);

        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, link: &Peripheral, characteristic: Uuid) -> Result<(), CentralError> {
        let characteristic = find_characteristic(link, characteristic)?;
        Ok(link.unsubscribe(&characteristic).await?)
    }

    async fn disconnect(&self, link: &Peripheral) -> Result<(), CentralError> {
        Ok(link.disconnect().await?)
    }
}
