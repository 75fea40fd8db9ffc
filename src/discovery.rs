use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use btleplug::api::BDAddr;
use futures::{Stream, StreamExt};
use stream_cancel::{Trigger, Valved};
use tokio::sync::broadcast;
use tokio::sync::broadcast::Sender;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::central::{AdvertisementStream, BleCentral};
use crate::{Error, PeripheralRef, Result};

pub type DeviceStream = Valved<Pin<Box<dyn Stream<Item = PeripheralRef> + Send>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// First sighting of an address during this scan.
    Discovered(PeripheralRef),
    /// A known address was seen again with a new name or signal strength.
    Updated(PeripheralRef),
}

/// Scans for peripherals through a [`BleCentral`], one device per address.
pub struct Scanner<C: BleCentral> {
    central: Arc<C>,
    scanning: bool,
    event_sender: Sender<DiscoveryEvent>,
    scan_stopper: Option<Trigger>,
    device_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
}

impl<C: BleCentral> Scanner<C> {
    pub fn new(central: Arc<C>) -> Self {
        let (event_sender, _) = broadcast::channel(16);

        Self {
            central,
            scanning: false,
            event_sender,
            scan_stopper: None,
            device_stream_stoppers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Start scanning and return a stream of newly discovered devices.
    ///
    /// `service` is handed to the central as is. The stream ends when the
    /// scan is stopped.
    pub async fn start_scan(&mut self, service: Option<Uuid>) -> Result<DeviceStream> {
        let stream = self.device_stream();
        self.start(service).await?;
        Ok(stream)
    }

    /// Start scanning for ble devices.
    pub async fn start(&mut self, service: Option<Uuid>) -> Result<()> {
        if self.scanning {
            log::info!("Scanner is already started.");
            return Ok(());
        }

        log::info!("Starting the scan, service filter: {:?}", service);

        let advertisements = self.central.scan(service).await.map_err(Error::Discovery)?;
        let (stopper, advertisements) = Valved::new(advertisements);

        let ctx = ScanContext {
            known: HashMap::new(),
            event_sender: self.event_sender.clone(),
        };
        let device_stream_stoppers = self.device_stream_stoppers.clone();

        tokio::spawn(async move {
            ctx.listen(advertisements, device_stream_stoppers).await;
        });

        self.scan_stopper = Some(stopper);
        self.scanning = true;

        Ok(())
    }

    /// Stop scanning for ble devices. Stopping a stopped scanner is a no-op.
    pub async fn stop_scan(&mut self) -> Result<()> {
        if !self.scanning {
            log::info!("Scanner is already stopped");
            return Ok(());
        }

        self.scanning = false;
        self.scan_stopper.take();

        // A listener that exits late clears the set it was started with.
        let stoppers = std::mem::take(&mut self.device_stream_stoppers);
        stoppers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.central.stop_scan().await.map_err(Error::Discovery)
    }

    /// Create a new stream that receives discovery events.
    pub fn device_event_stream(
        &mut self,
    ) -> Valved<Pin<Box<dyn Stream<Item = DiscoveryEvent> + Send>>> {
        let receiver = self.event_sender.subscribe();

        let stream: Pin<Box<dyn Stream<Item = DiscoveryEvent> + Send>> =
            Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move {
                match x {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        log::warn!("Discovery event stream lagged, {} events dropped", skipped);
                        None
                    }
                }
            }));

        self.valved(stream)
    }

    /// Create a new stream that receives discovered devices.
    pub fn device_stream(&mut self) -> DeviceStream {
        let receiver = self.event_sender.subscribe();

        let stream: Pin<Box<dyn Stream<Item = PeripheralRef> + Send>> =
            Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move {
                match x {
                    Ok(DiscoveryEvent::Discovered(device)) => Some(device),
                    Ok(DiscoveryEvent::Updated(_)) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        log::warn!("Device stream lagged, {} discovery events dropped", skipped);
                        None
                    }
                }
            }));

        self.valved(stream)
    }

    fn valved<S: Stream + Unpin>(&mut self, stream: S) -> Valved<S> {
        let (trigger, stream) = Valved::new(stream);
        self.device_stream_stoppers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trigger);

        stream
    }
}

struct ScanContext {
    /// Devices seen during this scan, keyed by address
    known: HashMap<BDAddr, PeripheralRef>,
    /// Channel for sending events to the client
    event_sender: Sender<DiscoveryEvent>,
}

impl ScanContext {
    async fn listen(
        mut self,
        mut advertisements: Valved<AdvertisementStream>,
        device_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
    ) {
        while let Some(advertisement) = advertisements.next().await {
            log::trace!("Advertisement: {:?}", advertisement);

            let event = match self.known.get_mut(&advertisement.address) {
                Some(known) => {
                    if !known.update(&advertisement) {
                        continue;
                    }
                    DiscoveryEvent::Updated(known.clone())
                }
                None => {
                    let device = PeripheralRef::from(&advertisement);
                    log::info!("Found device: {:?}", device);
                    self.known.insert(device.address(), device.clone());
                    DiscoveryEvent::Discovered(device)
                }
            };

            if self.event_sender.send(event).is_err() {
                log::trace!("No discovery listeners");
            }
        }

        device_stream_stoppers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        log::info!("Scanner was stopped.");
    }
}
