//! Instrumented in-memory central used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use btleplug::api::BDAddr;
use futures::{future, stream, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::central::{Advertisement, AdvertisementStream, BleCentral, NotificationStream};
use crate::{CentralError, PeripheralRef};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Scan(Option<Uuid>),
    StopScan,
    Connect(BDAddr),
    Read(BDAddr, Uuid),
    Subscribe(BDAddr, Uuid),
    Unsubscribe(BDAddr, Uuid),
    Disconnect(BDAddr),
}

#[derive(Default)]
pub(crate) struct FakeCentral {
    advertisements: Mutex<Vec<Advertisement>>,
    ops: Mutex<Vec<Op>>,
    links: Mutex<HashMap<BDAddr, mpsc::UnboundedSender<Vec<u8>>>>,
    values: Mutex<HashMap<(BDAddr, Uuid), Vec<u8>>>,
    failing_connect: Mutex<HashSet<BDAddr>>,
    failing_subscribe: Mutex<HashSet<BDAddr>>,
    failing_scan: Mutex<bool>,
    failing_stop_scan: Mutex<bool>,
    stalled_connect: Mutex<HashSet<BDAddr>>,
    stalled_subscribe: Mutex<HashSet<BDAddr>>,
    stalled_disconnect: Mutex<HashSet<BDAddr>>,
    released: Notify,
}

pub(crate) fn addr(last: u8) -> BDAddr {
    BDAddr::from([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
}

pub(crate) fn advertisement(address: BDAddr, name: &str, services: &[Uuid]) -> Advertisement {
    Advertisement {
        address,
        local_name: Some(name.to_string()),
        rssi: Some(-60),
        services: services.to_vec(),
    }
}

impl FakeCentral {
    pub(crate) fn with_advertisements(advertisements: Vec<Advertisement>) -> Self {
        let central = FakeCentral::default();
        *central.advertisements.lock().unwrap() = advertisements;
        central
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn set_value(&self, address: BDAddr, characteristic: Uuid, value: &[u8]) {
        self.values
            .lock()
            .unwrap()
            .insert((address, characteristic), value.to_vec());
    }

    pub(crate) fn fail_connect(&self, address: BDAddr) {
        self.failing_connect.lock().unwrap().insert(address);
    }

    pub(crate) fn fail_subscribe(&self, address: BDAddr) {
        self.failing_subscribe.lock().unwrap().insert(address);
    }

    pub(crate) fn fail_scan(&self) {
        *self.failing_scan.lock().unwrap() = true;
    }

    pub(crate) fn fail_stop_scan(&self) {
        *self.failing_stop_scan.lock().unwrap() = true;
    }

    pub(crate) fn stall_connect(&self, address: BDAddr) {
        self.stalled_connect.lock().unwrap().insert(address);
    }

    pub(crate) fn stall_subscribe(&self, address: BDAddr) {
        self.stalled_subscribe.lock().unwrap().insert(address);
    }

    pub(crate) fn stall_disconnect(&self, address: BDAddr) {
        self.stalled_disconnect.lock().unwrap().insert(address);
    }

    /// Lets stalled disconnects from `address` complete.
    pub(crate) fn release_disconnect(&self, address: BDAddr) {
        self.stalled_disconnect.lock().unwrap().remove(&address);
        self.released.notify_waiters();
    }

    /// Delivers a notification. Returns false if nothing is subscribed.
    pub(crate) fn notify(&self, address: BDAddr, value: &[u8]) -> bool {
        match self.links.lock().unwrap().get(&address) {
            Some(tx) => tx.send(value.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Simulates the peripheral going out of range.
    pub(crate) fn drop_link(&self, address: BDAddr) {
        self.links.lock().unwrap().remove(&address);
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl BleCentral for FakeCentral {
    type Link = BDAddr;

    async fn scan(&self, service: Option<Uuid>) -> Result<AdvertisementStream, CentralError> {
        self.record(Op::Scan(service));
        if *self.failing_scan.lock().unwrap() {
            return Err(CentralError::new("adapter is powered off"));
        }

        let advertisements: Vec<Advertisement> = self
            .advertisements
            .lock()
            .unwrap()
            .iter()
            .filter(|a| service.map_or(true, |s| a.services.contains(&s)))
            .cloned()
            .collect();

        Ok(Box::pin(stream::iter(advertisements).chain(stream::pending())))
    }

    async fn stop_scan(&self) -> Result<(), CentralError> {
        self.record(Op::StopScan);
        if *self.failing_stop_scan.lock().unwrap() {
            return Err(CentralError::new("adapter went away"));
        }
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralRef) -> Result<BDAddr, CentralError> {
        let address = peripheral.address();
        self.record(Op::Connect(address));

        let stalled = self.stalled_connect.lock().unwrap().contains(&address);
        if stalled {
            future::pending::<()>().await;
        }
        if self.failing_connect.lock().unwrap().contains(&address) {
            return Err(CentralError::new("link establishment failed"));
        }
        Ok(address)
    }

    async fn read(&self, link: &BDAddr, characteristic: Uuid) -> Result<Vec<u8>, CentralError> {
        self.record(Op::Read(*link, characteristic));
        self.values
            .lock()
            .unwrap()
            .get(&(*link, characteristic))
            .cloned()
            .ok_or_else(|| CentralError::new("characteristic not found"))
    }

    async fn subscribe(
        &self,
        link: &BDAddr,
        characteristic: Uuid,
    ) -> Result<NotificationStream, CentralError> {
        self.record(Op::Subscribe(*link, characteristic));

        let stalled = self.stalled_subscribe.lock().unwrap().contains(link);
        if stalled {
            future::pending::<()>().await;
        }
        if self.failing_subscribe.lock().unwrap().contains(link) {
            return Err(CentralError::new("notify not permitted"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().unwrap().insert(*link, tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn unsubscribe(&self, link: &BDAddr, characteristic: Uuid) -> Result<(), CentralError> {
        self.record(Op::Unsubscribe(*link, characteristic));
        self.links.lock().unwrap().remove(link);
        Ok(())
    }

    async fn disconnect(&self, link: &BDAddr) -> Result<(), CentralError> {
        self.record(Op::Disconnect(*link));
        loop {
            let released = self.released.notified();
            let stalled = self.stalled_disconnect.lock().unwrap().contains(link);
            if !stalled {
                return Ok(());
            }
            released.await;
        }
    }
}
