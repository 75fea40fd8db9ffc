use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::central::BleCentral;
use crate::discovery::Scanner;
use crate::inspect::{read_characteristics, CharacteristicReading};
use crate::selector::Chooser;
use crate::session::{SessionConfig, SessionHandle, TelemetrySession};
use crate::sink::{EventSink, Reading, TelemetryStream};
use crate::{Error, PeripheralRef, Result, ServiceProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    session: SessionConfig,
    /// Telemetry events buffered per consumer before it starts dropping.
    event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            event_capacity: 64,
        }
    }
}

impl SupervisorConfig {
    /// Timeouts applied to every session
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Number of events a slow consumer may fall behind by, at least one
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

struct Selection<C: BleCentral, S: Chooser> {
    scanner: Scanner<C>,
    chooser: S,
}

impl<C: BleCentral, S: Chooser> Selection<C, S> {
    /// Scans for `profile` until the chooser settles, then stops the scan.
    async fn pick(&mut self, profile: ServiceProfile) -> Result<Option<PeripheralRef>> {
        let candidates = self.scanner.start_scan(Some(profile.service_uuid())).await?;

        let choice = self.chooser.choose(Box::pin(candidates)).await;
        let stopped = self.scanner.stop_scan().await;

        let choice = choice?;
        stopped?;
        Ok(choice)
    }
}

/// Runs discovery, selection and a single telemetry session per request.
///
/// At most one session is current. Replacing it cancels the old one and
/// waits for its teardown before the new one is created.
pub struct Supervisor<C: BleCentral, S: Chooser> {
    central: Arc<C>,
    config: SupervisorConfig,
    sink: EventSink,
    selection: Mutex<Selection<C, S>>,
    current: Mutex<Option<SessionHandle>>,
}

impl<C: BleCentral, S: Chooser> Supervisor<C, S> {
    pub fn new(central: Arc<C>, chooser: S, config: SupervisorConfig) -> Self {
        Self {
            sink: EventSink::new(config.event_capacity),
            selection: Mutex::new(Selection {
                scanner: Scanner::new(central.clone()),
                chooser,
            }),
            current: Mutex::new(None),
            central,
            config,
        }
    }

    /// Create a new stream that receives telemetry events.
    pub fn events(&self) -> TelemetryStream {
        self.sink.event_stream()
    }

    /// The latest measurement, `None` when nothing is streaming.
    pub fn reading(&self) -> watch::Receiver<Reading> {
        self.sink.reading()
    }

    /// The session currently considered live, if any.
    pub async fn current(&self) -> Option<SessionHandle> {
        self.current.lock().await.clone()
    }

    /// Scans for devices exposing `profile`, lets the chooser pick one and
    /// starts streaming its measurement characteristic.
    ///
    /// Returns `Ok(None)` if the choice was cancelled, in which case any
    /// running session is left untouched.
    pub async fn connect(&self, profile: ServiceProfile) -> Result<Option<SessionHandle>> {
        let characteristic = profile
            .default_measurement()
            .ok_or(Error::NoMeasurementCharacteristic(profile))?;

        let chosen = self.selection.lock().await.pick(profile).await?;
        let Some(peripheral) = chosen else {
            log::info!("No device chosen for {}", profile);
            return Ok(None);
        };

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            log::info!("Replacing session with {}", previous.peripheral().address());
            let cancelled = previous.cancel().await;
            self.sink.revoke();
            cancelled?;
        }

        let handle = TelemetrySession::start(
            self.central.clone(),
            peripheral,
            profile,
            characteristic,
            self.sink.clone(),
            self.config.session,
        );
        *current = Some(handle.clone());

        Ok(Some(handle))
    }

    /// Cancels the current session, if any, and resets the reading.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = self.current.lock().await.take();
        let result = match previous {
            Some(previous) => previous.cancel().await,
            None => Ok(()),
        };

        self.sink.revoke();
        self.sink.clear_reading();
        result
    }

    /// Scans for devices advertising `advertised`, lets the chooser pick one
    /// and reads the readable characteristics of `profile` once.
    ///
    /// Device Information is rarely advertised, so it is usually read from a
    /// device found through the profile it does advertise.
    pub async fn inspect(
        &self,
        advertised: ServiceProfile,
        profile: ServiceProfile,
    ) -> Result<Option<(PeripheralRef, Vec<CharacteristicReading>)>> {
        let chosen = self.selection.lock().await.pick(advertised).await?;
        let Some(peripheral) = chosen else {
            return Ok(None);
        };

        let readings =
            read_characteristics(self.central.as_ref(), &peripheral, profile, profile.readable())
                .await?;

        Ok(Some((peripheral, readings)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::common::{characteristics as chars, services};
    use crate::selector::{FirstMatch, InteractiveSelector};
    use crate::session::SessionState;
    use crate::sink::{Lifecycle, TelemetryEvent};
    use crate::testing::{addr, advertisement, FakeCentral, Op};
    use crate::{DeviceInfoField, Measurement};

    const WAIT: Duration = Duration::from_secs(2);

    async fn next_event(events: &mut TelemetryStream) -> TelemetryEvent {
        timeout(WAIT, events.next()).await.unwrap().unwrap()
    }

    async fn skip_to(events: &mut TelemetryStream, wanted: TelemetryEvent) {
        while next_event(events).await != wanted {}
    }

    fn heart_rate_central() -> Arc<FakeCentral> {
        Arc::new(FakeCentral::with_advertisements(vec![
            advertisement(addr(0xA), "Phone", &[]),
            advertisement(addr(0xB), "Polar H10", &[services::HEART_RATE]),
        ]))
    }

    #[tokio::test]
    async fn end_to_end_heart_rate() {
        let central = heart_rate_central();
        let (selector, mut control) = InteractiveSelector::new();
        let supervisor = Supervisor::new(central.clone(), selector, SupervisorConfig::default());
        let mut events = supervisor.events();
        let reading = supervisor.reading();

        let (handle, list) = tokio::join!(supervisor.connect(ServiceProfile::HeartRate), async {
            let list = control.wait_for_candidates(1).await;
            control.commit().await;
            list
        });
        let handle = handle.unwrap().unwrap();

        assert_eq!(list.devices.len(), 1);
        assert_eq!(handle.peripheral().address(), addr(0xB));
        assert_eq!(&central.ops()[..2], &[Op::Scan(Some(services::HEART_RATE)), Op::StopScan]);

        assert_eq!(handle.wait_for(|s| *s == SessionState::Streaming).await, SessionState::Streaming);
        assert!(central.notify(addr(0xB), &[0x00, 0x3C]));

        skip_to(&mut events, TelemetryEvent::Lifecycle(Lifecycle::Streaming)).await;
        assert_eq!(
            next_event(&mut events).await,
            TelemetryEvent::Measurement(Measurement::HeartRate { bpm: 60 })
        );
        assert_eq!(*reading.borrow(), Some(Measurement::HeartRate { bpm: 60 }));

        central.drop_link(addr(0xB));
        assert_eq!(
            next_event(&mut events).await,
            TelemetryEvent::Lifecycle(Lifecycle::Disconnected)
        );
        assert!(!central.notify(addr(0xB), &[0x00, 0x3D]));
        assert!(timeout(Duration::from_millis(50), events.next()).await.is_err());
        assert_eq!(*reading.borrow(), None);
    }

    #[tokio::test]
    async fn reconnect_cancels_before_creating() {
        let central = heart_rate_central();
        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), SupervisorConfig::default());

        let first = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        first.wait_for(|s| *s == SessionState::Streaming).await;

        let second = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        assert_eq!(first.state(), SessionState::Cancelled);
        second.wait_for(|s| *s == SessionState::Streaming).await;

        let links: Vec<Op> = central
            .ops()
            .into_iter()
            .filter(|op| !matches!(op, Op::Scan(_) | Op::StopScan))
            .collect();
        let b = addr(0xB);
        assert_eq!(
            links,
            vec![
                Op::Connect(b),
                Op::Subscribe(b, chars::HEART_RATE_MEASUREMENT),
                Op::Unsubscribe(b, chars::HEART_RATE_MEASUREMENT),
                Op::Disconnect(b),
                Op::Connect(b),
                Op::Subscribe(b, chars::HEART_RATE_MEASUREMENT),
            ]
        );

        let mut open = 0;
        for op in &links {
            match op {
                Op::Connect(_) => open += 1,
                Op::Disconnect(_) => open -= 1,
                _ => {}
            }
            assert!(open <= 1, "two links open at once: {:?}", links);
        }

        let current = supervisor.current().await.unwrap();
        assert_eq!(current.state(), SessionState::Streaming);
    }

    #[tokio::test]
    async fn cancelled_choice_keeps_the_running_session() {
        let central = heart_rate_central();
        let (selector, mut control) = InteractiveSelector::new();
        let supervisor = Supervisor::new(central.clone(), selector, SupervisorConfig::default());

        let (first, _) = tokio::join!(supervisor.connect(ServiceProfile::HeartRate), async {
            control.wait_for_candidates(1).await;
            control.commit().await;
        });
        let first = first.unwrap().unwrap();
        first.wait_for(|s| *s == SessionState::Streaming).await;

        control.cancel().await;
        assert!(matches!(supervisor.connect(ServiceProfile::HeartRate).await, Ok(None)));
        assert_eq!(first.state(), SessionState::Streaming);
    }

    #[tokio::test]
    async fn disconnect_resets_reading_to_none() {
        let central = heart_rate_central();
        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), SupervisorConfig::default());
        let reading = supervisor.reading();

        supervisor.disconnect().await.unwrap();

        let handle = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        handle.wait_for(|s| *s == SessionState::Streaming).await;

        let mut changes = supervisor.reading();
        central.notify(addr(0xB), &[0x00, 0x00]);
        timeout(WAIT, changes.changed()).await.unwrap().unwrap();
        assert_eq!(*reading.borrow(), Some(Measurement::HeartRate { bpm: 0 }));

        supervisor.disconnect().await.unwrap();

        assert_eq!(*reading.borrow(), None);
        assert_eq!(handle.state(), SessionState::Cancelled);
        assert!(supervisor.current().await.is_none());
    }

    #[tokio::test]
    async fn connect_after_inspect_finds_the_device_again() {
        let central = heart_rate_central();
        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), SupervisorConfig::default());

        let (device, readings) = supervisor
            .inspect(ServiceProfile::HeartRate, ServiceProfile::HeartRate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.address(), addr(0xB));
        assert!(readings.is_empty());

        let handle = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        assert_eq!(handle.peripheral().address(), addr(0xB));
        assert_eq!(
            handle.wait_for(|s| *s == SessionState::Streaming).await,
            SessionState::Streaming
        );
    }

    #[tokio::test]
    async fn abandoned_session_does_not_disturb_its_successor() {
        let central = heart_rate_central();
        central.stall_disconnect(addr(0xB));
        let config = SupervisorConfig::default()
            .session(SessionConfig::default().teardown_timeout(Duration::from_millis(50)));
        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), config);
        let mut events = supervisor.events();
        let reading = supervisor.reading();

        let stuck = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        stuck.wait_for(|s| *s == SessionState::Streaming).await;

        assert!(matches!(
            supervisor.connect(ServiceProfile::HeartRate).await,
            Err(Error::TeardownTimeout(_))
        ));
        assert!(supervisor.current().await.is_none());

        let next = supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();
        next.wait_for(|s| *s == SessionState::Streaming).await;
        assert!(central.notify(addr(0xB), &[0x00, 0x46]));
        skip_to(
            &mut events,
            TelemetryEvent::Measurement(Measurement::HeartRate { bpm: 70 }),
        )
        .await;

        central.release_disconnect(addr(0xB));
        assert_eq!(stuck.wait_for(|_| false).await, SessionState::Cancelled);

        assert_eq!(*reading.borrow(), Some(Measurement::HeartRate { bpm: 70 }));
        assert!(timeout(Duration::from_millis(50), events.next()).await.is_err());
        assert_eq!(next.state(), SessionState::Streaming);
    }

    #[tokio::test]
    async fn zero_event_capacity_is_usable() {
        let central = heart_rate_central();
        let config = SupervisorConfig::default().event_capacity(0);
        let supervisor = Supervisor::new(central, FirstMatch::any(), config);
        let mut events = supervisor.events();

        supervisor.connect(ServiceProfile::HeartRate).await.unwrap().unwrap();

        skip_to(&mut events, TelemetryEvent::Lifecycle(Lifecycle::Streaming)).await;
    }

    #[tokio::test]
    async fn profiles_without_measurement_cannot_stream() {
        let central = heart_rate_central();
        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), SupervisorConfig::default());

        assert!(matches!(
            supervisor.connect(ServiceProfile::UserData).await,
            Err(Error::NoMeasurementCharacteristic(ServiceProfile::UserData))
        ));
        assert!(central.ops().is_empty());
    }

    #[tokio::test]
    async fn inspect_reads_device_information() {
        let central = Arc::new(FakeCentral::with_advertisements(vec![advertisement(
            addr(3),
            "Polar H10",
            &[services::HEART_RATE],
        )]));
        for characteristic in ServiceProfile::DeviceInformation.readable() {
            central.set_value(addr(3), *characteristic, b"x");
        }
        central.set_value(addr(3), chars::SYSTEM_ID, &[0xDE, 0xAD]);

        let supervisor = Supervisor::new(central.clone(), FirstMatch::any(), SupervisorConfig::default());
        let (device, readings) = supervisor
            .inspect(ServiceProfile::HeartRate, ServiceProfile::DeviceInformation)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(device.address(), addr(3));
        assert_eq!(readings.len(), 7);
        assert!(readings.iter().any(|r| r.value
            == Ok(Measurement::DeviceInfo {
                field: DeviceInfoField::SystemId,
                value: "de-ad".to_string(),
            })));
    }
}
