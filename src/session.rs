//! One device, one characteristic: connect, subscribe, decode, publish,
//! tear down.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use stream_cancel::{Trigger, Tripwire};
use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

use crate::central::{BleCentral, NotificationStream};
use crate::sink::{EventSink, Lifecycle, Publisher};
use crate::{decode, CentralError, Error, PeripheralRef, Result, ServiceProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on link establishment.
    connect_timeout: Duration,
    /// Upper bound on `cancel()` waiting for unsubscribe and disconnect.
    teardown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            teardown_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Fail the session if the link is not up within `timeout`
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Give up waiting for teardown after `timeout`
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribing,
    Streaming,
    Cancelled,
    Disconnected,
    Failed(Error),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Disconnected | SessionState::Failed(_)
        )
    }
}

/// Caller-side token for a running [`TelemetrySession`].
///
/// Clones refer to the same session. Dropping the last clone cancels it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    peripheral: PeripheralRef,
    characteristic: Uuid,
    trigger: Mutex<Option<Trigger>>,
    state: watch::Receiver<SessionState>,
    teardown_timeout: Duration,
}

impl SessionHandle {
    pub fn peripheral(&self) -> &PeripheralRef {
        &self.inner.peripheral
    }

    pub fn characteristic(&self) -> Uuid {
        self.inner.characteristic
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// False once the session reached a terminal state.
    pub fn is_active(&self) -> bool {
        !self.inner.state.borrow().is_terminal()
    }

    /// Waits until the session state satisfies `predicate` or becomes
    /// terminal, and returns that state.
    pub async fn wait_for(&self, predicate: impl Fn(&SessionState) -> bool) -> SessionState {
        let mut state = self.inner.state.clone();
        loop {
            {
                let current = state.borrow_and_update();
                if predicate(&current) || current.is_terminal() {
                    return current.clone();
                }
            }
            if state.changed().await.is_err() {
                return state.borrow().clone();
            }
        }
    }

    /// Cancels the session and waits until the notification handler and the
    /// link are released.
    pub async fn cancel(&self) -> Result<()> {
        let trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(trigger) = trigger {
            log::debug!("Cancelling session with {}", self.inner.peripheral.address());
            trigger.cancel();
        }

        let teardown_timeout = self.inner.teardown_timeout;
        match timeout(teardown_timeout, self.wait_for(SessionState::is_terminal)).await {
            Ok(_) => Ok(()),
            Err(_) => {
                log::error!(
                    "Teardown of session with {} did not complete within {:?}, link may be leaked",
                    self.inner.peripheral.address(),
                    teardown_timeout
                );
                Err(Error::TeardownTimeout(teardown_timeout))
            }
        }
    }
}

/// Streams decoded measurements from one characteristic of one peripheral.
pub struct TelemetrySession<C: BleCentral> {
    central: Arc<C>,
    peripheral: PeripheralRef,
    profile: ServiceProfile,
    characteristic: Uuid,
    publisher: Publisher,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
}

impl<C: BleCentral> TelemetrySession<C> {
    /// Spawns the session task and returns its handle. Must be called from
    /// within a tokio runtime.
    ///
    /// The session takes over `sink`: output of sessions started on it
    /// earlier is discarded from now on.
    pub fn start(
        central: Arc<C>,
        peripheral: PeripheralRef,
        profile: ServiceProfile,
        characteristic: Uuid,
        sink: EventSink,
        config: SessionConfig,
    ) -> SessionHandle {
        let (trigger, tripwire) = Tripwire::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let handle = SessionHandle {
            inner: Arc::new(HandleInner {
                peripheral: peripheral.clone(),
                characteristic,
                trigger: Mutex::new(Some(trigger)),
                state: state_rx,
                teardown_timeout: config.teardown_timeout,
            }),
        };

        let session = TelemetrySession {
            central,
            peripheral,
            profile,
            characteristic,
            publisher: sink.claim(),
            config,
            state: state_tx,
        };

        tokio::spawn(session.run(tripwire));

        handle
    }

    async fn run(self, tripwire: Tripwire) {
        let outcome = self.drive(tripwire).await;

        match &outcome {
            SessionState::Failed(e) => log::warn!("Session with {} failed: {}", self.address(), e),
            other => log::info!("Session with {} ended: {:?}", self.address(), other),
        }

        self.publisher.clear_reading();
        self.transition(outcome);
    }

    async fn drive(&self, tripwire: Tripwire) -> SessionState {
        tokio::pin!(tripwire);

        self.transition(SessionState::Connecting);

        let connect = timeout(self.config.connect_timeout, self.central.connect(&self.peripheral));
        let link = tokio::select! {
            biased;
            _ = &mut tripwire => {
                log::debug!("Abandoning connection attempt to {}", self.address());
                return SessionState::Cancelled;
            }
            res = connect => match res {
                Ok(Ok(link)) => link,
                Ok(Err(source)) => return self.connect_failed(source),
                Err(_) => return self.connect_failed(CentralError::new("connection timed out")),
            },
        };

        self.transition(SessionState::Subscribing);

        let subscribe = self.central.subscribe(&link, self.characteristic);
        let notifications = tokio::select! {
            biased;
            _ = &mut tripwire => {
                self.teardown(&link).await;
                return SessionState::Cancelled;
            }
            res = subscribe => match res {
                Ok(notifications) => notifications,
                Err(source) => {
                    self.disconnect(&link).await;
                    return SessionState::Failed(Error::Subscribe {
                        characteristic: self.characteristic,
                        source,
                    });
                }
            },
        };

        self.transition(SessionState::Streaming);

        self.stream(notifications, tripwire.as_mut(), &link).await
    }

    async fn stream(
        &self,
        mut notifications: NotificationStream,
        mut tripwire: std::pin::Pin<&mut Tripwire>,
        link: &C::Link,
    ) -> SessionState {
        loop {
            tokio::select! {
                biased;
                _ = &mut tripwire => {
                    drop(notifications);
                    self.teardown(link).await;
                    return SessionState::Cancelled;
                }
                payload = notifications.next() => match payload {
                    Some(payload) => {
                        log::trace!("Notification from {}: {:02x?}", self.address(), payload);
                        match decode(self.profile, self.characteristic, &payload) {
                            Ok(measurement) => self.publisher.measurement(measurement),
                            Err(e) => {
                                log::debug!("Dropping malformed payload {:02x?}: {}", payload, e);
                                self.publisher.decode_error(e);
                            }
                        }
                    }
                    None => {
                        log::info!("Link to {} was lost", self.address());
                        return SessionState::Disconnected;
                    }
                },
            }
        }
    }

    fn connect_failed(&self, source: CentralError) -> SessionState {
        SessionState::Failed(Error::Connect {
            address: self.address(),
            source,
        })
    }

    /// Unsubscribe, then disconnect.
    async fn teardown(&self, link: &C::Link) {
        if let Err(e) = self.central.unsubscribe(link, self.characteristic).await {
            log::warn!("Unsubscribing from {} failed: {}", self.characteristic, e);
        }
        self.disconnect(link).await;
    }

    async fn disconnect(&self, link: &C::Link) {
        if let Err(e) = self.central.disconnect(link).await {
            log::warn!("Disconnecting from {} failed: {}", self.address(), e);
        }
    }

    fn transition(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            log::debug!("Session with {}: {:?} -> {:?}", self.address(), state, next);
            *state = next.clone();
            true
        });

        if !changed {
            return;
        }

        let lifecycle = match next {
            SessionState::Connecting => Lifecycle::Connecting,
            SessionState::Streaming => Lifecycle::Streaming,
            SessionState::Disconnected => Lifecycle::Disconnected,
            SessionState::Cancelled => Lifecycle::Cancelled,
            SessionState::Failed(e) => Lifecycle::Failed(e),
            SessionState::Idle | SessionState::Subscribing => return,
        };
        self.publisher.lifecycle(lifecycle);
    }

    fn address(&self) -> btleplug::api::BDAddr {
        self.peripheral.address()
    }
}
