use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::{DecodeError, Error, Measurement};

/// Session lifecycle milestones published to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    Connecting,
    Streaming,
    Disconnected,
    Cancelled,
    Failed(Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Measurement(Measurement),
    DecodeError(DecodeError),
    Lifecycle(Lifecycle),
    /// The consumer fell behind and this many events were skipped.
    Dropped(u64),
}

/// The latest decoded value. `None` means no device is streaming, which is
/// distinct from a measurement of zero.
pub type Reading = Option<Measurement>;

pub type TelemetryStream = Pin<Box<dyn Stream<Item = TelemetryEvent> + Send>>;

/// Fan-out point between telemetry sessions and their consumers.
///
/// Publishing never waits on a consumer: the event channel is bounded and
/// lagging receivers observe [`TelemetryEvent::Dropped`], while [`reading`]
/// always holds the most recent measurement.
///
/// [`reading`]: EventSink::reading
#[derive(Clone)]
pub struct EventSink {
    events: broadcast::Sender<TelemetryEvent>,
    reading: Arc<watch::Sender<Reading>>,
    /// Id of the session allowed to publish through a [`Publisher`].
    owner: Arc<Mutex<u64>>,
}

impl EventSink {
    /// `capacity` is the number of events a consumer may fall behind by. It
    /// is at least one.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (reading, _) = watch::channel(None);

        Self {
            events,
            reading: Arc::new(reading),
            owner: Arc::new(Mutex::new(0)),
        }
    }

    /// Create a new stream that receives telemetry events.
    pub fn event_stream(&self) -> TelemetryStream {
        let receiver = self.events.subscribe();

        Box::pin(BroadcastStream::new(receiver).map(|x| match x {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                log::debug!("Telemetry consumer lagged, {} events dropped", skipped);
                TelemetryEvent::Dropped(skipped)
            }
        }))
    }

    pub fn reading(&self) -> watch::Receiver<Reading> {
        self.reading.subscribe()
    }

    pub(crate) fn measurement(&self, measurement: Measurement) {
        self.reading.send_replace(Some(measurement.clone()));
        self.publish(TelemetryEvent::Measurement(measurement));
    }

    pub(crate) fn decode_error(&self, error: DecodeError) {
        self.publish(TelemetryEvent::DecodeError(error));
    }

    pub(crate) fn lifecycle(&self, lifecycle: Lifecycle) {
        self.publish(TelemetryEvent::Lifecycle(lifecycle));
    }

    pub(crate) fn clear_reading(&self) {
        self.reading.send_replace(None);
    }

    /// Hands publishing over to a new session. Publishers claimed earlier
    /// stop having any effect.
    pub(crate) fn claim(&self) -> Publisher {
        let session = self.revoke();
        Publisher {
            sink: self.clone(),
            session,
        }
    }

    /// Silences every outstanding publisher.
    pub(crate) fn revoke(&self) -> u64 {
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        *owner += 1;
        *owner
    }

    fn publish(&self, event: TelemetryEvent) {
        if self.events.send(event).is_err() {
            log::trace!("No telemetry consumers");
        }
    }
}

/// Session-scoped write access to an [`EventSink`].
pub(crate) struct Publisher {
    sink: EventSink,
    session: u64,
}

impl Publisher {
    pub(crate) fn measurement(&self, measurement: Measurement) {
        self.if_current(|sink| sink.measurement(measurement));
    }

    pub(crate) fn decode_error(&self, error: DecodeError) {
        self.if_current(|sink| sink.decode_error(error));
    }

    pub(crate) fn lifecycle(&self, lifecycle: Lifecycle) {
        self.if_current(|sink| sink.lifecycle(lifecycle));
    }

    pub(crate) fn clear_reading(&self) {
        self.if_current(EventSink::clear_reading);
    }

    fn if_current(&self, f: impl FnOnce(&EventSink)) {
        // Held while publishing so a newer session cannot claim the sink
        // halfway through.
        let owner = self.sink.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if *owner == self.session {
            f(&self.sink);
        } else {
            log::trace!("Discarding output of superseded session {}", self.session);
        }
    }
}
