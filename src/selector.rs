//! Picking one peripheral out of the devices found by a scan.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::{Error, PeripheralRef, Result};

pub type CandidateStream = Pin<Box<dyn Stream<Item = PeripheralRef> + Send>>;

/// Decides which discovered device to use.
///
/// `Ok(None)` means the choice was explicitly abandoned.
#[async_trait]
pub trait Chooser: Send {
    async fn choose(&mut self, candidates: CandidateStream) -> Result<Option<PeripheralRef>>;
}

/// Candidates known so far and the one currently highlighted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateList {
    pub devices: Vec<PeripheralRef>,
    pub active: Option<usize>,
}

impl CandidateList {
    fn push(&mut self, device: PeripheralRef) {
        self.devices.push(device);
        if self.active.is_none() {
            self.active = Some(0);
        }
    }

    fn take(&self, index: usize) -> Result<PeripheralRef> {
        self.devices
            .get(index)
            .cloned()
            .ok_or(Error::SelectionOutOfRange {
                index,
                available: self.devices.len(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorInput {
    /// Move the highlight. Not validated until commit.
    Highlight(usize),
    /// Commit the highlighted candidate.
    Commit,
    CommitIndex(usize),
    Cancel,
}

/// A chooser driven by a presentation layer through a [`SelectorControl`].
pub struct InteractiveSelector {
    inputs: mpsc::Receiver<SelectorInput>,
    candidates: watch::Sender<CandidateList>,
}

/// The presentation side of an [`InteractiveSelector`].
#[derive(Clone)]
pub struct SelectorControl {
    inputs: mpsc::Sender<SelectorInput>,
    candidates: watch::Receiver<CandidateList>,
}

impl InteractiveSelector {
    pub fn new() -> (InteractiveSelector, SelectorControl) {
        let (input_tx, input_rx) = mpsc::channel(8);
        let (list_tx, list_rx) = watch::channel(CandidateList::default());

        (
            InteractiveSelector {
                inputs: input_rx,
                candidates: list_tx,
            },
            SelectorControl {
                inputs: input_tx,
                candidates: list_rx,
            },
        )
    }
}

#[async_trait]
impl Chooser for InteractiveSelector {
    async fn choose(&mut self, mut candidates: CandidateStream) -> Result<Option<PeripheralRef>> {
        self.candidates.send_replace(CandidateList::default());
        let mut scan_running = true;

        loop {
            tokio::select! {
                device = candidates.next(), if scan_running => match device {
                    Some(device) => {
                        log::debug!("Candidate: {:?}", device);
                        self.candidates.send_modify(|list| list.push(device));
                    }
                    None => scan_running = false,
                },
                input = self.inputs.recv() => {
                    let list = self.candidates.borrow().clone();
                    match input {
                        Some(SelectorInput::Highlight(index)) => {
                            self.candidates.send_modify(|list| list.active = Some(index));
                        }
                        Some(SelectorInput::Commit) => {
                            let Some(index) = list.active else {
                                return Err(Error::SelectionOutOfRange { index: 0, available: 0 });
                            };
                            return list.take(index).map(Some);
                        }
                        Some(SelectorInput::CommitIndex(index)) => {
                            return list.take(index).map(Some);
                        }
                        Some(SelectorInput::Cancel) | None => {
                            log::info!("Device selection cancelled");
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}

impl SelectorControl {
    /// Live view of the candidates.
    pub fn candidates(&self) -> watch::Receiver<CandidateList> {
        self.candidates.clone()
    }

    /// Waits until at least `count` candidates are known.
    pub async fn wait_for_candidates(&mut self, count: usize) -> CandidateList {
        loop {
            {
                let list = self.candidates.borrow_and_update();
                if list.devices.len() >= count {
                    return list.clone();
                }
            }
            if self.candidates.changed().await.is_err() {
                return self.candidates.borrow().clone();
            }
        }
    }

    pub async fn highlight(&self, index: usize) {
        self.send(SelectorInput::Highlight(index)).await;
    }

    pub async fn commit(&self) {
        self.send(SelectorInput::Commit).await;
    }

    pub async fn commit_index(&self, index: usize) {
        self.send(SelectorInput::CommitIndex(index)).await;
    }

    pub async fn cancel(&self) {
        self.send(SelectorInput::Cancel).await;
    }

    async fn send(&self, input: SelectorInput) {
        if self.inputs.send(input).await.is_err() {
            log::debug!("Selector is gone, dropping {:?}", input);
        }
    }
}

/// Automated chooser that commits the first candidate matching a predicate.
pub struct FirstMatch {
    predicate: Box<dyn Fn(&PeripheralRef) -> bool + Send + Sync>,
}

impl FirstMatch {
    pub fn new(predicate: impl Fn(&PeripheralRef) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    pub fn any() -> Self {
        Self::new(|_| true)
    }

    /// Match on the start of the local name, e.g. `"Polar H10"`.
    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |device| {
            device
                .name()
                .map_or(false, |name| name.starts_with(prefix.as_str()))
        })
    }
}

#[async_trait]
impl Chooser for FirstMatch {
    async fn choose(&mut self, mut candidates: CandidateStream) -> Result<Option<PeripheralRef>> {
        while let Some(device) = candidates.next().await {
            if (self.predicate)(&device) {
                log::info!("Selected {:?}", device);
                return Ok(Some(device));
            }
        }

        Ok(None)
    }
}
