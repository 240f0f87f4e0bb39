use crossbeam::channel::{Receiver, Sender, unbounded};
use stream_io::{LifecycleState, StreamCaps};

/// Message posted on the shared event channel.
#[derive(Clone, Debug)]
pub enum BusEvent {
    EndOfStream,
    Error {
        stage: String,
        detail: String,
    },
    StateChanged {
        stage: String,
        from: LifecycleState,
        to: LifecycleState,
    },
    PadAdded {
        stage: String,
        pad: String,
        caps: StreamCaps,
    },
}

/// The two outcomes that end the controller's blocking wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalOutcome {
    EndOfStream,
    Error { stage: String, detail: String },
}

/// Shared event channel between stage workers and the controller.
///
/// Publishers run on stage worker threads; the single consumer is the
/// controller's waiting thread. Receive blocks, it never spins.
pub struct Bus {
    tx: Sender<BusEvent>,
    rx: Receiver<BusEvent>,
}

impl Bus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> BusSender {
        BusSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<BusEvent> {
        &self.rx
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable publishing handle handed to every stage worker.
#[derive(Clone)]
pub struct BusSender {
    tx: Sender<BusEvent>,
}

impl BusSender {
    pub fn post(&self, event: BusEvent) {
        // A dropped receiver only means the pipeline is gone; nothing to do.
        let _ = self.tx.send(event);
    }

    pub fn eos(&self) {
        self.post(BusEvent::EndOfStream);
    }

    pub fn error(&self, stage: &str, detail: impl Into<String>) {
        self.post(BusEvent::Error {
            stage: stage.to_string(),
            detail: detail.into(),
        });
    }
}
