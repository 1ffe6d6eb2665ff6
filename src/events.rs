use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::task::{LaunchResult, LaunchSequenceResult};

#[derive(Debug)]
pub enum LaunchEvent {
    Progress {
        elapsed: Duration,
        total: Duration,
        status: String,
    },
    TaskStarted {
        index: usize,
        total: usize,
        label: String,
    },
    TaskCompleted {
        index: usize,
        total: usize,
        label: String,
        result: LaunchResult,
    },
    SequenceCompleted(LaunchSequenceResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    StatusChanged {
        server_id: String,
        previous: Option<bool>,
        online: bool,
        at: SystemTime,
    },
}

/// Optional event channel. Sending never fails loudly: a dropped receiver just
/// means nobody is listening anymore.
pub struct EventSink<E> {
    tx: Option<Sender<E>>,
}

impl<E> EventSink<E> {
    pub fn new(tx: Sender<E>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: E) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

impl<E> Default for EventSink<E> {
    fn default() -> Self {
        Self::disabled()
    }
}
