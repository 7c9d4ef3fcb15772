//! Buffered channel carrying region events to the hybrid layer.
//!
//! # Invariants
//! - Events raised before `deviceReady` are held, not dropped, up to
//!   `MAX_BUFFERED_EVENTS`; beyond that the oldest event is discarded.
//! - Nothing is handed out until the gate is opened.
//! - Closing is final: pending events are discarded and blocked readers wake.

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const MAX_BUFFERED_EVENTS: usize = 256;

pub(crate) struct EventChannel {
    sender: Mutex<Option<Sender<String>>>,
    receiver: Receiver<String>,
    gate_open: AtomicBool,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = flume::bounded(MAX_BUFFERED_EVENTS);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            gate_open: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, payload: String) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return;
        };

        match sender.try_send(payload) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(payload)) => {
                let _ = self.receiver.try_recv();
                warn!("event=region_event_buffer module=ffi status=overflow dropped=1");
                if sender.try_send(payload).is_err() {
                    warn!("event=region_event_buffer module=ffi status=overflow dropped=1");
                }
            }
        }
    }

    /// Starts delivery; returns the number of events already waiting.
    pub(crate) fn open_gate(&self) -> usize {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.is_none() {
            return 0;
        }
        self.gate_open.store(true, Ordering::SeqCst);
        self.receiver.len()
    }

    /// Stops delivery and wakes blocked readers.
    pub(crate) fn close(&self) {
        self.gate_open.store(false, Ordering::SeqCst);
        // Dropping the only sender disconnects the channel.
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.receiver.drain().for_each(drop);
    }

    /// Waits up to `timeout` for the next deliverable event.
    pub(crate) fn next(&self, timeout: Duration) -> Option<String> {
        if !self.gate_open.load(Ordering::SeqCst) {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(payload) => Some(payload),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Takes every deliverable event without waiting.
    pub(crate) fn drain(&self) -> Vec<String> {
        if !self.gate_open.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.receiver.try_iter().collect()
    }
}
