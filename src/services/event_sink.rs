//! Outbound notifications.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::types::events::OrganizeEvent;

/// Receives engine notifications. Emitting never fails the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrganizeEvent);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: OrganizeEvent) {}
}

/// Forwards events into a tokio channel.
pub struct ChannelEventSink {
    tx: UnboundedSender<OrganizeEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: UnboundedSender<OrganizeEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: OrganizeEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<OrganizeEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<OrganizeEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<OrganizeEvent> {
        self.guard().clone()
    }

    pub fn take(&self) -> Vec<OrganizeEvent> {
        std::mem::take(&mut *self.guard())
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: OrganizeEvent) {
        self.guard().push(event);
    }
}
