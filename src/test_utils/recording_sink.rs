use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Error;
use crate::NotificationSink;
use crate::PendingEvent;
use crate::Result;

/// Sink that keeps every delivered event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PendingEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(
        &self,
        failing: bool,
    ) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PendingEvent> {
        self.events.lock().clone()
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.id.clone()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        event: PendingEvent,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Notification(format!("sink down, dropped {}", event.id)));
        }
        self.events.lock().push(event);
        Ok(())
    }
}
