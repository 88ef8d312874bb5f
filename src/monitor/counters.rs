//! Sliding-window rate counters fed by the scan path.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Events recorded within the trailing window.
#[derive(Debug)]
pub struct RateWindow {
    hits: Mutex<VecDeque<Instant>>,
    window: Duration,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            hits: Mutex::new(VecDeque::new()),
            window,
        }
    }

    pub fn record(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        Self::prune(&mut hits, now, self.window);
        hits.push_back(now);
    }

    pub fn count(&self) -> usize {
        let mut hits = self.hits.lock();
        Self::prune(&mut hits, Instant::now(), self.window);
        hits.len()
    }

    fn prune(
        hits: &mut VecDeque<Instant>,
        now: Instant,
        window: Duration,
    ) {
        while let Some(front) = hits.front() {
            if now.saturating_duration_since(*front) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Increment hooks shared by the RPC adapter and the notification path.
#[derive(Debug)]
pub struct ResourceCounters {
    rpc_requests: RateWindow,
    outbound_messages: RateWindow,
}

impl Default for ResourceCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCounters {
    pub fn new() -> Self {
        Self {
            rpc_requests: RateWindow::new(RATE_WINDOW),
            outbound_messages: RateWindow::new(RATE_WINDOW),
        }
    }

    pub fn track_rpc_request(&self) {
        self.rpc_requests.record();
    }

    pub fn track_outbound_message(&self) {
        self.outbound_messages.record();
    }

    pub fn rpc_per_minute(&self) -> usize {
        self.rpc_requests.count()
    }

    pub fn outbound_per_minute(&self) -> usize {
        self.outbound_messages.count()
    }
}
