use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use drover_model::ConnectionInfo;

/// Connection observability shared by the pumps and the public accessors.
///
/// Counters are process-lifetime monotonic; reconnect cycles flip the
/// connected flag and timestamps but never reset the counters.
pub(crate) struct LinkState {
    url: String,
    protocol: &'static str,
    connected: AtomicBool,
    connected_at: Mutex<Option<SystemTime>>,
    disconnected_at: Mutex<Option<SystemTime>>,
    sent: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
}

impl LinkState {
    pub(crate) fn new(url: String, protocol: &'static str) -> Self {
        Self {
            url,
            protocol,
            connected: AtomicBool::new(false),
            connected_at: Mutex::new(None),
            disconnected_at: Mutex::new(None),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        *self.connected_at.lock().unwrap() = Some(SystemTime::now());
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.disconnected_at.lock().unwrap() = Some(SystemTime::now());
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn count_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connected: self.is_connected(),
            connected_at: *self.connected_at.lock().unwrap(),
            disconnected_at: *self.disconnected_at.lock().unwrap(),
            controller_url: self.url.clone(),
            protocol: self.protocol.to_string(),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_recv: self.received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_survive_reconnect() {
        let state = LinkState::new("ws://c".into(), "websocket");
        state.mark_connected();
        state.count_sent();
        state.count_sent();
        state.count_received();

        state.mark_disconnected();
        state.mark_connected();

        let info = state.info();
        assert!(info.connected);
        assert_eq!(info.messages_sent, 2);
        assert_eq!(info.messages_recv, 1);
    }
}
