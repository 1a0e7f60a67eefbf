use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::time_serde;

/// Observational state of the controller transport.
///
/// Counters are process-lifetime monotonic: they keep counting across
/// reconnect cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    #[serde(default, with = "time_serde::opt", skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<SystemTime>,
    #[serde(default, with = "time_serde::opt", skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<SystemTime>,
    pub controller_url: String,
    pub protocol: String,
    pub messages_sent: u64,
    pub messages_recv: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        let info = ConnectionInfo::default();
        assert!(!info.connected);
        assert_eq!(info.messages_sent, 0);
        assert!(info.connected_at.is_none());
    }
}
