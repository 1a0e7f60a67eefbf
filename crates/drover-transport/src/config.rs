use std::time::Duration;

/// Connection settings for the controller link.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Controller URL; the scheme selects the wire binding.
    pub url: String,
    /// Bearer credential presented on connect.
    pub token: String,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Skip TLS certificate verification (lab controllers).
    pub tls_skip_verify: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            connect_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(10),
            max_reconnect_attempts: 10,
            tls_skip_verify: false,
        }
    }
}

/// `User-Agent` presented to the controller on both bindings.
pub(crate) fn user_agent() -> String {
    format!("drover-agent/{}", env!("CARGO_PKG_VERSION"))
}
