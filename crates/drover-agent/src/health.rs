use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use drover_engine::Engine;
use drover_model::Payload;
use drover_transport::Transport;

/// Build the health snapshot replied to `health_check` messages.
pub(crate) fn snapshot(
    engine: &Engine,
    transport: Option<&Arc<dyn Transport>>,
    uptime: Duration,
) -> Payload {
    let stats = engine.stats();

    let mut data = Payload::new();
    data.insert("status".into(), "healthy".into());
    data.insert("uptime_seconds".into(), uptime.as_secs().into());
    data.insert(
        "tasks".into(),
        serde_json::to_value(&stats).unwrap_or_default(),
    );
    data.insert(
        "connection".into(),
        match transport {
            Some(transport) => serde_json::to_value(transport.info()).unwrap_or_default(),
            None => json!(null),
        },
    );
    data
}
