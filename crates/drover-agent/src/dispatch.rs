use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use drover_engine::Engine;
use drover_fileops::FileOpsManager;
use drover_model::{Envelope, FileOperation, MessageType, Payload, TaskSpec};
use drover_transport::{Transport, TransportError};

use crate::health;

/// Shared context handed to every message handler.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub agent_id: String,
    pub engine: Arc<Engine>,
    pub fileops: Arc<FileOpsManager>,
    pub transport: Arc<dyn Transport>,
    pub started_at: Instant,
}

/// Receive loop: each inbound message is handled in its own task so one
/// slow handler cannot block the next receive. Receive errors back off one
/// second; the transport performs its own reconnect underneath.
pub(crate) async fn receive_loop(dispatcher: Dispatcher, shutdown: CancellationToken) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => return,
            message = dispatcher.transport.recv(&shutdown) => message,
        };

        match message {
            Ok(message) => {
                let dispatcher = dispatcher.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    handle_message(&dispatcher, &shutdown, message).await;
                });
            }
            Err(TransportError::Cancelled) => return,
            Err(e) => {
                warn!(error = %e, "failed to receive message");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
}

pub(crate) async fn handle_message(
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
    message: Envelope,
) {
    debug!(
        message_id = %message.id,
        message_type = %message.message_type,
        "handling message"
    );

    let reply = match message.message_type {
        MessageType::Task => handle_task(dispatcher, shutdown, &message).await,
        MessageType::FileOperation => handle_file_operation(dispatcher, &message).await,
        MessageType::HealthCheck => {
            let data = health::snapshot(
                &dispatcher.engine,
                Some(&dispatcher.transport),
                dispatcher.started_at.elapsed(),
            );
            Envelope::reply(&message, MessageType::HealthCheckResult, data)
        }
        MessageType::Config => {
            // Dynamic reconfiguration is out of contract; acknowledge only.
            let mut data = Payload::new();
            data.insert("status".into(), "acknowledged".into());
            Envelope::reply(&message, MessageType::ConfigResult, data)
        }
        other => {
            warn!(message_type = %other, "unknown message type");
            Envelope::error_reply(
                &message,
                "UNKNOWN_TYPE",
                format!("no handler for message type: {other}"),
            )
        }
    };

    let reply = reply.with_agent_id(dispatcher.agent_id.clone());
    if let Err(e) = dispatcher.transport.send(reply).await {
        error!(request_id = %message.id, error = %e, "failed to send reply");
    }
}

async fn handle_task(
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
    message: &Envelope,
) -> Envelope {
    let spec = match TaskSpec::from_payload(&message.data) {
        Ok(spec) => spec,
        Err(e) => {
            error!(error = %e, "failed to parse task");
            return Envelope::error_reply(message, "VALIDATION_ERROR", e.to_string());
        }
    };

    match dispatcher.engine.execute(shutdown, spec).await {
        Ok(result) => {
            let mut data = Payload::new();
            data.insert("task_id".into(), result.task_id.clone().into());
            data.insert("status".into(), result.status.as_str().into());
            data.insert("output".into(), result.output.clone().into());
            data.insert("error".into(), result.error.clone().into());
            Envelope::reply(message, MessageType::TaskResult, data)
        }
        Err(e) => {
            error!(error = %e, "failed to execute task");
            Envelope::error_reply(message, e.code(), e.to_string())
        }
    }
}

async fn handle_file_operation(dispatcher: &Dispatcher, message: &Envelope) -> Envelope {
    let operation = match FileOperation::from_payload(&message.data) {
        Ok(operation) => operation,
        Err(e) => {
            error!(error = %e, "failed to parse file operation");
            return Envelope::error_reply(message, "VALIDATION_ERROR", e.to_string());
        }
    };

    match dispatcher.fileops.execute(&operation).await {
        Ok(result) => Envelope::reply(message, MessageType::FileOperationResult, result),
        Err(e) => {
            error!(error = %e, "failed to execute file operation");
            Envelope::error_reply(message, e.code(), e.to_string())
        }
    }
}
