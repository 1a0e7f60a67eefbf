use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{time_serde, Payload};

/// Kinds of envelopes exchanged with the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Heartbeat,
    Task,
    TaskResult,
    FileOperation,
    FileOperationResult,
    HealthCheck,
    HealthCheckResult,
    Config,
    ConfigResult,
    Error,
    Log,
    Metrics,
}

impl MessageType {
    /// Parse the wire tag used by bindings that carry the type as a plain
    /// string (the gRPC frame).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "heartbeat" => Some(MessageType::Heartbeat),
            "task" => Some(MessageType::Task),
            "task_result" => Some(MessageType::TaskResult),
            "file_operation" => Some(MessageType::FileOperation),
            "file_operation_result" => Some(MessageType::FileOperationResult),
            "health_check" => Some(MessageType::HealthCheck),
            "health_check_result" => Some(MessageType::HealthCheckResult),
            "config" => Some(MessageType::Config),
            "config_result" => Some(MessageType::ConfigResult),
            "error" => Some(MessageType::Error),
            "log" => Some(MessageType::Log),
            "metrics" => Some(MessageType::Metrics),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Heartbeat => "heartbeat",
            MessageType::Task => "task",
            MessageType::TaskResult => "task_result",
            MessageType::FileOperation => "file_operation",
            MessageType::FileOperationResult => "file_operation_result",
            MessageType::HealthCheck => "health_check",
            MessageType::HealthCheckResult => "health_check_result",
            MessageType::Config => "config",
            MessageType::ConfigResult => "config_result",
            MessageType::Error => "error",
            MessageType::Log => "log",
            MessageType::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlated message envelope on the controller link.
///
/// One JSON object per WebSocket text frame; the gRPC binding carries the
/// same fields with `data` as JSON bytes. Every solicited reply carries
/// `reply_to` equal to the request's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(with = "time_serde")]
    pub timestamp: SystemTime,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub data: Payload,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Envelope {
    pub fn new(message_type: MessageType, data: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            timestamp: SystemTime::now(),
            agent_id: String::new(),
            reply_to: None,
            data,
            metadata: HashMap::new(),
        }
    }

    /// Build a reply to `request`, correlated via `reply_to`.
    pub fn reply(request: &Envelope, message_type: MessageType, data: Payload) -> Self {
        let mut reply = Self::new(message_type, data);
        reply.reply_to = Some(request.id.clone());
        reply
    }

    /// Build an `error` reply carrying a code and human-readable text.
    pub fn error_reply(request: &Envelope, code: &str, message: impl Into<String>) -> Self {
        let mut data = Payload::new();
        data.insert("code".into(), code.into());
        data.insert("error".into(), message.into().into());
        Self::reply(request, MessageType::Error, data)
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }
}
