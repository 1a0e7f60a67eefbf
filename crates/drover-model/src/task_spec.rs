use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::{Interpreter, ParseError, Payload, TaskKind};

/// Submission form for a task, as carried in the `data` of a `task` envelope.
///
/// Wire fields: `type`, `name`, `command`, `args`, `env`, `working_dir`,
/// `timeout` (seconds), `priority`, `metadata`. [`TaskSpec::from_payload`]
/// folds the string tag plus its free-form fields into a typed [`TaskKind`].
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Controller-assigned id; the engine generates one when absent.
    pub id: Option<String>,
    pub name: String,
    pub kind: TaskKind,
    /// Absolute execution timeout; `None` inherits the engine ceiling.
    pub timeout: Option<Duration>,
    pub priority: i32,
    pub metadata: HashMap<String, Value>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            timeout: None,
            priority: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parse a controller `task` payload.
    ///
    /// Fails with [`ParseError`] when the type tag is missing or unknown, or
    /// when the selected variant lacks its required fields.
    pub fn from_payload(data: &Payload) -> Result<Self, ParseError> {
        let type_tag = str_field(data, "type")?.ok_or(ParseError::MissingField("type"))?;

        let command = str_field(data, "command")?.unwrap_or_default();
        let args = string_list(data.get("args"));
        let env = string_map(data.get("env"));
        let working_dir = str_field(data, "working_dir")?.map(PathBuf::from);
        let metadata = match data.get("metadata") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            _ => HashMap::new(),
        };

        let kind = match type_tag.as_str() {
            "command" => TaskKind::Command {
                command,
                args,
                env,
                working_dir,
            },
            "script" => {
                let interpreter = metadata
                    .get("interpreter")
                    .and_then(Value::as_str)
                    .map(Interpreter::from_name)
                    .unwrap_or_default();
                TaskKind::Script {
                    source: command,
                    interpreter,
                    env,
                    working_dir,
                }
            }
            "file-op" | "file" => TaskKind::FileOp {
                operation: command,
                args,
            },
            "http-call" | "http" => {
                let url = args
                    .first()
                    .cloned()
                    .ok_or(ParseError::MissingField("args[0] (url)"))?;
                let headers = metadata
                    .get("headers")
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (k.clone(), value_to_string(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                let body = metadata
                    .get("body")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned);
                let method = if command.is_empty() {
                    "GET".to_string()
                } else {
                    command.to_uppercase()
                };
                TaskKind::HttpCall {
                    method,
                    url,
                    headers,
                    body,
                }
            }
            "container" | "docker" => TaskKind::Container { command, args },
            "cluster-op" | "kubernetes" => TaskKind::ClusterOp { command, args },
            "custom" => TaskKind::Custom { name: command },
            other => return Err(ParseError::UnknownTaskType(other.to_string())),
        };

        let timeout = match data.get("timeout") {
            Some(v) => Some(Duration::from_secs(v.as_u64().ok_or_else(|| {
                ParseError::InvalidField {
                    field: "timeout",
                    reason: "expected a non-negative integer of seconds".into(),
                }
            })?)),
            None => None,
        };

        Ok(Self {
            id: str_field(data, "id")?.filter(|s| !s.is_empty()),
            name: str_field(data, "name")?.unwrap_or_default(),
            kind,
            timeout,
            priority: data
                .get("priority")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32,
            metadata,
        })
    }
}

fn str_field(data: &Payload, field: &'static str) -> Result<Option<String>, ParseError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseError::InvalidField {
            field,
            reason: "expected a string".into(),
        }),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(value_to_string).collect())
        .unwrap_or_default()
}

fn string_map(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
