use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ParseError, Payload};

/// File operation verbs understood by the fileops manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Upload,
    Download,
    Copy,
    Move,
    Delete,
    List,
    Stat,
    Chmod,
    Chown,
}

impl OperationKind {
    pub fn from_tag(tag: &str) -> Result<Self, ParseError> {
        match tag {
            "upload" => Ok(OperationKind::Upload),
            "download" => Ok(OperationKind::Download),
            "copy" => Ok(OperationKind::Copy),
            "move" => Ok(OperationKind::Move),
            "delete" => Ok(OperationKind::Delete),
            "list" => Ok(OperationKind::List),
            "stat" => Ok(OperationKind::Stat),
            "chmod" => Ok(OperationKind::Chmod),
            "chown" => Ok(OperationKind::Chown),
            other => Err(ParseError::UnknownOperationType(other.to_string())),
        }
    }
}

/// File operation request, as carried in a `file_operation` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub source_path: String,
    #[serde(default)]
    pub dest_path: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl FileOperation {
    /// Parse a controller `file_operation` payload.
    pub fn from_payload(data: &Payload) -> Result<Self, ParseError> {
        let tag = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("type"))?;
        let kind = OperationKind::from_tag(tag)?;

        let source_path = data
            .get("source_path")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("source_path"))?
            .to_string();

        Ok(Self {
            kind,
            source_path,
            dest_path: data
                .get("dest_path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recursive: data
                .get("recursive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            overwrite: data
                .get("overwrite")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            metadata: match data.get("metadata") {
                Some(Value::Object(map)) => map.clone().into_iter().collect(),
                _ => HashMap::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_copy_operation() {
        let data = json!({
            "type": "copy",
            "source_path": "/src/a",
            "dest_path": "/dst/a",
            "recursive": true,
        });
        let op = FileOperation::from_payload(data.as_object().unwrap()).unwrap();
        assert_eq!(op.kind, OperationKind::Copy);
        assert_eq!(op.source_path, "/src/a");
        assert!(op.recursive);
        assert!(!op.overwrite);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let data = json!({"type": "shred", "source_path": "/x"});
        assert!(matches!(
            FileOperation::from_payload(data.as_object().unwrap()),
            Err(ParseError::UnknownOperationType(t)) if t == "shred"
        ));
    }

    #[test]
    fn source_path_is_required() {
        let data = json!({"type": "stat"});
        assert!(matches!(
            FileOperation::from_payload(data.as_object().unwrap()),
            Err(ParseError::MissingField("source_path"))
        ));
    }
}
