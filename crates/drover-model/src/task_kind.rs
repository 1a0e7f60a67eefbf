use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Script interpreter for [`TaskKind::Script`] tasks.
///
/// The controller selects one via the task's `metadata.interpreter` key;
/// anything else falls back to `/bin/sh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    #[default]
    Sh,
    Bash,
    Python,
    Ruby,
    Perl,
}

impl Interpreter {
    pub fn from_name(name: &str) -> Self {
        match name {
            "bash" => Interpreter::Bash,
            "python" => Interpreter::Python,
            "ruby" => Interpreter::Ruby,
            "perl" => Interpreter::Perl,
            _ => Interpreter::Sh,
        }
    }

    /// Absolute path of the interpreter binary on the host.
    pub fn program(&self) -> &'static str {
        match self {
            Interpreter::Sh => "/bin/sh",
            Interpreter::Bash => "/bin/bash",
            Interpreter::Python => "/usr/bin/python3",
            Interpreter::Ruby => "/usr/bin/ruby",
            Interpreter::Perl => "/usr/bin/perl",
        }
    }
}

/// Execution configuration for a task.
///
/// Each variant carries the parameter bundle its executor needs, so a task is
/// fully described by its kind instead of a string tag plus loose metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
    /// Run a host binary directly.
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
    },
    /// Run inline source through an interpreter (`interpreter -c <source>`).
    Script {
        source: String,
        #[serde(default)]
        interpreter: Interpreter,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
    },
    /// Host file manipulation via `cp`/`mv`/`rm`/`chmod`/`chown`.
    FileOp {
        operation: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// HTTP request executed through host `curl`.
    HttpCall {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    /// `docker <command> <args...>` on the host.
    Container {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// `kubectl <command> <args...>` on the host.
    ClusterOp {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// Reserved for plugin executors; currently always rejected.
    Custom { name: String },
}

impl TaskKind {
    /// Short wire tag for logging, metrics and result metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskKind::Command { .. } => "command",
            TaskKind::Script { .. } => "script",
            TaskKind::FileOp { .. } => "file-op",
            TaskKind::HttpCall { .. } => "http-call",
            TaskKind::Container { .. } => "container",
            TaskKind::ClusterOp { .. } => "cluster-op",
            TaskKind::Custom { .. } => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_wire_names() {
        let kind = TaskKind::Command {
            command: "/bin/true".into(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
        };
        assert_eq!(kind.kind(), "command");

        let kind = TaskKind::ClusterOp {
            command: "get".into(),
            args: vec!["pods".into()],
        };
        assert_eq!(kind.kind(), "cluster-op");
    }

    #[test]
    fn serde_tags_are_kebab_case() {
        let kind = TaskKind::HttpCall {
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: HashMap::new(),
            body: None,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "http-call");
    }

    #[test]
    fn interpreter_fallback_is_sh() {
        assert_eq!(Interpreter::from_name("bash"), Interpreter::Bash);
        assert_eq!(Interpreter::from_name("fish"), Interpreter::Sh);
        assert_eq!(Interpreter::Sh.program(), "/bin/sh");
    }
}
