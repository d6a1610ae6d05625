//! Wire shapes exchanged between the session controller and the worker
//!
//! Both directions are closed tagged unions: every envelope carries the
//! correlation id of the logical operation it belongs to, and consumers
//! dispatch exhaustively on `kind`. Interim responses (output bytes, input
//! requests) never end an operation; exactly one terminal response does.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BuildConfig;

/// Command envelope sent from the controller to the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Correlation id: the operation id for `Compile`/`Run`, the nested
    /// request id for `InputByte`
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: CommandKind,
}

/// The command payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CommandKind {
    /// Compile a file map starting from the entry label
    #[serde(rename = "COMPILE")]
    Compile {
        file_map: HashMap<String, String>,
        entry_label: String,
        config: BuildConfig,
    },
    /// Execute previously compiled code
    #[serde(rename = "RUN")]
    Run { code: String, grid_mode: bool },
    /// Answer a pending input request (id is the nested request id)
    #[serde(rename = "INPUT_BYTE")]
    InputByte { byte: u8 },
}

/// Response envelope emitted by the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Correlation id echoed from the command that started the operation
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ResponseKind,
}

/// The response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResponseKind {
    /// Ends the operation: compiled code or final output on success, an
    /// error description on failure
    #[serde(rename = "TERMINAL")]
    Terminal { success: bool, message: String },
    /// One byte of streamed program output (run only)
    #[serde(rename = "OUTPUT_BYTE")]
    OutputByte { byte: u8 },
    /// The running program wants one byte of input (run only); the worker
    /// stalls until the matching `InputByte` command arrives
    #[serde(rename = "REQUEST_INPUT")]
    RequestInput { nested_id: Uuid },
}

impl WorkerCommand {
    pub fn compile(
        id: Uuid,
        file_map: HashMap<String, String>,
        entry_label: impl Into<String>,
        config: BuildConfig,
    ) -> Self {
        Self {
            id,
            kind: CommandKind::Compile {
                file_map,
                entry_label: entry_label.into(),
                config,
            },
        }
    }

    pub fn run(id: Uuid, code: impl Into<String>, grid_mode: bool) -> Self {
        Self {
            id,
            kind: CommandKind::Run {
                code: code.into(),
                grid_mode,
            },
        }
    }

    pub fn input_byte(nested_id: Uuid, byte: u8) -> Self {
        Self {
            id: nested_id,
            kind: CommandKind::InputByte { byte },
        }
    }
}

impl WorkerResponse {
    pub fn terminal(id: Uuid, success: bool, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: ResponseKind::Terminal {
                success,
                message: message.into(),
            },
        }
    }

    pub fn output_byte(id: Uuid, byte: u8) -> Self {
        Self {
            id,
            kind: ResponseKind::OutputByte { byte },
        }
    }

    pub fn request_input(id: Uuid, nested_id: Uuid) -> Self {
        Self {
            id,
            kind: ResponseKind::RequestInput { nested_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_command_wire_shape() {
        let id = Uuid::new_v4();
        let mut files = HashMap::new();
        files.insert("a.tape".to_string(), "+.".to_string());
        let command = WorkerCommand::compile(id, files, "a.tape", BuildConfig::default());

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["kind"], "COMPILE");
        assert_eq!(value["id"], serde_json::json!(id));
        assert_eq!(value["entry_label"], "a.tape");
        assert_eq!(value["file_map"]["a.tape"], "+.");
    }

    #[test]
    fn input_byte_carries_nested_id() {
        let nested = Uuid::new_v4();
        let command = WorkerCommand::input_byte(nested, 65);

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["kind"], "INPUT_BYTE");
        assert_eq!(value["byte"], 65);
        assert_eq!(value["id"], serde_json::json!(nested));
    }

    #[test]
    fn responses_round_trip() {
        let id = Uuid::new_v4();
        let nested = Uuid::new_v4();
        for response in [
            WorkerResponse::terminal(id, true, "done"),
            WorkerResponse::output_byte(id, 72),
            WorkerResponse::request_input(id, nested),
        ] {
            let json = serde_json::to_string(&response).unwrap();
            let back: WorkerResponse = serde_json::from_str(&json).unwrap();
            assert_eq!(back.id, id);
            match (&response.kind, &back.kind) {
                (ResponseKind::Terminal { success: a, .. }, ResponseKind::Terminal { success: b, .. }) => {
                    assert_eq!(a, b)
                }
                (ResponseKind::OutputByte { byte: a }, ResponseKind::OutputByte { byte: b }) => {
                    assert_eq!(a, b)
                }
                (
                    ResponseKind::RequestInput { nested_id: a },
                    ResponseKind::RequestInput { nested_id: b },
                ) => assert_eq!(a, b),
                _ => panic!("kind changed across the wire"),
            }
        }
    }
}
