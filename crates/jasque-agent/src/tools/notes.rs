use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jasque_core::tools::{ExecutionMode, Tool, ToolContext, ToolError, ToolResult};
use jasque_vault::Vault;

/// Note lifecycle operations: read, create, update, append, delete, and
/// task completion.
pub struct VaultNotesTool {
    vault: Arc<Vault>,
}

impl VaultNotesTool {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self { vault }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NoteOp {
    Read,
    Create,
    Update,
    Append,
    Delete,
    CompleteTask,
}

#[derive(Debug, Deserialize)]
struct NoteArgs {
    operation: NoteOp,
    path: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    task_identifier: Option<String>,
}

#[derive(Debug, Serialize)]
struct NoteOutcome {
    success: bool,
    operation: NoteOp,
    path: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl NoteOutcome {
    fn failure(operation: NoteOp, path: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            operation,
            path: path.to_string(),
            message: message.into(),
            content: None,
        }
    }
}

#[async_trait]
impl Tool for VaultNotesTool {
    fn name(&self) -> &str {
        "vault_notes"
    }

    fn description(&self) -> &str {
        "Manage notes in the vault. Operations: read (full note content), \
         create (fails if the note exists), update (replaces content, keeps \
         frontmatter), append, delete, complete_task (marks a checkbox done, \
         identified by line number or task text). Use vault_query to find \
         notes first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "create", "update", "append", "delete", "complete_task"],
                    "description": "The note operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Note path relative to the vault root, e.g. 'projects/roadmap.md'"
                },
                "content": {
                    "type": "string",
                    "description": "Note content for create/update/append"
                },
                "folder": {
                    "type": "string",
                    "description": "Target folder for create, prepended to path"
                },
                "task_identifier": {
                    "type": "string",
                    "description": "Line number or task text for complete_task"
                }
            },
            "required": ["operation", "path"]
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        if ctx.abort_signal.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let started = Instant::now();
        let args: NoteArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let op = args.operation;
        let path = args.path.clone();

        info!(run_id = %ctx.run_id, operation = ?op, path = %path, "vault note operation started");

        let outcome = match run_operation(&self.vault, args) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(operation = ?op, path = %path, error = %e, "vault note operation failed");
                NoteOutcome::failure(op, &path, e.to_string())
            }
        };

        let content = serde_json::to_string(&outcome)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolResult {
            content,
            is_error: !outcome.success,
            duration: started.elapsed(),
        })
    }
}

fn run_operation(vault: &Vault, args: NoteArgs) -> Result<NoteOutcome, jasque_vault::VaultError> {
    let op = args.operation;
    let path = args.path;

    let outcome = match op {
        NoteOp::Read => {
            let note = vault.read_note(&path)?;
            NoteOutcome {
                success: true,
                operation: op,
                path: path.clone(),
                message: format!("Successfully read note: {path}"),
                content: Some(note.content),
            }
        }
        NoteOp::Create => {
            let Some(content) = args.content.as_deref().filter(|c| !c.is_empty()) else {
                return Ok(NoteOutcome::failure(
                    op,
                    &path,
                    "Content is required for create operation.",
                ));
            };
            let note = vault.create_note(&path, content, args.folder.as_deref())?;
            NoteOutcome {
                success: true,
                operation: op,
                path: note.path.clone(),
                message: format!("Successfully created note: {}", note.path),
                content: None,
            }
        }
        NoteOp::Update => {
            let Some(content) = args.content.as_deref().filter(|c| !c.is_empty()) else {
                return Ok(NoteOutcome::failure(
                    op,
                    &path,
                    "Content is required for update operation.",
                ));
            };
            vault.update_note(&path, content, true)?;
            NoteOutcome {
                success: true,
                operation: op,
                path: path.clone(),
                message: format!("Successfully updated note: {path}"),
                content: None,
            }
        }
        NoteOp::Append => {
            let Some(content) = args.content.as_deref().filter(|c| !c.is_empty()) else {
                return Ok(NoteOutcome::failure(
                    op,
                    &path,
                    "Content is required for append operation.",
                ));
            };
            vault.append_note(&path, content)?;
            NoteOutcome {
                success: true,
                operation: op,
                path: path.clone(),
                message: format!("Successfully appended to note: {path}"),
                content: None,
            }
        }
        NoteOp::Delete => {
            vault.delete_note(&path)?;
            NoteOutcome {
                success: true,
                operation: op,
                path: path.clone(),
                message: format!("Successfully deleted note: {path}"),
                content: None,
            }
        }
        NoteOp::CompleteTask => {
            let Some(identifier) = args.task_identifier.as_deref().filter(|t| !t.is_empty())
            else {
                return Ok(NoteOutcome::failure(
                    op,
                    &path,
                    "Task identifier is required for complete_task operation.",
                ));
            };
            let task = vault.complete_task(&path, identifier)?;
            NoteOutcome {
                success: true,
                operation: op,
                path: path.clone(),
                message: format!("Successfully completed task: '{}'", task.task_text),
                content: None,
            }
        }
    };

    Ok(outcome)
}
