use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jasque_core::tools::{ExecutionMode, Tool, ToolContext, ToolError, ToolResult};
use jasque_vault::{FolderNode, Vault};

/// Folder hierarchy operations: create, rename, move, delete, and the
/// full structure tree.
pub struct VaultStructureTool {
    vault: Arc<Vault>,
}

impl VaultStructureTool {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self { vault }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StructureOp {
    CreateFolder,
    Rename,
    DeleteFolder,
    Move,
    ListStructure,
}

#[derive(Debug, Deserialize)]
struct StructureArgs {
    operation: StructureOp,
    #[serde(default)]
    path: String,
    #[serde(default)]
    new_path: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct StructureOutcome {
    success: bool,
    operation: StructureOp,
    path: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    structure: Option<Vec<FolderNode>>,
}

impl StructureOutcome {
    fn failure(operation: StructureOp, path: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            operation,
            path: path.to_string(),
            message: message.into(),
            structure: None,
        }
    }

    fn success(operation: StructureOp, path: String, message: String) -> Self {
        Self {
            success: true,
            operation,
            path,
            message,
            structure: None,
        }
    }
}

#[async_trait]
impl Tool for VaultStructureTool {
    fn name(&self) -> &str {
        "vault_structure"
    }

    fn description(&self) -> &str {
        "Manage the vault folder structure. Operations: create_folder \
         (creates parents as needed), rename (requires new_path), \
         delete_folder (force=true for non-empty folders), move (requires \
         new_path), list_structure (folder tree). Use vault_notes for note \
         content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["create_folder", "rename", "delete_folder", "move", "list_structure"],
                    "description": "The structure operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Target folder or file path"
                },
                "new_path": {
                    "type": "string",
                    "description": "Destination path for rename/move"
                },
                "force": {
                    "type": "boolean",
                    "description": "For delete_folder, delete non-empty folders. Default false."
                }
            },
            "required": ["operation"]
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
        let args: StructureArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let op = args.operation;
        let path = args.path.clone();

        info!(run_id = %ctx.run_id, operation = ?op, path = %path, "vault structure operation started");

        let outcome = match run_operation(&self.vault, args) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(operation = ?op, path = %path, error = %e, "vault structure operation failed");
                StructureOutcome::failure(op, &path, e.to_string())
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

fn run_operation(
    vault: &Vault,
    args: StructureArgs,
) -> Result<StructureOutcome, jasque_vault::VaultError> {
    let op = args.operation;
    let path = args.path;

    let outcome = match op {
        StructureOp::CreateFolder => {
            if path.is_empty() {
                return Ok(StructureOutcome::failure(
                    op,
                    "",
                    "Path is required for create_folder operation.",
                ));
            }
            let folder = vault.create_folder(&path)?;
            let message = format!("Successfully created folder: {}", folder.path);
            StructureOutcome::success(op, folder.path, message)
        }
        StructureOp::Rename => {
            let Some(new_path) = args.new_path.as_deref().filter(|p| !p.is_empty()) else {
                return Ok(StructureOutcome::failure(
                    op,
                    &path,
                    "new_path is required for rename operation.",
                ));
            };
            if path.is_empty() {
                return Ok(StructureOutcome::failure(
                    op,
                    "",
                    "Path is required for rename operation.",
                ));
            }
            vault.rename(&path, new_path)?;
            let message = format!("Successfully renamed {path} to {new_path}");
            StructureOutcome::success(op, new_path.to_string(), message)
        }
        StructureOp::DeleteFolder => {
            if path.is_empty() {
                return Ok(StructureOutcome::failure(
                    op,
                    "",
                    "Path is required for delete_folder operation.",
                ));
            }
            vault.delete_folder(&path, args.force)?;
            let message = format!("Successfully deleted folder: {path}");
            StructureOutcome::success(op, path, message)
        }
        StructureOp::Move => {
            let Some(new_path) = args.new_path.as_deref().filter(|p| !p.is_empty()) else {
                return Ok(StructureOutcome::failure(
                    op,
                    &path,
                    "new_path is required for move operation.",
                ));
            };
            if path.is_empty() {
                return Ok(StructureOutcome::failure(
                    op,
                    "",
                    "Path is required for move operation.",
                ));
            }
            vault.move_item(&path, new_path)?;
            let message = format!("Successfully moved {path} to {new_path}");
            StructureOutcome::success(op, new_path.to_string(), message)
        }
        StructureOp::ListStructure => {
            let scope = if path.is_empty() { None } else { Some(path.as_str()) };
            let tree = vault.list_structure(scope)?;
            StructureOutcome {
                success: true,
                operation: op,
                path,
                message: "Successfully listed vault structure".into(),
                structure: Some(tree),
            }
        }
    };

    Ok(outcome)
}
