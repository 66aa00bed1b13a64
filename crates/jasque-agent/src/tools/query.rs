use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jasque_core::tools::{ExecutionMode, Tool, ToolContext, ToolError, ToolResult};
use jasque_vault::Vault;

const DEFAULT_LIMIT: usize = 50;

/// Read-only vault queries: search, browse, and relationship discovery.
pub struct VaultQueryTool {
    vault: Arc<Vault>,
}

impl VaultQueryTool {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self { vault }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum QueryOp {
    SearchText,
    FindByTag,
    FindByName,
    ListNotes,
    ListFolders,
    GetBacklinks,
    GetTags,
    ListTasks,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResponseFormat {
    #[default]
    Concise,
    Detailed,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    operation: QueryOp,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    include_completed: bool,
    #[serde(default)]
    response_format: ResponseFormat,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Default, Serialize)]
struct QueryItem {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_number: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QueryOutcome {
    success: bool,
    operation: QueryOp,
    total_count: usize,
    results: Vec<QueryItem>,
    truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl QueryOutcome {
    fn failure(operation: QueryOp, message: impl Into<String>) -> Self {
        Self {
            success: false,
            operation,
            total_count: 0,
            results: Vec::new(),
            truncated: false,
            message: Some(message.into()),
        }
    }

    fn success(operation: QueryOp, results: Vec<QueryItem>, limit: usize) -> Self {
        let truncated = results.len() >= limit;
        let message = if results.is_empty() {
            Some("No results found. Try broadening your search or checking the path.".to_string())
        } else {
            None
        };
        Self {
            success: true,
            operation,
            total_count: results.len(),
            results,
            truncated,
            message,
        }
    }
}

#[async_trait]
impl Tool for VaultQueryTool {
    fn name(&self) -> &str {
        "vault_query"
    }

    fn description(&self) -> &str {
        "Search and query the vault for notes, tags, tasks, and relationships. \
         Operations: search_text (requires query), find_by_tag (requires tags), \
         find_by_name (requires name), list_notes, list_folders, get_backlinks \
         (requires path), get_tags, list_tasks. Read-only; use vault_notes to \
         read or modify note content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "search_text", "find_by_tag", "find_by_name", "list_notes",
                        "list_folders", "get_backlinks", "get_tags", "list_tasks"
                    ],
                    "description": "The query operation to perform"
                },
                "query": {
                    "type": "string",
                    "description": "Search string for search_text. Case-insensitive."
                },
                "path": {
                    "type": "string",
                    "description": "Folder or note path to scope the operation. Omit for whole vault."
                },
                "name": {
                    "type": "string",
                    "description": "Note name or title for find_by_name."
                },
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Tags for find_by_tag. Matches notes with ANY tag."
                },
                "include_completed": {
                    "type": "boolean",
                    "description": "For list_tasks, include completed tasks. Default false."
                },
                "response_format": {
                    "type": "string",
                    "enum": ["concise", "detailed"],
                    "description": "concise (default) returns paths and titles; detailed adds snippets, tags, timestamps."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results. Default 50."
                }
            },
            "required": ["operation"]
        })
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Concurrent
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
        let args: QueryArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let op = args.operation;
        let detailed = args.response_format == ResponseFormat::Detailed;
        let path = args.path.as_deref();
        let limit = args.limit;

        info!(run_id = %ctx.run_id, operation = ?op, path, "vault query started");

        let outcome = match run_query(&self.vault, &args, detailed) {
            Ok(items) => QueryOutcome::success(op, items, limit),
            Err(QueryFailure::MissingParam(message)) => QueryOutcome::failure(op, message),
            Err(QueryFailure::Vault(e)) => {
                warn!(operation = ?op, error = %e, "vault query failed");
                QueryOutcome::failure(op, e.to_string())
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

enum QueryFailure {
    MissingParam(String),
    Vault(jasque_vault::VaultError),
}

impl From<jasque_vault::VaultError> for QueryFailure {
    fn from(e: jasque_vault::VaultError) -> Self {
        Self::Vault(e)
    }
}

fn run_query(
    vault: &Vault,
    args: &QueryArgs,
    detailed: bool,
) -> Result<Vec<QueryItem>, QueryFailure> {
    let path = args.path.as_deref();
    let limit = args.limit;

    let items = match args.operation {
        QueryOp::SearchText => {
            let Some(query) = args.query.as_deref().filter(|q| !q.is_empty()) else {
                return Err(QueryFailure::MissingParam(
                    "Query parameter is required for search_text operation. \
                     Example: query='meeting notes'"
                        .into(),
                ));
            };
            vault
                .search_text(query, path, limit)?
                .into_iter()
                .map(|r| QueryItem {
                    path: r.path,
                    title: Some(r.title),
                    snippet: detailed.then_some(r.snippet),
                    line_number: Some(r.line_number),
                    ..Default::default()
                })
                .collect()
        }
        QueryOp::FindByTag => {
            let Some(tags) = args.tags.as_ref().filter(|t| !t.is_empty()) else {
                return Err(QueryFailure::MissingParam(
                    "Tags parameter is required for find_by_tag operation. \
                     Example: tags=['project', 'urgent']"
                        .into(),
                ));
            };
            vault
                .find_by_tag(tags, path, limit)?
                .into_iter()
                .map(|r| note_item(r, detailed))
                .collect()
        }
        QueryOp::FindByName => {
            let Some(name) = args.name.as_deref().filter(|n| !n.is_empty()) else {
                return Err(QueryFailure::MissingParam(
                    "Name parameter is required for find_by_name operation. \
                     Example: name='weekly plan'"
                        .into(),
                ));
            };
            vault
                .find_by_name(name, path, limit)?
                .into_iter()
                .map(|r| note_item(r, detailed))
                .collect()
        }
        QueryOp::ListNotes => vault
            .list_notes(path)?
            .into_iter()
            .take(limit)
            .map(|r| note_item(r, detailed))
            .collect(),
        QueryOp::ListFolders => vault
            .list_folders(path)?
            .into_iter()
            .take(limit)
            .map(|r| QueryItem {
                path: r.path,
                title: Some(r.name),
                ..Default::default()
            })
            .collect(),
        QueryOp::GetBacklinks => {
            let Some(path) = path.filter(|p| !p.is_empty()) else {
                return Err(QueryFailure::MissingParam(
                    "Path parameter is required for get_backlinks operation. \
                     Example: path='concepts/zettelkasten.md'"
                        .into(),
                ));
            };
            vault
                .get_backlinks(path, limit)?
                .into_iter()
                .map(|r| QueryItem {
                    path: r.path,
                    title: Some(r.title),
                    snippet: detailed.then_some(r.context),
                    ..Default::default()
                })
                .collect()
        }
        QueryOp::GetTags => vault
            .get_tags()?
            .into_iter()
            .take(limit)
            .map(|tag| QueryItem {
                title: Some(tag),
                ..Default::default()
            })
            .collect(),
        QueryOp::ListTasks => vault
            .list_tasks(path, args.include_completed, limit)?
            .into_iter()
            .map(|r| QueryItem {
                path: r.path,
                task_text: Some(r.task_text),
                task_completed: Some(r.completed),
                line_number: Some(r.line_number),
                ..Default::default()
            })
            .collect(),
    };

    Ok(items)
}

fn note_item(info: jasque_vault::NoteInfo, detailed: bool) -> QueryItem {
    QueryItem {
        path: info.path,
        title: Some(info.title),
        tags: detailed.then_some(info.tags),
        modified: if detailed { info.modified } else { None },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    fn test_vault() -> (Arc<Vault>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("jasque_query_{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(dir.join("projects")).unwrap();
        fs::write(
            dir.join("projects/roadmap.md"),
            "---\ntags: [project]\n---\n# Roadmap\n\n- [ ] ship v1\n",
        )
        .unwrap();
        fs::write(dir.join("inbox.md"), "Quick capture about the roadmap.\n").unwrap();
        (Arc::new(Vault::new(&dir)), dir)
    }

    async fn run(tool: &VaultQueryTool, args: serde_json::Value) -> serde_json::Value {
        let ctx = ToolContext::new(jasque_core::ids::RunId::new());
        let result = tool.execute(args, &ctx).await.unwrap();
        serde_json::from_str(&result.content).unwrap()
    }

    #[tokio::test]
    async fn search_text_finds_matches() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let outcome = run(&tool, json!({"operation": "search_text", "query": "roadmap"})).await;
        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["total_count"], 2);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn search_text_requires_query() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let ctx = ToolContext::new(jasque_core::ids::RunId::new());
        let result = tool
            .execute(json!({"operation": "search_text"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("Query parameter is required"));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn detailed_format_adds_snippets() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let concise =
            run(&tool, json!({"operation": "search_text", "query": "roadmap"})).await;
        assert!(concise["results"][0].get("snippet").is_none());

        let detailed = run(
            &tool,
            json!({"operation": "search_text", "query": "roadmap", "response_format": "detailed"}),
        )
        .await;
        assert!(detailed["results"][0]["snippet"].is_string());
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn find_by_tag_and_name() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let by_tag = run(&tool, json!({"operation": "find_by_tag", "tags": ["project"]})).await;
        assert_eq!(by_tag["total_count"], 1);
        assert_eq!(by_tag["results"][0]["path"], "projects/roadmap.md");

        let by_name = run(&tool, json!({"operation": "find_by_name", "name": "roadmap"})).await;
        assert_eq!(by_name["results"][0]["path"], "projects/roadmap.md");
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn list_tasks_skips_completed_by_default() {
        let (vault, dir) = test_vault();
        fs::write(
            dir.join("done.md"),
            "- [x] already finished\n- [ ] still open\n",
        )
        .unwrap();
        let tool = VaultQueryTool::new(vault);

        let outcome = run(&tool, json!({"operation": "list_tasks"})).await;
        let tasks: Vec<&str> = outcome["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["task_text"].as_str().unwrap())
            .collect();
        assert!(tasks.contains(&"still open"));
        assert!(tasks.contains(&"ship v1"));
        assert!(!tasks.contains(&"already finished"));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn empty_results_carry_a_hint() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let outcome = run(
            &tool,
            json!({"operation": "search_text", "query": "nonexistent topic"}),
        )
        .await;
        assert_eq!(outcome["success"], true);
        assert!(outcome["message"]
            .as_str()
            .unwrap()
            .contains("No results found"));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unknown_operation_is_invalid_arguments() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let ctx = ToolContext::new(jasque_core::ids::RunId::new());
        let result = tool.execute(json!({"operation": "explode"}), &ctx).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let (vault, dir) = test_vault();
        let tool = VaultQueryTool::new(vault);

        let ctx = ToolContext::new(jasque_core::ids::RunId::new());
        ctx.abort_signal.cancel();
        let result = tool.execute(json!({"operation": "get_tags"}), &ctx).await;
        assert!(matches!(result, Err(ToolError::Cancelled)));
        fs::remove_dir_all(&dir).ok();
    }
}
