use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basic information about a note.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteInfo {
    pub path: String,
    pub title: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// Information about a folder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderInfo {
    pub path: String,
    pub name: String,
}

/// A search result with matching line context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub line_number: usize,
}

/// A note that links to another note.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BacklinkResult {
    pub path: String,
    pub title: String,
    pub context: String,
}

/// A task checkbox found in a note.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInfo {
    pub path: String,
    pub task_text: String,
    pub completed: bool,
    pub line_number: usize,
}

/// Full note content including parsed frontmatter metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteContent {
    pub path: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Either kind of renamed/moved item.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum VaultItem {
    Note(NoteContent),
    Folder(FolderInfo),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Folder,
    Note,
}

/// A node in the vault folder tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    pub path: String,
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FolderNode>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_serde() {
        assert_eq!(serde_json::to_string(&NodeType::Folder).unwrap(), r#""folder""#);
        assert_eq!(serde_json::to_string(&NodeType::Note).unwrap(), r#""note""#);
    }

    #[test]
    fn folder_node_omits_missing_children() {
        let node = FolderNode {
            name: "todo.md".into(),
            path: "Daily/todo.md".into(),
            node_type: NodeType::Note,
            children: None,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("children").is_none());
    }
}
