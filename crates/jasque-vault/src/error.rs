/// Errors from vault filesystem operations. Messages are written for the
/// model: they name the query operation that would resolve the problem.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Note not found: {0}. Use vault_query with operation='list_notes' to see available notes.")]
    NoteNotFound(String),
    #[error("Note already exists: {0}. Use operation='update' to modify existing notes.")]
    NoteAlreadyExists(String),
    #[error("Folder not found: {0}. Use vault_query with operation='list_folders' to see available paths.")]
    FolderNotFound(String),
    #[error("Folder already exists: {0}. Use a different path or delete the existing folder first.")]
    FolderAlreadyExists(String),
    #[error("Folder not empty: {0}. Use force=true or empty the folder first.")]
    FolderNotEmpty(String),
    #[error("{0}")]
    TaskNotFound(String),
    #[error("Access denied: {0}")]
    PathTraversal(String),
    #[error("Invalid YAML in _jasque/preferences.md: {0}. Check the file for syntax errors (missing colons, incorrect indentation).")]
    PreferencesParse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NoteNotFound(_) => "note_not_found",
            Self::NoteAlreadyExists(_) => "note_already_exists",
            Self::FolderNotFound(_) => "folder_not_found",
            Self::FolderAlreadyExists(_) => "folder_already_exists",
            Self::FolderNotEmpty(_) => "folder_not_empty",
            Self::TaskNotFound(_) => "task_not_found",
            Self::PathTraversal(_) => "path_traversal",
            Self::PreferencesParse(_) => "preferences_parse",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_guidance() {
        let err = VaultError::NoteNotFound("Daily/today.md".into());
        assert!(err.to_string().contains("list_notes"));

        let err = VaultError::FolderNotEmpty("Projects".into());
        assert!(err.to_string().contains("force=true"));
    }

    #[test]
    fn kinds() {
        assert_eq!(VaultError::PathTraversal("../x".into()).error_kind(), "path_traversal");
        assert_eq!(
            VaultError::PreferencesParse("bad indent".into()).error_kind(),
            "preferences_parse"
        );
    }
}
