use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::VaultError;
use crate::frontmatter;
use crate::types::{
    BacklinkResult, FolderInfo, FolderNode, NodeType, NoteContent, NoteInfo, SearchResult,
    TaskInfo, VaultItem,
};

/// Folder reserved for Jasque's own files; excluded from every query.
pub const RESERVED_FOLDER: &str = "_jasque";

const SNIPPET_MAX: usize = 200;

/// Filesystem manager for an Obsidian-style markdown vault. All relative
/// paths are validated to stay inside the vault root.
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path against the vault root, rejecting absolute
    /// paths and any traversal above the root. Lexical only, so paths that
    /// do not exist yet still validate.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, VaultError> {
        if path.is_empty() {
            return Ok(self.root.clone());
        }

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(VaultError::PathTraversal(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(VaultError::PathTraversal(path.to_string()));
                }
            }
        }

        let mut full = self.root.clone();
        for part in parts {
            full.push(part);
        }
        Ok(full)
    }

    fn is_excluded(name: &str) -> bool {
        name.starts_with('.') || name == RESERVED_FOLDER
    }

    fn rel(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn read_opt(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    fn stem(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    fn atomic_write(path: &Path, content: &str) -> Result<(), VaultError> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = path.with_file_name(format!("{}.{}.tmp", file_name, &suffix[..8]));

        if let Err(e) = fs::write(&temp, content) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// All markdown files under `dir`, depth-first, sorted entries, with
    /// hidden and reserved folders skipped.
    fn collect_markdown(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_excluded(&name) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                self.collect_markdown(&path, out);
            } else if name.ends_with(".md") {
                out.push(path);
            }
        }
    }

    fn note_info(&self, path: &Path) -> NoteInfo {
        let content = Self::read_opt(path).unwrap_or_default();
        NoteInfo {
            path: self.rel(path),
            title: frontmatter::title(&content, &Self::stem(path)),
            tags: frontmatter::tags(&content),
            modified: Self::modified_at(path),
        }
    }

    // --- Notes ---

    pub fn list_notes(&self, folder: Option<&str>) -> Result<Vec<NoteInfo>, VaultError> {
        let base = self.resolve(folder.unwrap_or(""))?;
        if !base.exists() {
            return Err(VaultError::FolderNotFound(folder.unwrap_or("").to_string()));
        }

        let mut files = Vec::new();
        self.collect_markdown(&base, &mut files);
        let notes: Vec<NoteInfo> = files.iter().map(|p| self.note_info(p)).collect();

        tracing::info!(folder = folder.unwrap_or(""), count = notes.len(), "listed notes");
        Ok(notes)
    }

    pub fn list_folders(&self, path: Option<&str>) -> Result<Vec<FolderInfo>, VaultError> {
        let base = self.resolve(path.unwrap_or(""))?;
        if !base.exists() {
            return Err(VaultError::FolderNotFound(path.unwrap_or("").to_string()));
        }

        let mut folders = Vec::new();
        if let Ok(entries) = fs::read_dir(&base) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if Self::is_excluded(&name) || !entry.path().is_dir() {
                    continue;
                }
                folders.push(FolderInfo {
                    path: self.rel(&entry.path()),
                    name,
                });
            }
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::info!(path = path.unwrap_or(""), count = folders.len(), "listed folders");
        Ok(folders)
    }

    pub fn read_note(&self, path: &str) -> Result<NoteContent, VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::NoteNotFound(path.to_string()));
        }
        let content =
            Self::read_opt(&full).ok_or_else(|| VaultError::NoteNotFound(path.to_string()))?;

        let (metadata, body) = frontmatter::parse_lenient(&content);
        Ok(NoteContent {
            path: path.to_string(),
            title: frontmatter::title(&content, &Self::stem(&full)),
            content: body.to_string(),
            tags: frontmatter::tags(&content),
            metadata,
        })
    }

    pub fn create_note(
        &self,
        path: &str,
        content: &str,
        folder: Option<&str>,
    ) -> Result<NoteContent, VaultError> {
        let mut rel_path = match folder {
            Some(folder) => format!(
                "{}/{}",
                folder.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        };
        if !rel_path.ends_with(".md") {
            rel_path.push_str(".md");
        }

        let full = self.resolve(&rel_path)?;
        if full.exists() {
            return Err(VaultError::NoteAlreadyExists(rel_path));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        Self::atomic_write(&full, content)?;
        tracing::info!(path = %rel_path, "note created");
        self.read_note(&rel_path)
    }

    pub fn update_note(
        &self,
        path: &str,
        content: &str,
        preserve_frontmatter: bool,
    ) -> Result<NoteContent, VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::NoteNotFound(path.to_string()));
        }

        let final_content = if preserve_frontmatter {
            match Self::read_opt(&full) {
                Some(existing) => frontmatter::replace_body(&existing, content),
                None => content.to_string(),
            }
        } else {
            content.to_string()
        };

        Self::atomic_write(&full, &final_content)?;
        tracing::info!(path = %path, "note updated");
        self.read_note(path)
    }

    pub fn append_note(&self, path: &str, content: &str) -> Result<NoteContent, VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::NoteNotFound(path.to_string()));
        }
        let existing =
            Self::read_opt(&full).ok_or_else(|| VaultError::NoteNotFound(path.to_string()))?;

        let new_content = if !existing.is_empty() && !existing.ends_with('\n') {
            format!("{existing}\n{content}")
        } else {
            format!("{existing}{content}")
        };

        Self::atomic_write(&full, &new_content)?;
        tracing::info!(path = %path, "note appended");
        self.read_note(path)
    }

    pub fn delete_note(&self, path: &str) -> Result<(), VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::NoteNotFound(path.to_string()));
        }
        fs::remove_file(&full)?;
        tracing::info!(path = %path, "note deleted");
        Ok(())
    }

    /// Mark a task checkbox done. The identifier cascades: line number,
    /// then exact text, then unique substring.
    pub fn complete_task(&self, path: &str, identifier: &str) -> Result<TaskInfo, VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::NoteNotFound(path.to_string()));
        }
        let content =
            Self::read_opt(&full).ok_or_else(|| VaultError::NoteNotFound(path.to_string()))?;

        let tasks = frontmatter::tasks(&content);
        if tasks.is_empty() {
            return Err(VaultError::TaskNotFound(format!(
                "No tasks found in {path}. Use vault_query with operation='list_tasks' to find notes with tasks."
            )));
        }

        let target = if let Ok(line) = identifier.parse::<usize>() {
            match tasks.iter().find(|t| t.line_number == line) {
                Some(task) if task.completed => {
                    return Err(VaultError::TaskNotFound(format!(
                        "Task at line {line} is already completed: '{}'",
                        task.text
                    )));
                }
                Some(task) => task.clone(),
                None => {
                    let lines: Vec<String> =
                        tasks.iter().map(|t| t.line_number.to_string()).collect();
                    return Err(VaultError::TaskNotFound(format!(
                        "No task at line {line}. Tasks at lines: {}",
                        lines.join(", ")
                    )));
                }
            }
        } else {
            let needle = identifier.to_lowercase();
            let exact: Vec<_> = tasks
                .iter()
                .filter(|t| !t.completed && t.text.to_lowercase() == needle)
                .collect();
            match exact.len() {
                1 => exact[0].clone(),
                0 => {
                    let substr: Vec<_> = tasks
                        .iter()
                        .filter(|t| !t.completed && t.text.to_lowercase().contains(&needle))
                        .collect();
                    match substr.len() {
                        1 => substr[0].clone(),
                        0 => {
                            let available: Vec<String> = tasks
                                .iter()
                                .filter(|t| !t.completed)
                                .map(|t| format!("'{}'", t.text))
                                .collect();
                            return Err(VaultError::TaskNotFound(format!(
                                "Task not found: '{identifier}'. Available: {}",
                                if available.is_empty() {
                                    "none".to_string()
                                } else {
                                    available.join(", ")
                                }
                            )));
                        }
                        _ => {
                            let matches: Vec<String> = substr
                                .iter()
                                .map(|t| format!("'{}' (line {})", t.text, t.line_number))
                                .collect();
                            return Err(VaultError::TaskNotFound(format!(
                                "Multiple tasks match '{identifier}': {}",
                                matches.join(", ")
                            )));
                        }
                    }
                }
                _ => {
                    let matches: Vec<String> = exact
                        .iter()
                        .map(|t| format!("'{}' (line {})", t.text, t.line_number))
                        .collect();
                    return Err(VaultError::TaskNotFound(format!(
                        "Multiple tasks match '{identifier}': {}",
                        matches.join(", ")
                    )));
                }
            }
        };

        let replacement = format!("{}- [x] {}", target.indent, target.text);
        let new_content = format!(
            "{}{}{}",
            &content[..target.start],
            replacement,
            &content[target.end..]
        );

        Self::atomic_write(&full, &new_content)?;
        tracing::info!(path = %path, task = %target.text, "task completed");

        Ok(TaskInfo {
            path: path.to_string(),
            task_text: target.text,
            completed: true,
            line_number: target.line_number,
        })
    }

    // --- Queries ---

    /// Case-insensitive full-text search. At most one result per file.
    pub fn search_text(
        &self,
        query: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, VaultError> {
        let base = self.resolve(path.unwrap_or(""))?;
        let needle = query.to_lowercase();

        let mut files = Vec::new();
        self.collect_markdown(&base, &mut files);

        let mut results = Vec::new();
        for file in files {
            if results.len() >= limit {
                break;
            }
            let Some(content) = Self::read_opt(&file) else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    let snippet: String = line.trim().chars().take(SNIPPET_MAX).collect();
                    results.push(SearchResult {
                        path: self.rel(&file),
                        title: frontmatter::title(&content, &Self::stem(&file)),
                        snippet,
                        line_number: i + 1,
                    });
                    break;
                }
            }
        }

        tracing::info!(query = %query, count = results.len(), "text search finished");
        Ok(results)
    }

    /// Notes carrying any of the given tags (leading `#` ignored).
    pub fn find_by_tag(
        &self,
        tags: &[String],
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NoteInfo>, VaultError> {
        let base = self.resolve(path.unwrap_or(""))?;
        let wanted: std::collections::HashSet<String> = tags
            .iter()
            .map(|t| t.trim_start_matches('#').to_lowercase())
            .collect();

        let mut files = Vec::new();
        self.collect_markdown(&base, &mut files);

        let mut results = Vec::new();
        for file in files {
            if results.len() >= limit {
                break;
            }
            let Some(content) = Self::read_opt(&file) else {
                continue;
            };
            let note_tags = frontmatter::tags(&content);
            if note_tags.iter().any(|t| wanted.contains(&t.to_lowercase())) {
                results.push(self.note_info(&file));
            }
        }

        tracing::info!(tags = ?tags, count = results.len(), "tag search finished");
        Ok(results)
    }

    /// Find notes by filename or frontmatter title. Exact stem matches come
    /// first, then stem contains, then title matches; each group sorted by
    /// path length, shortest first.
    pub fn find_by_name(
        &self,
        query: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NoteInfo>, VaultError> {
        let base = self.resolve(path.unwrap_or(""))?;
        let query_normalized = normalize_name(query.strip_suffix(".md").unwrap_or(query));

        let mut files = Vec::new();
        self.collect_markdown(&base, &mut files);

        let mut exact = Vec::new();
        let mut contains = Vec::new();
        let mut by_title = Vec::new();

        for file in files {
            let Some(content) = Self::read_opt(&file) else {
                continue;
            };
            let stem_normalized = normalize_name(&Self::stem(&file));
            let info = self.note_info(&file);

            if stem_normalized == query_normalized {
                exact.push(info);
            } else if stem_normalized.contains(&query_normalized) {
                contains.push(info);
            } else {
                let title_normalized =
                    normalize_name(&frontmatter::title(&content, &Self::stem(&file)));
                if title_normalized.contains(&query_normalized) {
                    by_title.push(info);
                }
            }
        }

        for group in [&mut exact, &mut contains, &mut by_title] {
            group.sort_by_key(|n| n.path.len());
        }

        let mut results = exact;
        results.extend(contains);
        results.extend(by_title);
        results.truncate(limit);

        tracing::info!(query = %query, count = results.len(), "name search finished");
        Ok(results)
    }

    /// Notes containing a wikilink to the target note.
    pub fn get_backlinks(
        &self,
        note_path: &str,
        limit: usize,
    ) -> Result<Vec<BacklinkResult>, VaultError> {
        let target = self.resolve(note_path)?;
        if !target.exists() {
            return Err(VaultError::NoteNotFound(note_path.to_string()));
        }
        let note_name = Self::stem(&target);

        let mut files = Vec::new();
        self.collect_markdown(&self.root, &mut files);

        let mut results = Vec::new();
        for file in files {
            if results.len() >= limit {
                break;
            }
            let rel = self.rel(&file);
            if rel == note_path {
                continue;
            }
            let Some(content) = Self::read_opt(&file) else {
                continue;
            };
            if !frontmatter::wikilink_targets(&content).contains(&note_name.as_str()) {
                continue;
            }

            let exact_link = format!("[[{note_name}]]");
            let aliased_link = format!("[[{note_name}|");
            let context = content
                .lines()
                .find(|line| line.contains(&exact_link) || line.contains(&aliased_link))
                .map(|line| line.trim().chars().take(SNIPPET_MAX).collect())
                .unwrap_or_default();

            results.push(BacklinkResult {
                path: rel,
                title: frontmatter::title(&content, &Self::stem(&file)),
                context,
            });
        }

        tracing::info!(note_path = %note_path, count = results.len(), "backlink search finished");
        Ok(results)
    }

    pub fn get_tags(&self) -> Result<Vec<String>, VaultError> {
        let mut files = Vec::new();
        self.collect_markdown(&self.root, &mut files);

        let mut tags = std::collections::BTreeSet::new();
        for file in files {
            if let Some(content) = Self::read_opt(&file) {
                tags.extend(frontmatter::tags(&content));
            }
        }

        tracing::info!(count = tags.len(), "collected tags");
        Ok(tags.into_iter().collect())
    }

    pub fn list_tasks(
        &self,
        path: Option<&str>,
        include_completed: bool,
        limit: usize,
    ) -> Result<Vec<TaskInfo>, VaultError> {
        let base = self.resolve(path.unwrap_or(""))?;

        let mut files = Vec::new();
        self.collect_markdown(&base, &mut files);

        let mut results = Vec::new();
        'outer: for file in files {
            let Some(content) = Self::read_opt(&file) else {
                continue;
            };
            let rel = self.rel(&file);
            for task in frontmatter::tasks(&content) {
                if results.len() >= limit {
                    break 'outer;
                }
                if task.completed && !include_completed {
                    continue;
                }
                results.push(TaskInfo {
                    path: rel.clone(),
                    task_text: task.text,
                    completed: task.completed,
                    line_number: task.line_number,
                });
            }
        }

        tracing::info!(count = results.len(), include_completed, "listed tasks");
        Ok(results)
    }

    // --- Structure ---

    pub fn create_folder(&self, path: &str) -> Result<FolderInfo, VaultError> {
        let full = self.resolve(path)?;
        if full.exists() {
            return Err(VaultError::FolderAlreadyExists(path.to_string()));
        }
        fs::create_dir_all(&full)?;
        tracing::info!(path = %path, "folder created");
        Ok(FolderInfo {
            path: path.to_string(),
            name: full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    pub fn rename(&self, path: &str, new_path: &str) -> Result<VaultItem, VaultError> {
        let full = self.resolve(path)?;
        let full_new = self.resolve(new_path)?;

        if !full.exists() {
            return Err(if path.ends_with(".md") {
                VaultError::NoteNotFound(path.to_string())
            } else {
                VaultError::FolderNotFound(path.to_string())
            });
        }
        if full_new.exists() {
            return Err(if new_path.ends_with(".md") {
                VaultError::NoteAlreadyExists(new_path.to_string())
            } else {
                VaultError::FolderAlreadyExists(new_path.to_string())
            });
        }

        fs::rename(&full, &full_new)?;
        tracing::info!(old_path = %path, new_path = %new_path, "renamed");

        if full_new.is_file() {
            Ok(VaultItem::Note(self.read_note(new_path)?))
        } else {
            Ok(VaultItem::Folder(FolderInfo {
                path: new_path.to_string(),
                name: full_new
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }))
        }
    }

    pub fn delete_folder(&self, path: &str, force: bool) -> Result<(), VaultError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VaultError::FolderNotFound(path.to_string()));
        }
        if !full.is_dir() {
            return Err(VaultError::FolderNotFound(format!(
                "{path} is not a folder; use vault_notes to delete notes"
            )));
        }

        let is_empty = fs::read_dir(&full)?.next().is_none();
        if !is_empty && !force {
            return Err(VaultError::FolderNotEmpty(path.to_string()));
        }

        if is_empty {
            fs::remove_dir(&full)?;
        } else {
            fs::remove_dir_all(&full)?;
        }
        tracing::info!(path = %path, force, "folder deleted");
        Ok(())
    }

    /// Move a note or folder. Destination parents are created as needed.
    pub fn move_item(&self, path: &str, new_path: &str) -> Result<VaultItem, VaultError> {
        let full = self.resolve(path)?;
        let full_new = self.resolve(new_path)?;

        if !full.exists() {
            return Err(if path.ends_with(".md") {
                VaultError::NoteNotFound(path.to_string())
            } else {
                VaultError::FolderNotFound(path.to_string())
            });
        }
        if full_new.exists() {
            return Err(if new_path.ends_with(".md") {
                VaultError::NoteAlreadyExists(new_path.to_string())
            } else {
                VaultError::FolderAlreadyExists(new_path.to_string())
            });
        }

        if let Some(parent) = full_new.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&full, &full_new)?;
        tracing::info!(old_path = %path, new_path = %new_path, "moved");

        if full_new.is_file() {
            Ok(VaultItem::Note(self.read_note(new_path)?))
        } else {
            Ok(VaultItem::Folder(FolderInfo {
                path: new_path.to_string(),
                name: full_new
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }))
        }
    }

    pub fn list_structure(&self, path: Option<&str>) -> Result<Vec<FolderNode>, VaultError> {
        let (full, rel) = match path {
            Some(path) => {
                let full = self.resolve(path)?;
                if !full.exists() {
                    return Err(VaultError::FolderNotFound(path.to_string()));
                }
                (full, path.to_string())
            }
            None => (self.root.clone(), String::new()),
        };
        Ok(self.build_tree(&full, &rel))
    }

    fn build_tree(&self, full: &Path, rel: &str) -> Vec<FolderNode> {
        let Ok(entries) = fs::read_dir(full) else {
            return Vec::new();
        };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        let mut nodes = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_excluded(&name) {
                continue;
            }
            let entry_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };

            if entry.path().is_dir() {
                let children = self.build_tree(&entry.path(), &entry_rel);
                nodes.push(FolderNode {
                    name,
                    path: entry_rel,
                    node_type: NodeType::Folder,
                    children: Some(children),
                });
            } else if name.ends_with(".md") {
                nodes.push(FolderNode {
                    name,
                    path: entry_rel,
                    node_type: NodeType::Note,
                    children: None,
                });
            }
        }
        nodes
    }
}

/// Lowercase, with hyphens and underscores treated as spaces.
fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(['-', '_'], " ")
}
