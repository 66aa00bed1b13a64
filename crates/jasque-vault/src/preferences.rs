use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::frontmatter;
use crate::vault::{Vault, RESERVED_FOLDER};

/// Default folder locations for different note types.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultFolders {
    pub meeting_notes: Option<String>,
    pub daily_notes: Option<String>,
    pub projects: Option<String>,
}

/// Preferences for how Jasque responds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseStyle {
    pub verbosity: String,
    pub use_bullet_points: bool,
    pub include_timestamps: bool,
}

impl Default for ResponseStyle {
    fn default() -> Self {
        Self {
            verbosity: "concise".to_string(),
            use_bullet_points: true,
            include_timestamps: false,
        }
    }
}

/// Structured preferences parsed from the YAML frontmatter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub date_format: String,
    pub time_format: String,
    pub default_folders: DefaultFolders,
    pub response_style: ResponseStyle,
    pub search_exclude_folders: Vec<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            date_format: "YYYY-MM-DD".to_string(),
            time_format: "HH:mm".to_string(),
            default_folders: DefaultFolders::default(),
            response_style: ResponseStyle::default(),
            search_exclude_folders: vec!["copilot".to_string()],
        }
    }
}

/// Complete preferences: structured frontmatter plus the free-form body.
#[derive(Clone, Debug, Default)]
pub struct VaultPreferences {
    pub structured: UserPreferences,
    pub additional_context: String,
}

impl VaultPreferences {
    /// Format preferences as a context block for the agent prompt.
    pub fn format_for_agent(&self) -> String {
        let mut lines: Vec<String> = vec!["## User Preferences".to_string(), String::new()];

        let s = &self.structured;
        lines.push(format!("- Date format: {}", s.date_format));
        lines.push(format!("- Time format: {}", s.time_format));

        if let Some(folder) = &s.default_folders.meeting_notes {
            lines.push(format!("- Meeting notes folder: {folder}"));
        }
        if let Some(folder) = &s.default_folders.daily_notes {
            lines.push(format!("- Daily notes folder: {folder}"));
        }
        if let Some(folder) = &s.default_folders.projects {
            lines.push(format!("- Projects folder: {folder}"));
        }

        lines.push(format!("- Response verbosity: {}", s.response_style.verbosity));
        if s.response_style.use_bullet_points {
            lines.push("- Prefer bullet points in responses".to_string());
        }
        if s.response_style.include_timestamps {
            lines.push("- Include timestamps in responses".to_string());
        }

        let context = self.additional_context.trim();
        if !context.is_empty() {
            lines.push(String::new());
            lines.push("## Additional User Context".to_string());
            lines.push(String::new());
            lines.push(context.to_string());
        }

        lines.join("\n")
    }
}

/// Template written on first load when the reserved folder already exists.
pub const PREFERENCES_TEMPLATE: &str = r#"---
# Jasque User Preferences
# Edit this file to customize how Jasque behaves

# Date/time formatting preferences
date_format: "YYYY-MM-DD"
time_format: "HH:mm"

# Default locations for different note types
default_folders:
  meeting_notes: "Meetings/"
  daily_notes: "Daily/"
  projects: "Projects/"

# Response style preferences
response_style:
  verbosity: "concise"  # concise | detailed
  use_bullet_points: true
  include_timestamps: false

# Folders to exclude from search results (default: ["copilot"])
# The _jasque folder is always excluded automatically
search_exclude_folders:
  - copilot
  # - templates  # Uncomment to also exclude templates folder
---

## Additional Context

Any free-form notes you want Jasque to know about. For example:

- I use the PARA method for organizing my vault
- Meeting notes should always include attendees and action items
- I prefer tasks formatted as `- [ ] task @due(date)`
"#;

impl Vault {
    /// Load user preferences from `_jasque/preferences.md`.
    ///
    /// If the file is missing but the reserved folder exists, the template
    /// is written and `None` is returned. Malformed YAML is a
    /// `PreferencesParse` error; an unexpected but well-formed schema falls
    /// back to defaults with a warning.
    pub fn load_preferences(&self) -> Result<Option<VaultPreferences>, VaultError> {
        let folder = self.root().join(RESERVED_FOLDER);
        let path = folder.join("preferences.md");

        if !path.exists() {
            if folder.exists() {
                std::fs::write(&path, PREFERENCES_TEMPLATE)?;
                tracing::info!(path = "_jasque/preferences.md", "preferences template created");
            } else {
                tracing::warn!(path = "_jasque/preferences.md", "preferences not found");
            }
            return Ok(None);
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "preferences read failed");
                return Ok(None);
            }
        };

        let (metadata, body) = match frontmatter::parse(&content) {
            Ok(parsed) => parsed,
            Err(message) => return Err(VaultError::PreferencesParse(message)),
        };

        let structured = match serde_json::from_value::<UserPreferences>(metadata) {
            Ok(structured) => structured,
            Err(e) => {
                tracing::warn!(error = %e, "preferences validation failed, using defaults");
                UserPreferences::default()
            }
        };

        tracing::info!("preferences loaded");
        Ok(Some(VaultPreferences {
            structured,
            additional_context: body.to_string(),
        }))
    }
}
