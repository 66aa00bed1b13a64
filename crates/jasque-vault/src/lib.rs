pub mod error;
pub mod frontmatter;
pub mod preferences;
pub mod types;
pub mod vault;

pub use error::VaultError;
pub use preferences::{UserPreferences, VaultPreferences};
pub use types::{
    BacklinkResult, FolderInfo, FolderNode, NodeType, NoteContent, NoteInfo, SearchResult,
    TaskInfo,
};
pub use vault::Vault;
