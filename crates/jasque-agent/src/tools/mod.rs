//! Built-in vault tools exposed to the model.

mod notes;
mod query;
mod structure;

pub use notes::VaultNotesTool;
pub use query::VaultQueryTool;
pub use structure::VaultStructureTool;

use std::sync::Arc;

use jasque_core::tools::Tool;
use jasque_vault::Vault;

use crate::registry::ToolRegistry;

/// Registry with all built-in vault tools registered.
pub fn builtin_registry(vault: Arc<Vault>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(VaultQueryTool::new(Arc::clone(&vault))) as Arc<dyn Tool>);
    registry.register(Arc::new(VaultNotesTool::new(Arc::clone(&vault))) as Arc<dyn Tool>);
    registry.register(Arc::new(VaultStructureTool::new(vault)) as Arc<dyn Tool>);
    registry
}
