pub mod errors;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod run;
pub mod stream;
pub mod tools;
pub mod usage;

pub use errors::AgentError;
pub use run::{EventStream, ExecutionNode, NodeStream, RunEvent};
pub use stream::{PartKind, StreamEvent};
pub use usage::UsageTally;
