//! Agent runtime: model providers, vault tools, and the run loop that
//! drives a prompt through model turns and tool execution.

pub mod mock;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod runner;
pub mod tools;

pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiProvider;
pub use registry::ToolRegistry;
pub use runner::{AgentRunner, RunnerConfig};
