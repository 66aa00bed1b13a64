pub mod completions;
pub mod config;
pub mod history;
pub mod openai;
pub mod server;
pub mod transcode;

pub use config::ServerConfig;
pub use server::{start, start_with_provider, AppState, ServerHandle};
