pub mod agent;
pub mod bias;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod splitter;
pub mod store;
pub mod types;
pub mod validate;

pub use error::PipelineError;
pub use llm::{Embedder, Generator, HashEmbedder};
pub use pipeline::LegalAssistant;
pub use types::*;
