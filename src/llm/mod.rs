// LLM abstraction layer

pub mod gateway;
pub mod google;
pub mod groq;
pub mod openai;
pub mod openrouter;
pub mod provider;

pub use gateway::{GenerationError, GenerationOptions, LlmGateway, TextGenerator, TextStream};
pub use provider::*;
pub use crate::types::*;
