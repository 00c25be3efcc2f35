pub mod client;
pub mod error;
pub mod types;

pub use client::{GenAiClient, StubGenerator, TextGenerator};
pub use error::GenAiError;
pub use types::{GenerateRequest, GenerateResponse, Usage};
