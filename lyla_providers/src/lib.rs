//! Hosted inference backends: Groq chat completions and Hugging Face image generation.

mod groq;
mod huggingface;

pub use groq::GroqProvider;
pub use huggingface::HuggingFaceImageProvider;
