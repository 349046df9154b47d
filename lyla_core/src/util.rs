//! Shared constants and small string helpers.

/// Default system instruction sent ahead of every conversation turn.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Lyla, a helpful and friendly conversational assistant. \
Give clear, relevant and concise answers. Be respectful, and when the user asks for advice, answer with empathy.";

/// Default chat model for the Groq-compatible backend.
pub const DEFAULT_MODEL: &str = "gemma2-9b-it";

/// Chat models offered by the Groq backend.
pub const CHAT_MODELS: &[&str] = &[
    "gemma2-9b-it",
    "llama-3.1-8b-instant",
    "llama-3.1-70b-versatile",
    "mixtral-8x7b-32768",
    "gemma-7b-it",
];

/// Diffusion models reachable through the Hugging Face Inference API,
/// as `(display name, model id)`. The first entry is the default.
pub const IMAGE_MODELS: &[(&str, &str)] = &[
    ("Stable Diffusion v1.5", "runwayml/stable-diffusion-v1-5"),
    ("FLUX.1", "black-forest-labs/FLUX.1-schnell"),
    ("Anime Pfp", "alvdansen/phantasma-anime"),
];

/// Mask a secret for display, keeping four characters at each end.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        "(not set)".to_string()
    } else if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}
