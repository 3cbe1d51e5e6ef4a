//! Error types for the visual audit pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisualError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install chromium")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {millis} ms waiting for: {what}")]
    Timeout { what: String, millis: u64 },

    #[error("Unexpected browser script output: {0}")]
    ScriptOutput(String),

    #[error("Server at {url} unreachable after {attempts} attempts")]
    ServerUnreachable { url: String, attempts: usize },

    #[error(
        "Image dimensions differ: reference {}x{} vs candidate {}x{}",
        reference.0, reference.1, candidate.0, candidate.1
    )]
    DimensionMismatch {
        reference: (u32, u32),
        candidate: (u32, u32),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type VisualResult<T> = Result<T, VisualError>;
