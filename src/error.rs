use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid category pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Pagination exhausted after {pages} full pages ({rows} rows)")]
    PaginationExhausted { pages: u32, rows: usize },

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, AttributionError>;
