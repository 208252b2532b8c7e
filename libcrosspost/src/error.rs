//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidRequest(_) => 3,
            CrosspostError::Service(ServiceError::Authentication(_)) => 2,
            CrosspostError::Service(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Image(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image cannot be reduced to fit: {bytes} bytes exceeds the {budget} byte budget")]
    TooLarge { bytes: usize, budget: usize },
}

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}
