use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopilotError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CopilotError>;
