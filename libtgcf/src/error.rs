//! Error types for TGCF

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TgcfError>;

#[derive(Error, Debug)]
pub enum TgcfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TgcfError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TgcfError::InvalidInput(_) => 3,
            TgcfError::Config(_) => 2,
            TgcfError::Database(_) => 2,
            TgcfError::Chat(_) => 1,
        }
    }

    /// Whether the failed operation may succeed if tried again next cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            TgcfError::Chat(chat_error) => chat_error.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone)]
pub enum ChatError {
    #[error("Failed to fetch history: {0}")]
    Fetch(String),

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Unknown chat: {0}")]
    UnknownChat(i64),
}

impl ChatError {
    /// Fetch, network and rate-limit failures are transient; the rest need
    /// operator attention.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Fetch(_) | ChatError::Network(_) | ChatError::RateLimit(_) => true,
            ChatError::Send(_) | ChatError::Authentication(_) | ChatError::UnknownChat(_) => {
                false
            }
        }
    }
}
