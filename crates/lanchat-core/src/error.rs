use thiserror::Error;

/// A user command that could not be carried out.
///
/// Carries only a description that is safe to show in the chat.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors produced by the engine outside of user commands.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Settings file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON.
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Invalid nick name: '{0}'")]
    InvalidNick(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
