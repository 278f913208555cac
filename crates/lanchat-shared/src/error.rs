use thiserror::Error;

/// Reasons a received line is rejected by the wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing frame delimiters (expected <code>!<TYPE>#<nick>:<payload>)")]
    MissingFraming,

    #[error("Invalid sender code: '{0}'")]
    InvalidCode(String),

    #[error("Unknown message type: '{0}'")]
    UnknownType(String),

    #[error("Missing field '{0}' in payload")]
    MissingField(&'static str),

    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidField { field: &'static str, value: String },
}
