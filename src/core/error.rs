use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// User input was rejected before any side effect happened.
    Validation(String),
    /// The requested operation is invalid in the current round phase.
    InvalidState(String),
    /// A configuration error occurred.
    Config(String),
    /// The result store failed (connection, schema, insert or query).
    Persistence(String),
    /// The completions endpoint could not be reached or answered with a failure status.
    Transport(String),
    /// The completions endpoint answered, but not in the expected shape.
    MalformedResponse(String),
    /// A generic system or unknown error.
    System(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::InvalidState(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Validation error: {msg}"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            Error::Transport(msg) => write!(f, "API error: {msg}"),
            Error::MalformedResponse(msg) => {
                write!(f, "Could not process API response: {msg}")
            }
            Error::System(msg) => write!(f, "System error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
