use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum ChatRelayError {
    // Connection errors
    ConnectionError(String),
    ConnectionClosed,

    // Wire format errors
    FrameTooShort(usize),
    FrameTooLarge(usize),
    MalformedPayload(String),

    // Configuration errors
    ConfigError(String),

    // System errors
    LockPoisoned(String),
    SystemError(String),
}

impl fmt::Display for ChatRelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::FrameTooShort(len) => write!(f, "Frame too short: {} bytes", len),
            Self::FrameTooLarge(len) => write!(f, "Frame too large: {} bytes", len),
            Self::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::LockPoisoned(msg) => write!(f, "Lock poisoned: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl Error for ChatRelayError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for ChatRelayError {
    fn from(err: PoisonError<T>) -> Self {
        ChatRelayError::LockPoisoned(format!("Mutex poisoned: {}", err))
    }
}

impl From<std::io::Error> for ChatRelayError {
    fn from(err: std::io::Error) -> Self {
        ChatRelayError::ConnectionError(err.to_string())
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, ChatRelayError>;
