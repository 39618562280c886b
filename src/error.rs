//! A dedicated error type for everything that can go wrong around the socket and
//! logger layers. Bounds violations and malformed input inside the wire codec are
//! *not* represented here: they are expected outcomes of adversarial or partial
//! input and show up as `None`/`false`/a reduced count, never as an `Err`.
use std::io;
use std::str;

#[derive(Debug)]
pub enum MdnsError {
    Io(io::Error),
    FromUtf8(std::string::FromUtf8Error),
    Utf8(str::Utf8Error),
    LoggerError(log::SetLoggerError),
    Mdns(String),
}

impl MdnsError {
    pub fn new(s: &str) -> Self {
        MdnsError::Mdns(String::from(s))
    }
}

/// A specific custom `Result` for all fallible functions in this crate.
pub type MdnsResult<T> = Result<T, MdnsError>;

impl From<io::Error> for MdnsError {
    fn from(err: io::Error) -> Self {
        MdnsError::Io(err)
    }
}

impl From<String> for MdnsError {
    fn from(err: String) -> Self {
        MdnsError::Mdns(err)
    }
}

impl From<std::string::FromUtf8Error> for MdnsError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        MdnsError::FromUtf8(err)
    }
}

impl From<str::Utf8Error> for MdnsError {
    fn from(err: str::Utf8Error) -> Self {
        MdnsError::Utf8(err)
    }
}

impl From<log::SetLoggerError> for MdnsError {
    fn from(err: log::SetLoggerError) -> Self {
        MdnsError::LoggerError(err)
    }
}

impl std::fmt::Display for MdnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MdnsError::Io(e) => write!(f, "I/O error: {}", e),
            MdnsError::FromUtf8(e) => write!(f, "invalid UTF-8: {}", e),
            MdnsError::Utf8(e) => write!(f, "invalid UTF-8: {}", e),
            MdnsError::LoggerError(e) => write!(f, "logger setup failed: {}", e),
            MdnsError::Mdns(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for MdnsError {}
