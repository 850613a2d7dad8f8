use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum CascadeError {
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Event listener aborted replay: {0}")]
    Listener(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Invalid propagation sequence for item {item}: {reason}")]
    Propagation { item: usize, reason: String },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CascadeError {
    fn from(src: toml::de::Error) -> CascadeError {
        CascadeError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for CascadeError {
    fn from(src: toml::ser::Error) -> CascadeError {
        CascadeError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<bincode::Error> for CascadeError {
    fn from(src: bincode::Error) -> CascadeError {
        CascadeError::Serialization(format!("Bincode (de)serialization error: {src}"))
    }
}

impl From<io::Error> for CascadeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => CascadeError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => CascadeError::PermissionDenied,
            _ => CascadeError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for CascadeError {
    fn from(x: fmt::Error) -> Self {
        CascadeError::Codec(format!("{x}"))
    }
}
