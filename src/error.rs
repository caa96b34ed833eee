//! Error types for the Tailing Sidecar Operator

use std::fmt;

use crate::adapters::annotation::AnnotationParseError;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug)]
pub enum Error {
    /// Kubernetes API error
    KubeError(String),
    /// Configuration error
    ConfigError(String),
    /// The admitted object could not be decoded into a Pod
    DecodeError(String),
    /// The mutated Pod or its patch could not be serialized
    SerializationError(String),
    /// Malformed entry in the tailing-sidecar annotation
    AnnotationError(AnnotationParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KubeError(msg) => write!(f, "Kubernetes API error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::AnnotationError(e) => write!(f, "Annotation error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<AnnotationParseError> for Error {
    fn from(err: AnnotationParseError) -> Self {
        Error::AnnotationError(err)
    }
}
