use std::fmt;

/// Failure classes surfaced by the membership core.
///
/// `Network` and `Protocol` describe a single exchange with a peer. `Storage`
/// and `Closed` leave the process unable to keep its guarantees and always end
/// in termination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Network(String),
    Storage(String),
    Protocol(String),
    Closed(&'static str),
    Config(String),
}

impl Error {
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(details) => write!(f, "network error -> {}", details),
            Error::Storage(details) => write!(f, "storage error -> {}", details),
            Error::Protocol(details) => write!(f, "protocol error -> {}", details),
            Error::Closed(component) => write!(f, "{} is no longer running", component),
            Error::Config(details) => write!(f, "invalid configuration -> {}", details),
        }
    }
}

impl std::error::Error for Error {}

impl From<flexbuffers::SerializationError> for Error {
    fn from(error: flexbuffers::SerializationError) -> Self {
        Error::Protocol(error.to_string())
    }
}

impl From<flexbuffers::DeserializationError> for Error {
    fn from(error: flexbuffers::DeserializationError) -> Self {
        Error::Protocol(error.to_string())
    }
}
