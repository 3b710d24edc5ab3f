use std::time::Duration;

use crate::name::NameError;
use crate::rpc::protocol::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    #[error("no such topic: {0}")]
    NoSuchTopic(String),

    #[error("no such service: {0}")]
    NoSuchService(String),

    #[error("no supported protocol in {0:?}")]
    NoSupportedProtocol(Vec<String>),

    #[error("checksum mismatch on {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("remote {code}: {message}")]
    Remote { code: StatusCode, message: String },

    #[error("master unreachable at {uri}: {reason}")]
    MasterUnreachable { uri: String, reason: String },

    #[error("{0} is already registered by this node")]
    AlreadyRegistered(String),

    #[error("{0} was built with a callback and has no queue")]
    NoQueue(String),

    #[error("service call failed: {0}")]
    ServiceFailed(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("serialization: {0}")]
    Serialization(#[from] ros_tcp_ser::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status code a control-plane handler answers with when it fails with
    /// this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoSuchTopic(_)
            | Error::NoSuchService(_)
            | Error::NoSupportedProtocol(_)
            | Error::Timeout { .. }
            | Error::MasterUnreachable { .. }
            | Error::Io(_)
            | Error::Closed => StatusCode::Failure,
            Error::Remote { code, .. } => *code,
            _ => StatusCode::Error,
        }
    }

    pub(crate) fn timeout<S: Into<String>>(operation: S, timeout: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::InvalidUri(value.to_string())
    }
}
