//! Control-plane wire protocol.
//!
//! Requests and responses are JSON documents behind a length prefix:
//! ```text
//! +----------------+-------------------+
//! | Length (4B LE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//! A request is an object tagged by `method` with its arguments in `params`.
//! A response is the array `[statusCode, message, payload]`.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

/// Three-valued status carried by every control-plane response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum StatusCode {
    /// The caller misused the API (bad arguments, bad names).
    #[strum(serialize = "error")]
    Error,
    /// A well-formed request that could not be satisfied.
    #[strum(serialize = "failure")]
    Failure,
    #[strum(serialize = "success")]
    Success,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        match self {
            StatusCode::Error => -1,
            StatusCode::Failure => 0,
            StatusCode::Success => 1,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(StatusCode::Error),
            0 => Some(StatusCode::Failure),
            1 => Some(StatusCode::Success),
            _ => None,
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        StatusCode::from_i32(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid status code {}", value)))
    }
}

/// `(statusCode, message, payload)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse(pub StatusCode, pub String, pub Value);

impl RpcResponse {
    pub fn success<M: Into<String>, P: Serialize>(message: M, payload: P) -> Self {
        match serde_json::to_value(payload) {
            Ok(payload) => Self(StatusCode::Success, message.into(), payload),
            Err(e) => Self::error(format!("failed to encode payload: {}", e)),
        }
    }

    pub fn failure<M: Into<String>>(message: M) -> Self {
        Self(StatusCode::Failure, message.into(), Value::from(0))
    }

    pub fn error<M: Into<String>>(message: M) -> Self {
        Self(StatusCode::Error, message.into(), Value::from(0))
    }

    pub fn from_error(err: &Error) -> Self {
        Self(err.status_code(), err.to_string(), Value::from(0))
    }

    pub fn code(&self) -> StatusCode {
        self.0
    }

    pub fn message(&self) -> &str {
        &self.1
    }

    pub fn payload(&self) -> &Value {
        &self.2
    }

    /// Decode the payload of a successful response, or turn a non-success
    /// status into [`Error::Remote`].
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        match self.0 {
            StatusCode::Success => Ok(serde_json::from_value(self.2)?),
            code => Err(Error::Remote {
                code,
                message: self.1,
            }),
        }
    }
}

/// Calls served by the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
#[strum(serialize_all = "camelCase")]
pub enum MasterRequest {
    RegisterPublisher {
        caller_id: String,
        topic: String,
        topic_type: String,
        caller_api: String,
    },
    UnregisterPublisher {
        caller_id: String,
        topic: String,
        caller_api: String,
    },
    RegisterSubscriber {
        caller_id: String,
        topic: String,
        topic_type: String,
        caller_api: String,
    },
    UnregisterSubscriber {
        caller_id: String,
        topic: String,
        caller_api: String,
    },
    RegisterService {
        caller_id: String,
        service: String,
        service_api: String,
        caller_api: String,
    },
    UnregisterService {
        caller_id: String,
        service: String,
        service_api: String,
    },
    LookupNode {
        caller_id: String,
        node_name: String,
    },
    LookupService {
        caller_id: String,
        service: String,
    },
    GetPublishedTopics {
        caller_id: String,
        subgraph: String,
    },
    GetTopicTypes {
        caller_id: String,
    },
    GetSystemState {
        caller_id: String,
    },
    GetUri {
        caller_id: String,
    },
}

impl MasterRequest {
    pub fn method(&self) -> &'static str {
        self.into()
    }
}

/// Calls served by every node's slave endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
#[strum(serialize_all = "camelCase")]
pub enum SlaveRequest {
    RequestTopic {
        caller_id: String,
        topic: String,
        protocols: Vec<String>,
    },
    PublisherUpdate {
        caller_id: String,
        topic: String,
        publishers: Vec<String>,
    },
    ParamUpdate {
        caller_id: String,
        key: String,
        value: Value,
    },
    GetBusStats {
        caller_id: String,
    },
    GetBusInfo {
        caller_id: String,
    },
    GetMasterUri {
        caller_id: String,
    },
    GetPid {
        caller_id: String,
    },
    GetSubscriptions {
        caller_id: String,
    },
    GetPublications {
        caller_id: String,
    },
    Shutdown {
        caller_id: String,
        message: String,
    },
}

impl SlaveRequest {
    pub fn method(&self) -> &'static str {
        self.into()
    }
}

pub const TCPROS: &str = "TCPROS";

/// Answer to `requestTopic`, encoded as `[protocol, host, port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, u16)", into = "(String, String, u16)")]
pub struct ProtocolDescription {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl From<(String, String, u16)> for ProtocolDescription {
    fn from((protocol, host, port): (String, String, u16)) -> Self {
        Self {
            protocol,
            host,
            port,
        }
    }
}

impl From<ProtocolDescription> for (String, String, u16) {
    fn from(value: ProtocolDescription) -> Self {
        (value.protocol, value.host, value.port)
    }
}

/// `[name, [node, ...]]` rows of the system state.
pub type NameNodes = Vec<(String, Vec<String>)>;

/// `[name, type]` rows.
pub type NameType = Vec<(String, String)>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub publishers: NameNodes,
    pub subscribers: NameNodes,
    pub services: NameNodes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub connection_id: usize,
    pub bytes: u64,
    pub messages: u64,
    pub dropped: u64,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub topic: String,
    pub connections: Vec<ConnectionStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub publish: Vec<TopicStats>,
    pub subscribe: Vec<TopicStats>,
}

/// One row of `getBusInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusInfo {
    pub connection_id: usize,
    pub destination: String,
    /// `"o"` for outbound (publishing), `"i"` for inbound.
    pub direction: String,
    pub transport: String,
    pub topic: String,
    pub connected: bool,
}
