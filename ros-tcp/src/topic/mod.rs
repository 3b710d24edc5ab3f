//! Untyped topic endpoints owned by a node: publications fan serialized
//! payloads out to subscriber connections, subscriptions pull them from
//! publisher connections.

pub mod publication;
pub mod subscription;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::entity::TypeInfo;
use crate::name::GraphName;
use crate::rpc::protocol::ConnectionStats;

pub use publication::Publication;
pub use subscription::Subscription;

/// Resolved topic name plus the type information exchanged in headers.
#[derive(Debug, Clone)]
pub struct TopicDescriptor {
    pub name: GraphName,
    pub type_info: TypeInfo,
    pub definition: String,
}

impl TopicDescriptor {
    pub fn new(name: GraphName, type_info: TypeInfo, definition: impl Into<String>) -> Self {
        Self {
            name,
            type_info,
            definition: definition.into(),
        }
    }
}

/// Per-connection counters.
#[derive(Debug)]
pub(crate) struct LinkStats {
    bytes: AtomicU64,
    messages: AtomicU64,
    dropped: AtomicU64,
    connected: AtomicBool,
}

impl LinkStats {
    pub(crate) fn new() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    pub(crate) fn record(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self, connection_id: usize) -> ConnectionStats {
        ConnectionStats {
            connection_id,
            bytes: self.bytes.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            connected: self.is_connected(),
        }
    }
}
