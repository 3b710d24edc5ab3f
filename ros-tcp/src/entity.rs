use std::fmt::Display;
use std::hash::{Hash, Hasher};

use url::Url;

use crate::name::GraphName;

/// Message or service type name plus its md5sum, as exchanged in
/// connection headers.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub md5sum: String,
}

impl TypeInfo {
    pub fn new(name: &str, md5sum: &str) -> Self {
        Self {
            name: name.to_string(),
            md5sum: md5sum.to_string(),
        }
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.name, self.md5sum)
    }
}

/// A node as addressed on the control plane. Equality is by name only.
#[derive(Debug, Clone)]
pub struct SlaveIdentifier {
    pub name: GraphName,
    pub uri: Url,
}

impl SlaveIdentifier {
    pub fn new(name: GraphName, uri: Url) -> Self {
        Self { name, uri }
    }
}

impl PartialEq for SlaveIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SlaveIdentifier {}

impl Hash for SlaveIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for SlaveIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicIdentifier {
    pub name: GraphName,
}

impl TopicIdentifier {
    pub fn new(name: GraphName) -> Self {
        Self { name }
    }
}

/// A registered service: its name and the `rosrpc://` address serving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentifier {
    pub name: GraphName,
    pub uri: Url,
}

impl ServiceIdentifier {
    pub fn new(name: GraphName, uri: Url) -> Self {
        Self { name, uri }
    }
}

macro_rules! topic_endpoint {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            pub slave: SlaveIdentifier,
            pub topic: TopicIdentifier,
            pub msg_type: Option<String>,
        }

        impl $ty {
            pub fn new(slave: SlaveIdentifier, topic: TopicIdentifier) -> Self {
                Self {
                    slave,
                    topic,
                    msg_type: None,
                }
            }

            pub fn with_type<S: Into<String>>(mut self, msg_type: S) -> Self {
                self.msg_type = Some(msg_type.into());
                self
            }

            pub fn node_name(&self) -> &GraphName {
                &self.slave.name
            }

            pub fn topic_name(&self) -> &GraphName {
                &self.topic.name
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.slave.name == other.slave.name && self.topic.name == other.topic.name
            }
        }

        impl Eq for $ty {}

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.slave.name.hash(state);
                self.topic.name.hash(state);
            }
        }
    };
}

topic_endpoint!(
    /// A node publishing a topic. Equality is by (node name, topic name).
    PublisherIdentifier
);
topic_endpoint!(
    /// A node subscribed to a topic. Equality is by (node name, topic name).
    SubscriberIdentifier
);
