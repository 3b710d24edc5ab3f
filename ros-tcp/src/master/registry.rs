//! The master's topic and service tables.
//!
//! Every operation takes the single registry lock for its whole duration and
//! hands back owned snapshots, so callers never observe a half-applied
//! registration.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::entity::{PublisherIdentifier, ServiceIdentifier, SlaveIdentifier, SubscriberIdentifier};
use crate::name::GraphName;
use crate::rpc::protocol::{NameNodes, SystemState};

/// Result of a topic registration: the peers on the other side of the topic,
/// and the node evicted if the caller replaced an older node of the same name.
#[derive(Debug, Clone)]
pub struct Registration<T> {
    pub peers: Vec<T>,
    pub replaced: Option<SlaveIdentifier>,
}

#[derive(Debug, Default)]
struct TopicRecord {
    msg_type: Option<String>,
    publishers: Vec<PublisherIdentifier>,
    subscribers: Vec<SubscriberIdentifier>,
}

impl TopicRecord {
    fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty()
    }
}

#[derive(Debug)]
struct ServiceRecord {
    identifier: ServiceIdentifier,
    provider: SlaveIdentifier,
}

#[derive(Debug, Default)]
struct RegistryState {
    topics: BTreeMap<GraphName, TopicRecord>,
    services: BTreeMap<GraphName, ServiceRecord>,
}

impl RegistryState {
    fn find_node(&self, name: &GraphName) -> Option<SlaveIdentifier> {
        let from_topics = self.topics.values().find_map(|record| {
            record
                .publishers
                .iter()
                .map(|p| &p.slave)
                .chain(record.subscribers.iter().map(|s| &s.slave))
                .find(|slave| &slave.name == name)
        });
        from_topics
            .or_else(|| {
                self.services
                    .values()
                    .map(|record| &record.provider)
                    .find(|slave| &slave.name == name)
            })
            .cloned()
    }

    /// Drop everything registered by a node that `slave` replaces, i.e. a
    /// node with the same name but another control URI.
    fn evict_replaced(&mut self, slave: &SlaveIdentifier) -> Option<SlaveIdentifier> {
        let old = self.find_node(&slave.name)?;
        if old.uri == slave.uri {
            return None;
        }

        info!("[MASTER] Node {} replaced: {} -> {}", slave.name, old.uri, slave.uri);
        for record in self.topics.values_mut() {
            record.publishers.retain(|p| p.slave.name != old.name);
            record.subscribers.retain(|s| s.slave.name != old.name);
        }
        self.topics.retain(|_, record| !record.is_empty());
        self.services.retain(|_, record| record.provider.name != old.name);
        Some(old)
    }

    fn topic_entry(&mut self, topic: &GraphName, msg_type: Option<&String>) -> &mut TopicRecord {
        let record = self.topics.entry(topic.clone()).or_default();
        if record.msg_type.is_none() {
            record.msg_type = msg_type.cloned();
        }
        record
    }

    fn prune(&mut self, topic: &GraphName) {
        if self.topics.get(topic).is_some_and(TopicRecord::is_empty) {
            debug!("[MASTER] Topic {} has no endpoints left, removing", topic);
            self.topics.remove(topic);
        }
    }
}

fn upsert<T: PartialEq>(list: &mut Vec<T>, item: T) {
    match list.iter_mut().find(|existing| **existing == item) {
        Some(existing) => *existing = item,
        None => list.push(item),
    }
}

#[derive(Debug, Default)]
pub struct MasterRegistry {
    state: Mutex<RegistryState>,
}

impl MasterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or refresh) `publisher` and return the topic's current subscribers.
    pub fn register_publisher(&self, publisher: PublisherIdentifier) -> Registration<SubscriberIdentifier> {
        let mut state = self.state.lock();
        let replaced = state.evict_replaced(&publisher.slave);
        let record = state.topic_entry(publisher.topic_name(), publisher.msg_type.as_ref());
        upsert(&mut record.publishers, publisher);
        Registration {
            peers: record.subscribers.clone(),
            replaced,
        }
    }

    /// Add (or refresh) `subscriber` and return the topic's current publishers.
    pub fn register_subscriber(&self, subscriber: SubscriberIdentifier) -> Registration<PublisherIdentifier> {
        let mut state = self.state.lock();
        let replaced = state.evict_replaced(&subscriber.slave);
        let record = state.topic_entry(subscriber.topic_name(), subscriber.msg_type.as_ref());
        upsert(&mut record.subscribers, subscriber);
        Registration {
            peers: record.publishers.clone(),
            replaced,
        }
    }

    /// Remove `publisher` if it is registered under the same control URI.
    pub fn unregister_publisher(&self, publisher: &PublisherIdentifier) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.topics.get_mut(publisher.topic_name()) else {
            return false;
        };
        let before = record.publishers.len();
        record
            .publishers
            .retain(|p| !(p == publisher && p.slave.uri == publisher.slave.uri));
        let removed = record.publishers.len() != before;
        state.prune(publisher.topic_name());
        removed
    }

    /// Remove `subscriber` if it is registered under the same control URI.
    pub fn unregister_subscriber(&self, subscriber: &SubscriberIdentifier) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.topics.get_mut(subscriber.topic_name()) else {
            return false;
        };
        let before = record.subscribers.len();
        record
            .subscribers
            .retain(|s| !(s == subscriber && s.slave.uri == subscriber.slave.uri));
        let removed = record.subscribers.len() != before;
        state.prune(subscriber.topic_name());
        removed
    }

    /// Record `service` as provided by `provider`, overwriting any previous
    /// provider. Returns the node evicted by a name collision, if any.
    pub fn register_service(
        &self,
        service: ServiceIdentifier,
        provider: SlaveIdentifier,
    ) -> Option<SlaveIdentifier> {
        let mut state = self.state.lock();
        let replaced = state.evict_replaced(&provider);
        if let Some(previous) = state.services.get(&service.name) {
            if previous.identifier.uri != service.uri {
                debug!(
                    "[MASTER] Service {} moves from {} to {}",
                    service.name, previous.identifier.uri, service.uri
                );
            }
        }
        state.services.insert(
            service.name.clone(),
            ServiceRecord {
                identifier: service,
                provider,
            },
        );
        replaced
    }

    /// Remove the service only if it is still served from `service.uri`.
    pub fn unregister_service(&self, service: &ServiceIdentifier) -> bool {
        let mut state = self.state.lock();
        let current = state.services.get(&service.name).map(|r| r.identifier.uri.clone());
        match current {
            Some(uri) if uri == service.uri => {
                state.services.remove(&service.name);
                true
            }
            Some(uri) => {
                debug!(
                    "[MASTER] Ignoring stale unregister of {} at {} (now at {})",
                    service.name, service.uri, uri
                );
                false
            }
            None => false,
        }
    }

    pub fn lookup_service(&self, name: &GraphName) -> Option<ServiceIdentifier> {
        self.state.lock().services.get(name).map(|r| r.identifier.clone())
    }

    pub fn lookup_node(&self, name: &GraphName) -> Option<SlaveIdentifier> {
        self.state.lock().find_node(name)
    }

    /// `(topic, type)` of every topic with at least one publisher inside
    /// `subgraph`. An empty or root subgraph matches everything.
    pub fn published_topics(&self, subgraph: &GraphName) -> Vec<(GraphName, String)> {
        let state = self.state.lock();
        state
            .topics
            .iter()
            .filter(|(name, record)| !record.publishers.is_empty() && name.is_within(subgraph))
            .map(|(name, record)| (name.clone(), type_or_wildcard(record)))
            .collect()
    }

    /// `(topic, type)` of every known topic.
    pub fn topic_types(&self) -> Vec<(GraphName, String)> {
        let state = self.state.lock();
        state
            .topics
            .iter()
            .map(|(name, record)| (name.clone(), type_or_wildcard(record)))
            .collect()
    }

    pub fn publishers(&self, topic: &GraphName) -> Vec<PublisherIdentifier> {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .map(|r| r.publishers.clone())
            .unwrap_or_default()
    }

    pub fn subscribers(&self, topic: &GraphName) -> Vec<SubscriberIdentifier> {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .map(|r| r.subscribers.clone())
            .unwrap_or_default()
    }

    pub fn system_state(&self) -> SystemState {
        let state = self.state.lock();
        let mut publishers: NameNodes = Vec::new();
        let mut subscribers: NameNodes = Vec::new();
        for (name, record) in &state.topics {
            if !record.publishers.is_empty() {
                publishers.push((
                    name.to_string(),
                    record.publishers.iter().map(|p| p.node_name().to_string()).collect(),
                ));
            }
            if !record.subscribers.is_empty() {
                subscribers.push((
                    name.to_string(),
                    record.subscribers.iter().map(|s| s.node_name().to_string()).collect(),
                ));
            }
        }
        let services = state
            .services
            .iter()
            .map(|(name, record)| (name.to_string(), vec![record.provider.name.to_string()]))
            .collect();
        SystemState {
            publishers,
            subscribers,
            services,
        }
    }
}

fn type_or_wildcard(record: &TopicRecord) -> String {
    record.msg_type.clone().unwrap_or_else(|| "*".to_string())
}
