use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::DataHandler;
use crate::name::GraphName;
use crate::service::provider::ServiceProvider;
use crate::topic::{Publication, Subscription, TopicDescriptor};
use crate::{Error, Result};

#[derive(Default)]
struct Endpoints {
    publications: BTreeMap<GraphName, Arc<Publication>>,
    subscriptions: BTreeMap<GraphName, Arc<Subscription>>,
    services: BTreeMap<GraphName, Arc<ServiceProvider>>,
}

/// Everything a node publishes, subscribes to and serves, keyed by resolved
/// name. Shared by the slave endpoint and the TCPROS listener.
///
/// Handles on one topic share a single publication or subscription. Adding
/// and releasing a handle happen under the table lock, so a topic is only
/// ever removed once its last handle is gone.
#[derive(Default)]
pub struct EndpointTable {
    inner: Mutex<Endpoints>,
}

/// Everything removed by [`EndpointTable::drain`].
pub(crate) struct Drained {
    pub(crate) publications: Vec<Arc<Publication>>,
    pub(crate) subscriptions: Vec<Arc<Subscription>>,
    pub(crate) services: Vec<Arc<ServiceProvider>>,
}

/// Result of attaching a handle to a topic endpoint.
pub(crate) struct Attached<T> {
    pub(crate) endpoint: Arc<T>,
    /// The endpoint was created by this call and still has to be
    /// registered with the master.
    pub(crate) created: bool,
}

fn check_md5sum(existing: &TopicDescriptor, md5sum: &str) -> Result<()> {
    if existing.type_info.md5sum != md5sum {
        return Err(Error::ChecksumMismatch {
            name: existing.name.to_string(),
            expected: existing.type_info.md5sum.clone(),
            actual: md5sum.to_string(),
        });
    }
    Ok(())
}

macro_rules! endpoint_accessors {
    ($field:ident, $ty:ty, $get:ident, $remove:ident, $all:ident) => {
        pub fn $get(&self, name: &GraphName) -> Option<Arc<$ty>> {
            self.inner.lock().$field.get(name).cloned()
        }

        /// Remove the entry for `name` only if it is `endpoint`.
        pub(crate) fn $remove(&self, name: &GraphName, endpoint: &Arc<$ty>) -> bool {
            let mut inner = self.inner.lock();
            let matches = inner.$field.get(name).is_some_and(|current| Arc::ptr_eq(current, endpoint));
            if matches {
                inner.$field.remove(name);
            }
            matches
        }

        pub fn $all(&self) -> Vec<Arc<$ty>> {
            self.inner.lock().$field.values().cloned().collect()
        }
    };
}

impl EndpointTable {
    endpoint_accessors!(publications, Publication, publication, remove_publication, publications);
    endpoint_accessors!(subscriptions, Subscription, subscription, remove_subscription, subscriptions);
    endpoint_accessors!(services, ServiceProvider, service, remove_service, services);

    /// Add a handle to the publication of `name`, creating it with `create`
    /// when there is none. An existing publication must carry `md5sum`.
    pub(crate) fn attach_publication(
        &self,
        name: &GraphName,
        md5sum: &str,
        create: impl FnOnce() -> Publication,
    ) -> Result<Attached<Publication>> {
        let mut inner = self.inner.lock();
        let (endpoint, created) = match inner.publications.entry(name.clone()) {
            Entry::Occupied(entry) => {
                check_md5sum(entry.get().descriptor(), md5sum)?;
                (entry.get().clone(), false)
            }
            Entry::Vacant(entry) => (entry.insert(Arc::new(create())).clone(), true),
        };
        endpoint.attach();
        Ok(Attached { endpoint, created })
    }

    /// Drop one handle of `publication`. Returns `true` when that was the
    /// last one and the publication left the table.
    pub(crate) fn release_publication(&self, publication: &Arc<Publication>) -> bool {
        let mut inner = self.inner.lock();
        if publication.detach() > 0 {
            return false;
        }
        let name = publication.topic();
        let matches = inner
            .publications
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, publication));
        if matches {
            inner.publications.remove(name);
        }
        matches
    }

    /// Add `handler` to the subscription of `name`, creating it with
    /// `create` when there is none. Returns the handler id.
    pub(crate) fn attach_subscription(
        &self,
        name: &GraphName,
        md5sum: &str,
        handler: DataHandler<Vec<u8>>,
        create: impl FnOnce() -> Subscription,
    ) -> Result<(Attached<Subscription>, usize)> {
        let mut inner = self.inner.lock();
        let (endpoint, created) = match inner.subscriptions.entry(name.clone()) {
            Entry::Occupied(entry) => {
                check_md5sum(entry.get().descriptor(), md5sum)?;
                (entry.get().clone(), false)
            }
            Entry::Vacant(entry) => (entry.insert(Arc::new(create())).clone(), true),
        };
        let handler_id = endpoint.add_handler(handler);
        Ok((Attached { endpoint, created }, handler_id))
    }

    /// Remove handler `handler_id` from `subscription`. Returns `true` when
    /// no handler is left and the subscription left the table.
    pub(crate) fn release_subscription(&self, subscription: &Arc<Subscription>, handler_id: usize) -> bool {
        let mut inner = self.inner.lock();
        if subscription.remove_handler(handler_id) > 0 {
            return false;
        }
        let name = subscription.topic();
        let matches = inner
            .subscriptions
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, subscription));
        if matches {
            inner.subscriptions.remove(name);
        }
        matches
    }

    /// Insert unless the name is taken; returns the existing entry if so.
    pub(crate) fn insert_service(&self, provider: Arc<ServiceProvider>, name: &GraphName) -> Result<(), Arc<ServiceProvider>> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.services.get(name).cloned() {
            return Err(existing);
        }
        inner.services.insert(name.clone(), provider);
        Ok(())
    }

    pub(crate) fn drain(&self) -> Drained {
        let mut inner = self.inner.lock();
        Drained {
            publications: std::mem::take(&mut inner.publications).into_values().collect(),
            subscriptions: std::mem::take(&mut inner.subscriptions).into_values().collect(),
            services: std::mem::take(&mut inner.services).into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::GlobalCounter;
    use crate::entity::TypeInfo;

    fn descriptor(topic: &str, md5sum: &str) -> TopicDescriptor {
        TopicDescriptor::new(
            GraphName::parse(topic).unwrap(),
            TypeInfo::new("std_msgs/Int32", md5sum),
            "int32 data\n",
        )
    }

    fn publication(topic: &str) -> Publication {
        Publication::new(
            descriptor(topic, "abc"),
            GraphName::parse("/node").unwrap(),
            false,
            4,
            Arc::new(GlobalCounter::default()),
            CancellationToken::new(),
        )
    }

    fn subscription(topic: &str) -> Subscription {
        Subscription::new(
            descriptor(topic, "abc"),
            GraphName::parse("/node").unwrap(),
            false,
            Duration::from_secs(1),
            Arc::new(GlobalCounter::default()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_publication_shared_until_last_release() {
        let table = EndpointTable::default();
        let topic = GraphName::parse("/chatter").unwrap();

        let first = table.attach_publication(&topic, "abc", || publication("/chatter")).unwrap();
        assert!(first.created);
        let second = table
            .attach_publication(&topic, "abc", || panic!("must share"))
            .unwrap();
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.endpoint, &second.endpoint));

        assert!(!table.release_publication(&first.endpoint));
        assert!(table.publication(&topic).is_some());
        assert!(table.release_publication(&second.endpoint));
        assert!(table.publication(&topic).is_none());
    }

    #[test]
    fn test_release_then_attach_creates_fresh_publication() {
        let table = EndpointTable::default();
        let topic = GraphName::parse("/chatter").unwrap();

        let old = table.attach_publication(&topic, "abc", || publication("/chatter")).unwrap();
        assert!(table.release_publication(&old.endpoint));

        let fresh = table.attach_publication(&topic, "abc", || publication("/chatter")).unwrap();
        assert!(fresh.created);
        assert!(!Arc::ptr_eq(&old.endpoint, &fresh.endpoint));

        // A late removal of the old publication leaves the new one alone
        assert!(!table.remove_publication(&topic, &old.endpoint));
        assert!(table.publication(&topic).is_some());
    }

    #[test]
    fn test_attach_rejects_other_type() {
        let table = EndpointTable::default();
        let topic = GraphName::parse("/chatter").unwrap();
        let first = table.attach_publication(&topic, "abc", || publication("/chatter")).unwrap();

        let other = table.attach_publication(&topic, "def", || publication("/chatter"));
        assert!(matches!(other, Err(Error::ChecksumMismatch { .. })));

        // The failed attach took no handle
        assert!(table.release_publication(&first.endpoint));
    }

    #[test]
    fn test_subscription_handlers() {
        let table = EndpointTable::default();
        let topic = GraphName::parse("/numbers").unwrap();
        let noop = || DataHandler::Callback(Arc::new(|_: Vec<u8>| {}));

        let (first, first_id) = table
            .attach_subscription(&topic, "abc", noop(), || subscription("/numbers"))
            .unwrap();
        let (second, second_id) = table
            .attach_subscription(&topic, "abc", noop(), || subscription("/numbers"))
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_ne!(first_id, second_id);

        assert!(!table.release_subscription(&first.endpoint, first_id));
        assert!(table.release_subscription(&second.endpoint, second_id));
        assert!(table.subscription(&topic).is_none());
    }
}
