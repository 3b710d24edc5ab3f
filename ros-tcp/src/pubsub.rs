use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::DataHandler;
use crate::msg::RosMessage;
use crate::name::{GraphName, NodeNameResolver};
use crate::queue::BoundedQueue;
use crate::slave::SlaveServer;
use crate::topic::{Publication, Subscription, TopicDescriptor};
use crate::{Builder, Error, Result};

pub struct RosPubBuilder<T> {
    pub(crate) topic: String,
    pub(crate) names: NodeNameResolver,
    pub(crate) slave: SlaveServer,
    pub(crate) queue_size: usize,
    pub(crate) latching: bool,
    pub(crate) _phantom_data: PhantomData<T>,
}

impl<T> RosPubBuilder<T> {
    /// Frames buffered per subscriber connection before the oldest is
    /// dropped.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Keep the last message and send it to every subscriber that connects
    /// later.
    pub fn with_latching(mut self, latching: bool) -> Self {
        self.latching = latching;
        self
    }
}

impl<T: RosMessage> Builder for RosPubBuilder<T> {
    type Output = RosPub<T>;

    #[tracing::instrument(name = "pub_build", skip(self), fields(
        topic = %self.topic,
        latching = self.latching,
        queue_size = self.queue_size
    ))]
    async fn build(self) -> Result<RosPub<T>> {
        let topic = self.names.resolve_str(&self.topic)?;
        debug!("[PUB] Resolved topic: {}", topic);
        self.slave.ensure_running()?;

        // Handles on the same topic share one publication.
        let slave = &self.slave;
        let attached = slave.endpoints().attach_publication(&topic, T::md5sum(), || {
            Publication::new(
                TopicDescriptor::new(topic.clone(), T::type_info(), T::msg_definition()),
                slave.name().clone(),
                self.latching,
                self.queue_size,
                slave.counter().clone(),
                slave.cancel_token().child_token(),
            )
        })?;
        let publication = attached.endpoint;
        if attached.created {
            slave.register_publication(&publication).await?;
            info!("[PUB] Publisher ready: topic={}", publication.topic());
        } else {
            debug!("[PUB] Sharing existing publication of {}", topic);
        }

        Ok(RosPub {
            publication,
            slave: self.slave,
            _phantom_data: PhantomData,
        })
    }
}

/// Typed publisher handle. Dropping the last handle on a topic unregisters
/// it.
pub struct RosPub<T: RosMessage> {
    publication: Arc<Publication>,
    slave: SlaveServer,
    _phantom_data: PhantomData<T>,
}

impl<T: RosMessage> RosPub<T> {
    pub fn topic(&self) -> &GraphName {
        self.publication.topic()
    }

    pub fn is_latching(&self) -> bool {
        self.publication.is_latching()
    }

    /// Serialize `msg` once and queue it on every subscriber connection.
    #[tracing::instrument(name = "publish", skip(self, msg), fields(
        topic = %self.publication.topic(),
        payload_len = tracing::field::Empty
    ))]
    pub fn publish(&self, msg: &T) -> Result<()> {
        let bytes = msg.to_bytes()?;
        tracing::Span::current().record("payload_len", bytes.len());
        self.publish_serialized(bytes)
    }

    /// Publish an already serialized payload.
    pub fn publish_serialized<B: Into<Arc<[u8]>>>(&self, payload: B) -> Result<()> {
        if self.slave.is_shut_down() {
            return Err(Error::Closed);
        }
        self.publication.publish(payload.into());
        Ok(())
    }

    /// Subscribers currently connected.
    pub fn subscriber_count(&self) -> usize {
        self.publication.subscriber_count()
    }
}

impl<T: RosMessage> Drop for RosPub<T> {
    fn drop(&mut self) {
        self.slave.release_publication(&self.publication);
    }
}

pub struct RosSubBuilder<T> {
    pub(crate) topic: String,
    pub(crate) names: NodeNameResolver,
    pub(crate) slave: SlaveServer,
    pub(crate) queue_size: usize,
    pub(crate) tcp_nodelay: bool,
    pub(crate) _phantom_data: PhantomData<T>,
}

impl<T> RosSubBuilder<T> {
    /// Messages kept for [`RosSub::recv`] before the oldest is dropped.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Ask publishers to disable Nagle's algorithm on our connections.
    pub fn with_tcp_nodelay(mut self, tcp_nodelay: bool) -> Self {
        self.tcp_nodelay = tcp_nodelay;
        self
    }
}

impl<T: RosMessage> RosSubBuilder<T> {
    /// Build a subscriber that runs `callback` on the connection task for
    /// every message received.
    pub async fn build_with_callback<F>(self, callback: F) -> Result<RosSub<T>>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let topic = self.topic.clone();
        let handler = DataHandler::Callback(Arc::new(move |bytes: Vec<u8>| match T::from_bytes(&bytes) {
            Ok(msg) => callback(msg),
            Err(e) => warn!("[SUB] Dropping undecodable message on {}: {}", topic, e),
        }));
        self.build_internal(handler, None).await
    }

    #[tracing::instrument(name = "sub_build", skip(self, handler, queue), fields(topic = %self.topic))]
    async fn build_internal(
        self,
        handler: DataHandler<Vec<u8>>,
        queue: Option<Arc<BoundedQueue<Vec<u8>>>>,
    ) -> Result<RosSub<T>> {
        let topic = self.names.resolve_str(&self.topic)?;
        debug!("[SUB] Resolved topic: {}", topic);
        self.slave.ensure_running()?;

        let slave = &self.slave;
        let (attached, handler_id) = slave.endpoints().attach_subscription(&topic, T::md5sum(), handler, || {
            Subscription::new(
                TopicDescriptor::new(topic.clone(), T::type_info(), T::msg_definition()),
                slave.name().clone(),
                self.tcp_nodelay,
                slave.rpc_timeout(),
                slave.counter().clone(),
                slave.cancel_token().child_token(),
            )
        })?;
        let subscription = attached.endpoint;
        if attached.created {
            slave.register_subscription(&subscription).await?;
            info!("[SUB] Subscriber ready: topic={}", subscription.topic());
        } else {
            debug!("[SUB] Sharing existing subscription of {}", topic);
        }

        Ok(RosSub {
            subscription,
            handler_id,
            queue,
            slave: self.slave,
            _phantom_data: PhantomData,
        })
    }
}

impl<T: RosMessage> Builder for RosSubBuilder<T> {
    type Output = RosSub<T>;

    async fn build(self) -> Result<RosSub<T>> {
        let queue = Arc::new(BoundedQueue::new(self.queue_size));
        self.build_internal(DataHandler::Queue(queue.clone()), Some(queue)).await
    }
}

/// Typed subscriber handle.
///
/// Built with [`Builder::build`] it buffers messages for the `recv` family;
/// built with [`RosSubBuilder::build_with_callback`] it has no queue and
/// those methods fail with [`Error::NoQueue`].
pub struct RosSub<T: RosMessage> {
    subscription: Arc<Subscription>,
    handler_id: usize,
    queue: Option<Arc<BoundedQueue<Vec<u8>>>>,
    slave: SlaveServer,
    _phantom_data: PhantomData<T>,
}

impl<T: RosMessage> RosSub<T> {
    pub fn topic(&self) -> &GraphName {
        self.subscription.topic()
    }

    fn queue(&self) -> Result<&Arc<BoundedQueue<Vec<u8>>>> {
        self.queue
            .as_ref()
            .ok_or_else(|| Error::NoQueue(self.topic().to_string()))
    }

    /// Block the current thread until a message arrives.
    pub fn recv(&self) -> Result<T> {
        let bytes = self.queue()?.recv();
        T::from_bytes(&bytes)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T> {
        match self.queue()?.recv_timeout(timeout) {
            Some(bytes) => T::from_bytes(&bytes),
            None => Err(Error::timeout(format!("receiving on {}", self.topic()), timeout)),
        }
    }

    pub async fn async_recv(&self) -> Result<T> {
        let bytes = self.queue()?.recv_async().await;
        T::from_bytes(&bytes)
    }

    pub fn try_recv(&self) -> Result<Option<T>> {
        self.queue()?
            .try_recv()
            .map(|bytes| T::from_bytes(&bytes))
            .transpose()
    }

    /// Whether a message is waiting. Always `false` for callback
    /// subscribers.
    pub fn is_ready(&self) -> bool {
        self.queue.as_ref().is_some_and(|q| !q.is_empty())
    }

    /// Publishers with an established connection.
    pub fn publisher_count(&self) -> usize {
        self.subscription.publisher_count()
    }

    /// Ask the master for the current publishers and connect to any this
    /// subscriber is not connected to. Returns how many publishers the
    /// master knows.
    pub async fn refresh_publishers(&self) -> Result<usize> {
        self.slave.refresh_subscription(&self.subscription).await
    }
}

impl<T: RosMessage> Drop for RosSub<T> {
    fn drop(&mut self) {
        self.slave.release_subscription(&self.subscription, self.handler_id);
    }
}
