//! A node's control endpoint.
//!
//! Answers the calls other nodes and the master make to this node, and
//! keeps this node's registrations with the master in step with its local
//! publications, subscriptions and services.

pub mod client;
pub mod endpoints;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::spawn_detached;
use crate::context::GlobalCounter;
use crate::entity::{ServiceIdentifier, SlaveIdentifier};
use crate::master::MasterClient;
use crate::name::GraphName;
use crate::rpc::protocol::{BusStats, NameType, ProtocolDescription, RpcResponse, SlaveRequest, TCPROS};
use crate::rpc::{RpcHandler, RpcServer, endpoint_uri};
use crate::service::provider::ServiceProvider;
use crate::tcpros::TcprosServer;
use crate::topic::{Publication, Subscription};
use crate::{Error, Result};

pub use client::SlaveClient;
pub use endpoints::EndpointTable;

struct SlaveInner {
    identifier: SlaveIdentifier,
    host: String,
    master: MasterClient,
    tcpros_addr: SocketAddr,
    endpoints: Arc<EndpointTable>,
    counter: Arc<GlobalCounter>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
    /// Held across every master (un)registration call so a release and a
    /// re-create of the same name reach the master in order.
    registration: tokio::sync::Mutex<()>,
}

/// Handle on a running slave endpoint. Cheap to clone.
#[derive(Clone)]
pub struct SlaveServer {
    inner: Arc<SlaveInner>,
}

impl SlaveServer {
    /// Bind the control and TCPROS listeners on port 0 and start serving.
    /// `host` is what both listeners are advertised as.
    pub async fn start(
        name: GraphName,
        host: String,
        master: MasterClient,
        counter: Arc<GlobalCounter>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let rpc_listener = TcpListener::bind(bind).await?;
        let tcpros_listener = TcpListener::bind(bind).await?;
        let rpc_port = rpc_listener.local_addr()?.port();
        let uri = endpoint_uri("http", &host, rpc_port)?;

        let endpoints = Arc::new(EndpointTable::default());
        let tcpros = TcprosServer::listen(tcpros_listener, endpoints.clone(), cancel.child_token())?;

        let inner = Arc::new(SlaveInner {
            identifier: SlaveIdentifier::new(name, uri),
            host,
            master,
            tcpros_addr: tcpros.local_addr(),
            endpoints,
            counter,
            cancel,
            shut_down: AtomicBool::new(false),
            registration: tokio::sync::Mutex::new(()),
        });
        RpcServer::listen(
            rpc_listener,
            Arc::new(SlaveHandler { inner: inner.clone() }),
            inner.cancel.child_token(),
        )?;

        info!(
            "[SLAVE] {} at {} (tcpros port {})",
            inner.identifier.name,
            inner.identifier.uri,
            inner.tcpros_addr.port()
        );
        Ok(Self { inner })
    }

    pub fn identifier(&self) -> &SlaveIdentifier {
        &self.inner.identifier
    }

    pub fn name(&self) -> &GraphName {
        &self.inner.identifier.name
    }

    pub fn uri(&self) -> &Url {
        &self.inner.identifier.uri
    }

    pub fn tcpros_port(&self) -> u16 {
        self.inner.tcpros_addr.port()
    }

    pub fn master(&self) -> &MasterClient {
        &self.inner.master
    }

    pub fn endpoints(&self) -> &Arc<EndpointTable> {
        &self.inner.endpoints
    }

    pub(crate) fn counter(&self) -> &Arc<GlobalCounter> {
        &self.inner.counter
    }

    /// Token cancelled when the node shuts down; endpoint tokens derive
    /// from it.
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.inner.master.timeout()
    }

    /// `rosrpc://` address of a service served by this node.
    pub fn service_uri(&self) -> Result<Url> {
        endpoint_uri("rosrpc", &self.inner.host, self.tcpros_port())
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() { Err(Error::Closed) } else { Ok(()) }
    }

    /// Register a publication freshly added to the endpoint table with the
    /// master, then push a `publisherUpdate` to every subscriber the master
    /// returned. On failure the publication leaves the table again.
    #[tracing::instrument(name = "register_publication", skip(self, publication), fields(topic = %publication.topic()))]
    pub(crate) async fn register_publication(&self, publication: &Arc<Publication>) -> Result<()> {
        let topic = publication.topic().clone();
        let type_name = &publication.descriptor().type_info.name;
        let registered = {
            let _registration = self.inner.registration.lock().await;
            self.inner
                .master
                .register_publisher(&self.inner.identifier, &topic, type_name)
                .await
        };
        let subscribers = match registered {
            Ok(subscribers) => subscribers,
            Err(e) => {
                if self.inner.endpoints.remove_publication(&topic, publication) {
                    publication.shutdown();
                }
                return Err(e);
            }
        };
        info!("[SLAVE] Publishing {} ({} subscribers known)", topic, subscribers.len());
        self.push_publisher_update(&topic, subscribers).await;
        Ok(())
    }

    /// Send every subscriber in `subscribers` the full set of publishers the
    /// master holds for `topic`.
    async fn push_publisher_update(&self, topic: &GraphName, subscribers: Vec<Url>) {
        if subscribers.is_empty() {
            return;
        }
        let publishers = match self.current_publishers(topic).await {
            Ok(publishers) => publishers,
            Err(e) => {
                debug!("[SLAVE] Falling back to own URI in publisherUpdate for {}: {}", topic, e);
                vec![self.inner.identifier.uri.clone()]
            }
        };

        let mut updates = JoinSet::new();
        for subscriber in subscribers {
            let client = SlaveClient::new(self.name().clone(), subscriber).with_timeout(self.rpc_timeout());
            let topic = topic.clone();
            let publishers = publishers.clone();
            updates.spawn(async move {
                let result = client.publisher_update(&topic, &publishers).await;
                (client, result)
            });
        }
        while let Some(joined) = updates.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((client, Err(e))) => {
                    warn!("[SLAVE] publisherUpdate to {} for {} failed: {}", client.uri(), topic, e)
                }
                Err(e) => warn!("[SLAVE] publisherUpdate task failed: {}", e),
            }
        }
    }

    /// Control URIs of every publisher of `topic`, from the master's system
    /// state and one `lookupNode` per publishing node.
    async fn current_publishers(&self, topic: &GraphName) -> Result<Vec<Url>> {
        let master = &self.inner.master;
        let state = master.get_system_state(self.name()).await?;
        let nodes = state
            .publishers
            .into_iter()
            .find(|(name, _)| name == topic.as_str())
            .map(|(_, nodes)| nodes)
            .unwrap_or_default();

        let mut uris = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node == self.name().as_str() {
                uris.push(self.inner.identifier.uri.clone());
                continue;
            }
            match master.lookup_node(self.name(), &node).await {
                Ok(uri) => uris.push(uri),
                Err(e) => debug!("[SLAVE] Publisher {} of {} vanished: {}", node, topic, e),
            }
        }
        if !uris.contains(&self.inner.identifier.uri) {
            uris.push(self.inner.identifier.uri.clone());
        }
        Ok(uris)
    }

    /// Drop one handle of `publication`. When it was the last, the
    /// publication closes and the master is told in the background.
    pub(crate) fn release_publication(&self, publication: &Arc<Publication>) {
        if !self.inner.endpoints.release_publication(publication) {
            return;
        }
        publication.shutdown();
        let slave = self.clone();
        let topic = publication.topic().clone();
        spawn_detached("unregister publisher", async move {
            let _registration = slave.inner.registration.lock().await;
            if slave.inner.endpoints.publication(&topic).is_some() {
                debug!("[SLAVE] {} published again; keeping its registration", topic);
                return;
            }
            if let Err(e) = slave.inner.master.unregister_publisher(&slave.inner.identifier, &topic).await {
                warn!("[SLAVE] Failed to unregister publisher of {}: {}", topic, e);
            }
        });
    }

    /// Register a subscription freshly added to the endpoint table with the
    /// master, then connect to every publisher the master already knows.
    #[tracing::instrument(name = "register_subscription", skip(self, subscription), fields(topic = %subscription.topic()))]
    pub(crate) async fn register_subscription(&self, subscription: &Arc<Subscription>) -> Result<()> {
        let topic = subscription.topic();
        match self.register_subscriber_with_master(subscription).await {
            Ok(count) => {
                info!("[SLAVE] Subscribed to {} ({} publishers known)", topic, count);
                Ok(())
            }
            Err(e) => {
                if self.inner.endpoints.remove_subscription(topic, subscription) {
                    subscription.shutdown();
                }
                Err(e)
            }
        }
    }

    /// Ask the master again for the publishers of `subscription` and connect
    /// to any not already connected.
    pub async fn refresh_subscription(&self, subscription: &Arc<Subscription>) -> Result<usize> {
        self.ensure_running()?;
        self.register_subscriber_with_master(subscription).await
    }

    async fn register_subscriber_with_master(&self, subscription: &Arc<Subscription>) -> Result<usize> {
        let publishers = {
            let _registration = self.inner.registration.lock().await;
            self.inner
                .master
                .register_subscriber(
                    &self.inner.identifier,
                    subscription.topic(),
                    &subscription.descriptor().type_info.name,
                )
                .await?
        };
        let count = publishers.len();
        subscription.update_publishers(publishers);
        Ok(count)
    }

    /// Drop handler `handler_id` of `subscription`. When it was the last,
    /// the subscription closes and the master is told in the background.
    pub(crate) fn release_subscription(&self, subscription: &Arc<Subscription>, handler_id: usize) {
        if !self.inner.endpoints.release_subscription(subscription, handler_id) {
            return;
        }
        subscription.shutdown();
        let slave = self.clone();
        let topic = subscription.topic().clone();
        spawn_detached("unregister subscriber", async move {
            let _registration = slave.inner.registration.lock().await;
            if slave.inner.endpoints.subscription(&topic).is_some() {
                debug!("[SLAVE] {} subscribed again; keeping its registration", topic);
                return;
            }
            if let Err(e) = slave.inner.master.unregister_subscriber(&slave.inner.identifier, &topic).await {
                warn!("[SLAVE] Failed to unregister subscriber of {}: {}", topic, e);
            }
        });
    }

    #[tracing::instrument(name = "register_service", skip(self, provider), fields(service = %provider.name()))]
    pub(crate) async fn register_service(&self, provider: Arc<ServiceProvider>) -> Result<()> {
        self.ensure_running()?;
        let name = provider.name().clone();
        self.inner
            .endpoints
            .insert_service(provider.clone(), &name)
            .map_err(|_| Error::AlreadyRegistered(name.to_string()))?;

        let identifier = ServiceIdentifier::new(name.clone(), provider.uri().clone());
        let registered = {
            let _registration = self.inner.registration.lock().await;
            self.inner.master.register_service(&self.inner.identifier, &identifier).await
        };
        if let Err(e) = registered {
            self.inner.endpoints.remove_service(&name, &provider);
            return Err(e);
        }
        info!("[SLAVE] Serving {} at {}", name, provider.uri());
        Ok(())
    }

    /// Take `provider` out of the endpoint table and close it; the master
    /// is told in the background.
    pub(crate) fn release_service(&self, provider: &Arc<ServiceProvider>) {
        let name = provider.name().clone();
        if !self.inner.endpoints.remove_service(&name, provider) {
            return;
        }
        provider.shutdown();
        let slave = self.clone();
        let identifier = ServiceIdentifier::new(name, provider.uri().clone());
        spawn_detached("unregister service", async move {
            let _registration = slave.inner.registration.lock().await;
            if slave.inner.endpoints.service(&identifier.name).is_some() {
                debug!("[SLAVE] {} served again; keeping its registration", identifier.name);
                return;
            }
            if let Err(e) = slave.inner.master.unregister_service(slave.name(), &identifier).await {
                warn!("[SLAVE] Failed to unregister service {}: {}", identifier.name, e);
            }
        });
    }

    /// Unregister everything from the master, close every connection and
    /// release both ports. Only the first call does anything.
    pub async fn shutdown(&self, reason: &str) {
        self.inner.shutdown(reason).await;
    }
}

impl SlaveInner {
    async fn shutdown(&self, reason: &str) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[SLAVE] Shutting down {}: {}", self.identifier.name, reason);

        let drained = self.endpoints.drain();
        for publication in drained.publications {
            publication.shutdown();
            if let Err(e) = self.master.unregister_publisher(&self.identifier, publication.topic()).await {
                warn!("[SLAVE] Failed to unregister publisher of {}: {}", publication.topic(), e);
            }
        }
        for subscription in drained.subscriptions {
            subscription.shutdown();
            if let Err(e) = self.master.unregister_subscriber(&self.identifier, subscription.topic()).await {
                warn!("[SLAVE] Failed to unregister subscriber of {}: {}", subscription.topic(), e);
            }
        }
        for provider in drained.services {
            provider.shutdown();
            let identifier = ServiceIdentifier::new(provider.name().clone(), provider.uri().clone());
            if let Err(e) = self.master.unregister_service(&self.identifier.name, &identifier).await {
                warn!("[SLAVE] Failed to unregister service {}: {}", provider.name(), e);
            }
        }

        self.cancel.cancel();
    }

    fn publications(&self) -> NameType {
        self.endpoints
            .publications()
            .iter()
            .map(|p| (p.topic().to_string(), p.descriptor().type_info.name.clone()))
            .collect()
    }

    fn subscriptions(&self) -> NameType {
        self.endpoints
            .subscriptions()
            .iter()
            .map(|s| (s.topic().to_string(), s.descriptor().type_info.name.clone()))
            .collect()
    }

    fn request_topic(&self, topic: &str, protocols: &[String]) -> Result<ProtocolDescription> {
        let topic = GraphName::parse(topic)?.to_global()?;
        if self.endpoints.publication(&topic).is_none() {
            return Err(Error::NoSuchTopic(topic.to_string()));
        }
        if !protocols.iter().any(|p| p == TCPROS) {
            return Err(Error::NoSupportedProtocol(protocols.to_vec()));
        }
        Ok(ProtocolDescription {
            protocol: TCPROS.to_string(),
            host: self.host.clone(),
            port: self.tcpros_addr.port(),
        })
    }

    fn publisher_update(&self, topic: &str, publishers: &[String]) -> Result<()> {
        let topic = GraphName::parse(topic)?.to_global()?;
        let subscription = self
            .endpoints
            .subscription(&topic)
            .ok_or_else(|| Error::NoSuchTopic(topic.to_string()))?;
        let uris = publishers
            .iter()
            .map(|uri| Url::parse(uri))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        subscription.update_publishers(uris);
        Ok(())
    }
}

struct SlaveHandler {
    inner: Arc<SlaveInner>,
}

impl SlaveHandler {
    fn dispatch(&self, request: SlaveRequest) -> Result<RpcResponse> {
        let inner = &self.inner;
        let response = match request {
            SlaveRequest::RequestTopic { caller_id, topic, protocols } => {
                let description = inner.request_topic(&topic, &protocols)?;
                debug!("[SLAVE] {} requested {} -> {}:{}", caller_id, topic, description.host, description.port);
                RpcResponse::success(format!("ready on {}:{}", description.host, description.port), description)
            }
            SlaveRequest::PublisherUpdate { caller_id, topic, publishers } => {
                debug!("[SLAVE] publisherUpdate from {} for {}: {:?}", caller_id, topic, publishers);
                inner.publisher_update(&topic, &publishers)?;
                RpcResponse::success("publisher update received", 1)
            }
            SlaveRequest::ParamUpdate { caller_id, key, value } => {
                info!("[SLAVE] paramUpdate from {}: {} = {}", caller_id, key, value);
                RpcResponse::success("parameter update acknowledged", 0)
            }
            SlaveRequest::GetBusStats { .. } => {
                let stats = BusStats {
                    publish: inner.endpoints.publications().iter().map(|p| p.stats()).collect(),
                    subscribe: inner.endpoints.subscriptions().iter().map(|s| s.stats()).collect(),
                };
                RpcResponse::success("bus stats", stats)
            }
            SlaveRequest::GetBusInfo { .. } => {
                let mut rows = Vec::new();
                for publication in inner.endpoints.publications() {
                    rows.extend(publication.bus_info());
                }
                for subscription in inner.endpoints.subscriptions() {
                    rows.extend(subscription.bus_info());
                }
                RpcResponse::success("bus info", rows)
            }
            SlaveRequest::GetMasterUri { .. } => RpcResponse::success("", inner.master.uri().to_string()),
            SlaveRequest::GetPid { .. } => RpcResponse::success("", std::process::id()),
            SlaveRequest::GetSubscriptions { .. } => RpcResponse::success("subscriptions", inner.subscriptions()),
            SlaveRequest::GetPublications { .. } => RpcResponse::success("publications", inner.publications()),
            SlaveRequest::Shutdown { caller_id, message } => {
                info!("[SLAVE] Shutdown requested by {}: {}", caller_id, message);
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.shutdown(&message).await });
                RpcResponse::success("shutdown", 0)
            }
        };
        Ok(response)
    }
}

impl RpcHandler for SlaveHandler {
    type Request = SlaveRequest;

    async fn handle(&self, request: SlaveRequest) -> RpcResponse {
        let method = request.method();
        self.dispatch(request).unwrap_or_else(|e| {
            debug!("[SLAVE] {} rejected: {}", method, e);
            RpcResponse::from_error(&e)
        })
    }
}
