//! The master: the graph's authoritative registry behind a control endpoint.

pub mod client;
pub mod registry;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::entity::{PublisherIdentifier, ServiceIdentifier, SlaveIdentifier, SubscriberIdentifier, TopicIdentifier};
use crate::name::{GraphName, NameError, NameResolver};
use crate::rpc::protocol::{MasterRequest, NameType, RpcResponse};
use crate::rpc::{RpcHandler, RpcServer, endpoint_uri};
use crate::slave::client::SlaveClient;
use crate::{Builder, Result};

pub use client::MasterClient;
pub use registry::{MasterRegistry, Registration};

pub const DEFAULT_MASTER_PORT: u16 = 11311;

/// Caller id the master uses for its own outgoing calls.
pub const MASTER_CALLER_ID: &str = "/master";

const REPLACED_REASON: &str = "Replaced by new slave";

pub struct MasterServerBuilder {
    bind: SocketAddr,
    advertise_host: Option<String>,
}

impl Default for MasterServerBuilder {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_MASTER_PORT)),
            advertise_host: None,
        }
    }
}

impl MasterServerBuilder {
    pub fn with_bind_addr(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    /// Host placed in the advertised URI instead of the bind address.
    pub fn with_advertise_host<S: Into<String>>(mut self, host: S) -> Self {
        self.advertise_host = Some(host.into());
        self
    }
}

impl Builder for MasterServerBuilder {
    type Output = MasterServer;

    #[tracing::instrument(name = "master_build", skip(self), fields(bind = %self.bind))]
    async fn build(self) -> Result<MasterServer> {
        let listener = TcpListener::bind(self.bind).await?;
        let local_addr = listener.local_addr()?;
        let host = self.advertise_host.unwrap_or_else(|| advertised_host(&local_addr));
        let uri = endpoint_uri("http", &host, local_addr.port())?;

        let registry = Arc::new(MasterRegistry::new());
        let cancel = CancellationToken::new();
        let handler = Arc::new(MasterHandler {
            registry: registry.clone(),
            uri: uri.clone(),
        });
        let server = RpcServer::listen(listener, handler, cancel.child_token())?;

        info!("[MASTER] Started at {}", uri);
        Ok(MasterServer {
            uri,
            local_addr,
            registry,
            cancel,
            _server: server,
        })
    }
}

/// Unspecified bind addresses are advertised as `localhost`.
pub(crate) fn advertised_host(addr: &SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        addr.ip().to_string()
    }
}

/// A running master. Dropping it releases the port; nodes already connected
/// to each other keep streaming.
pub struct MasterServer {
    uri: Url,
    local_addr: SocketAddr,
    registry: Arc<MasterRegistry>,
    cancel: CancellationToken,
    _server: RpcServer,
}

impl MasterServer {
    pub fn builder() -> MasterServerBuilder {
        MasterServerBuilder::default()
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<MasterRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("[MASTER] Shutting down {}", self.uri);
            self.cancel.cancel();
        }
    }
}

impl Drop for MasterServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct MasterHandler {
    registry: Arc<MasterRegistry>,
    uri: Url,
}

/// Relative names are resolved in the caller's namespace. Private names
/// would need the caller's node name and are refused.
fn resolve(caller: &GraphName, name: &str) -> Result<GraphName> {
    let name = GraphName::parse(name)?;
    if name.is_private() {
        return Err(NameError::PrivateName(name.to_string()).into());
    }
    Ok(NameResolver::default().resolve_in(&caller.parent(), &name)?)
}

fn caller_name(caller_id: &str) -> Result<GraphName> {
    Ok(GraphName::parse(caller_id)?.to_global()?)
}

fn caller_slave(caller_id: &str, caller_api: &str) -> Result<SlaveIdentifier> {
    Ok(SlaveIdentifier::new(caller_name(caller_id)?, Url::parse(caller_api)?))
}

fn name_type_rows(rows: Vec<(GraphName, String)>) -> NameType {
    rows.into_iter().map(|(name, ty)| (name.to_string(), ty)).collect()
}

impl MasterHandler {
    fn notify_replaced(&self, old: Option<SlaveIdentifier>) {
        let Some(old) = old else { return };
        let Ok(caller) = GraphName::parse(MASTER_CALLER_ID) else { return };
        tokio::spawn(async move {
            let client = SlaveClient::new(caller, old.uri.clone());
            if let Err(e) = client.shutdown(REPLACED_REASON).await {
                warn!("[MASTER] Failed to shut down replaced node {}: {}", old, e);
            }
        });
    }

    fn dispatch(&self, request: MasterRequest) -> Result<RpcResponse> {
        let response = match request {
            MasterRequest::RegisterPublisher {
                caller_id,
                topic,
                topic_type,
                caller_api,
            } => {
                let slave = caller_slave(&caller_id, &caller_api)?;
                let topic = resolve(&slave.name, &topic)?;
                let publisher = PublisherIdentifier::new(slave, TopicIdentifier::new(topic.clone()))
                    .with_type(topic_type);
                info!("[MASTER] {} publishes {}", publisher.node_name(), topic);
                let Registration { peers, replaced } = self.registry.register_publisher(publisher);
                self.notify_replaced(replaced);
                let uris: Vec<String> = peers.iter().map(|s| s.slave.uri.to_string()).collect();
                RpcResponse::success(format!("Registered [{}] as publisher of [{}]", caller_id, topic), uris)
            }
            MasterRequest::UnregisterPublisher {
                caller_id,
                topic,
                caller_api,
            } => {
                let slave = caller_slave(&caller_id, &caller_api)?;
                let topic = resolve(&slave.name, &topic)?;
                let publisher = PublisherIdentifier::new(slave, TopicIdentifier::new(topic.clone()));
                let removed = self.registry.unregister_publisher(&publisher);
                debug!("[MASTER] Unregister publisher {} of {}: {}", caller_id, topic, removed);
                RpcResponse::success(format!("Unregistered [{}] as publisher of [{}]", caller_id, topic), removed as i32)
            }
            MasterRequest::RegisterSubscriber {
                caller_id,
                topic,
                topic_type,
                caller_api,
            } => {
                let slave = caller_slave(&caller_id, &caller_api)?;
                let topic = resolve(&slave.name, &topic)?;
                let subscriber = SubscriberIdentifier::new(slave, TopicIdentifier::new(topic.clone()))
                    .with_type(topic_type);
                info!("[MASTER] {} subscribes to {}", subscriber.node_name(), topic);
                let Registration { peers, replaced } = self.registry.register_subscriber(subscriber);
                self.notify_replaced(replaced);
                let uris: Vec<String> = peers.iter().map(|p| p.slave.uri.to_string()).collect();
                RpcResponse::success(format!("Subscribed [{}] to [{}]", caller_id, topic), uris)
            }
            MasterRequest::UnregisterSubscriber {
                caller_id,
                topic,
                caller_api,
            } => {
                let slave = caller_slave(&caller_id, &caller_api)?;
                let topic = resolve(&slave.name, &topic)?;
                let subscriber = SubscriberIdentifier::new(slave, TopicIdentifier::new(topic.clone()));
                let removed = self.registry.unregister_subscriber(&subscriber);
                debug!("[MASTER] Unregister subscriber {} of {}: {}", caller_id, topic, removed);
                RpcResponse::success(format!("Unsubscribed [{}] from [{}]", caller_id, topic), removed as i32)
            }
            MasterRequest::RegisterService {
                caller_id,
                service,
                service_api,
                caller_api,
            } => {
                let slave = caller_slave(&caller_id, &caller_api)?;
                let service = resolve(&slave.name, &service)?;
                let identifier = ServiceIdentifier::new(service.clone(), Url::parse(&service_api)?);
                info!("[MASTER] {} provides {} at {}", slave.name, service, service_api);
                let replaced = self.registry.register_service(identifier, slave);
                self.notify_replaced(replaced);
                RpcResponse::success(format!("Registered [{}] as provider of [{}]", caller_id, service), 1)
            }
            MasterRequest::UnregisterService {
                caller_id,
                service,
                service_api,
            } => {
                let caller = caller_name(&caller_id)?;
                let service = resolve(&caller, &service)?;
                let identifier = ServiceIdentifier::new(service.clone(), Url::parse(&service_api)?);
                let removed = self.registry.unregister_service(&identifier);
                debug!("[MASTER] Unregister service {} by {}: {}", service, caller_id, removed);
                RpcResponse::success(format!("Unregistered [{}] as provider of [{}]", caller_id, service), removed as i32)
            }
            MasterRequest::LookupNode { caller_id, node_name } => {
                let caller = caller_name(&caller_id)?;
                let node = resolve(&caller, &node_name)?;
                match self.registry.lookup_node(&node) {
                    Some(slave) => RpcResponse::success(format!("URI for [{}]", node), slave.uri.to_string()),
                    None => RpcResponse::failure(format!("unknown node [{}]", node)),
                }
            }
            MasterRequest::LookupService { caller_id, service } => {
                let caller = caller_name(&caller_id)?;
                let service = resolve(&caller, &service)?;
                match self.registry.lookup_service(&service) {
                    Some(identifier) => {
                        RpcResponse::success(format!("rosrpc URI for [{}]", service), identifier.uri.to_string())
                    }
                    None => RpcResponse::failure(format!("no provider for [{}]", service)),
                }
            }
            MasterRequest::GetPublishedTopics { caller_id, subgraph } => {
                let caller = caller_name(&caller_id)?;
                let subgraph = if subgraph.is_empty() {
                    GraphName::root()
                } else {
                    resolve(&caller, &subgraph)?
                };
                let rows = name_type_rows(self.registry.published_topics(&subgraph));
                RpcResponse::success("current topics", rows)
            }
            MasterRequest::GetTopicTypes { caller_id } => {
                caller_name(&caller_id)?;
                RpcResponse::success("current topic types", name_type_rows(self.registry.topic_types()))
            }
            MasterRequest::GetSystemState { caller_id } => {
                caller_name(&caller_id)?;
                RpcResponse::success("current system state", self.registry.system_state())
            }
            MasterRequest::GetUri { caller_id } => {
                caller_name(&caller_id)?;
                RpcResponse::success("", self.uri.to_string())
            }
        };
        Ok(response)
    }
}

impl RpcHandler for MasterHandler {
    type Request = MasterRequest;

    async fn handle(&self, request: MasterRequest) -> RpcResponse {
        let method = request.method();
        self.dispatch(request).unwrap_or_else(|e| {
            debug!("[MASTER] {} rejected: {}", method, e);
            RpcResponse::from_error(&e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> GraphName {
        GraphName::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_in_caller_namespace() {
        assert_eq!(resolve(&name("/ns/node"), "chatter").unwrap(), name("/ns/chatter"));
        assert_eq!(resolve(&name("/node"), "chatter").unwrap(), name("/chatter"));
        assert_eq!(resolve(&name("/ns/node"), "/abs").unwrap(), name("/abs"));
        assert!(resolve(&name("/ns/node"), "~private").is_err());
        assert!(resolve(&name("/ns/node"), "bad name").is_err());
    }

    #[test]
    fn test_advertised_host() {
        assert_eq!(advertised_host(&"0.0.0.0:1".parse().unwrap()), "localhost");
        assert_eq!(advertised_host(&"127.0.0.1:1".parse().unwrap()), "127.0.0.1");
    }
}
