use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::context::GlobalCounter;
use crate::master::MasterClient;
use crate::msg::{RosMessage, RosService};
use crate::name::{GraphName, NameResolver, NodeNameResolver};
use crate::pubsub::{RosPubBuilder, RosSubBuilder};
use crate::service::{ClientBuilder, ServerBuilder};
use crate::slave::SlaveServer;
use crate::topic::publication::DEFAULT_QUEUE_SIZE;
use crate::{Builder, Error, Result};

pub struct NodeBuilder {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) master_uri: Url,
    pub(crate) host: String,
    pub(crate) resolver: NameResolver,
    pub(crate) rpc_timeout: Duration,
    pub(crate) counter: Arc<GlobalCounter>,
}

impl NodeBuilder {
    /// Relative namespaces nest inside the context's namespace.
    pub fn with_namespace<S: AsRef<str>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.as_ref().to_owned());
        self
    }
}

impl Builder for NodeBuilder {
    type Output = RosNode;

    #[tracing::instrument(name = "node_build", skip(self), fields(node = %self.name))]
    async fn build(self) -> Result<RosNode> {
        let resolver = match &self.namespace {
            Some(ns) => self.resolver.child(&GraphName::parse(ns)?)?,
            None => self.resolver,
        };
        let node_name = GraphName::parse(&self.name)?;
        if node_name.is_private() {
            return Err(Error::InvalidName(crate::name::NameError::PrivateName(self.name)));
        }
        let names = resolver.node_resolver(&node_name)?;

        let master = MasterClient::new(self.master_uri.clone()).with_timeout(self.rpc_timeout);
        master
            .get_uri_timeout(names.node_name(), self.rpc_timeout)
            .await
            .map_err(|e| Error::MasterUnreachable {
                uri: self.master_uri.to_string(),
                reason: e.to_string(),
            })?;

        let slave = SlaveServer::start(
            names.node_name().clone(),
            self.host,
            master,
            self.counter,
            CancellationToken::new(),
        )
        .await?;
        info!("[NODE] {} ready, master at {}", names.node_name(), self.master_uri);

        Ok(RosNode { slave, names })
    }
}

/// A running node: one control endpoint, one TCPROS listener and the
/// endpoints created through it.
pub struct RosNode {
    slave: SlaveServer,
    names: NodeNameResolver,
}

impl RosNode {
    pub fn name(&self) -> &GraphName {
        self.names.node_name()
    }

    pub fn namespace(&self) -> &GraphName {
        self.names.namespace()
    }

    /// Control URI other nodes and the master reach this node at.
    pub fn uri(&self) -> &Url {
        self.slave.uri()
    }

    pub fn master(&self) -> &MasterClient {
        self.slave.master()
    }

    pub fn slave(&self) -> &SlaveServer {
        &self.slave
    }

    /// Resolve `name` the way this node's endpoints are resolved, including
    /// `~private` names.
    pub fn resolve_name(&self, name: &str) -> Result<GraphName> {
        Ok(self.names.resolve_str(name)?)
    }

    pub fn create_pub<T: RosMessage>(&self, topic: &str) -> RosPubBuilder<T> {
        RosPubBuilder {
            topic: topic.to_string(),
            names: self.names.clone(),
            slave: self.slave.clone(),
            queue_size: DEFAULT_QUEUE_SIZE,
            latching: false,
            _phantom_data: PhantomData,
        }
    }

    pub fn create_sub<T: RosMessage>(&self, topic: &str) -> RosSubBuilder<T> {
        RosSubBuilder {
            topic: topic.to_string(),
            names: self.names.clone(),
            slave: self.slave.clone(),
            queue_size: DEFAULT_QUEUE_SIZE,
            tcp_nodelay: false,
            _phantom_data: PhantomData,
        }
    }

    pub fn create_service<S: RosService>(&self, name: &str) -> ServerBuilder<S> {
        ServerBuilder {
            name: name.to_string(),
            names: self.names.clone(),
            slave: self.slave.clone(),
            _phantom_data: PhantomData,
        }
    }

    pub fn create_client<S: RosService>(&self, name: &str) -> ClientBuilder<S> {
        ClientBuilder {
            name: name.to_string(),
            names: self.names.clone(),
            slave: self.slave.clone(),
            persistent: false,
            _phantom_data: PhantomData,
        }
    }

    /// Unregister every endpoint, close every connection and release both
    /// ports. Later calls do nothing.
    pub async fn shutdown(&self, reason: &str) {
        self.slave.shutdown(reason).await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.slave.is_shut_down()
    }
}
