use std::time::Duration;

use url::Url;

use crate::Result;
use crate::entity::{ServiceIdentifier, SlaveIdentifier};
use crate::name::GraphName;
use crate::rpc::RpcClient;
use crate::rpc::protocol::{MasterRequest, NameType, SystemState};

/// Typed stub for the master's control-plane API.
///
/// Every method surfaces a non-success status as [`crate::Error::Remote`]
/// and an elapsed deadline as [`crate::Error::Timeout`].
#[derive(Debug, Clone)]
pub struct MasterClient {
    rpc: RpcClient,
}

impl MasterClient {
    pub fn new(master_uri: Url) -> Self {
        Self {
            rpc: RpcClient::new(master_uri),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.rpc = self.rpc.with_timeout(timeout);
        self
    }

    pub fn uri(&self) -> &Url {
        self.rpc.uri()
    }

    pub fn timeout(&self) -> Duration {
        self.rpc.timeout()
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: MasterRequest) -> Result<T> {
        self.rpc.call(request.method(), &request).await
    }

    /// Returns the control URIs of the topic's current subscribers.
    pub async fn register_publisher(
        &self,
        caller: &SlaveIdentifier,
        topic: &GraphName,
        topic_type: &str,
    ) -> Result<Vec<Url>> {
        self.call(MasterRequest::RegisterPublisher {
            caller_id: caller.name.to_string(),
            topic: topic.to_string(),
            topic_type: topic_type.to_string(),
            caller_api: caller.uri.to_string(),
        })
        .await
    }

    pub async fn unregister_publisher(&self, caller: &SlaveIdentifier, topic: &GraphName) -> Result<i32> {
        self.call(MasterRequest::UnregisterPublisher {
            caller_id: caller.name.to_string(),
            topic: topic.to_string(),
            caller_api: caller.uri.to_string(),
        })
        .await
    }

    /// Returns the control URIs of the topic's current publishers.
    pub async fn register_subscriber(
        &self,
        caller: &SlaveIdentifier,
        topic: &GraphName,
        topic_type: &str,
    ) -> Result<Vec<Url>> {
        self.call(MasterRequest::RegisterSubscriber {
            caller_id: caller.name.to_string(),
            topic: topic.to_string(),
            topic_type: topic_type.to_string(),
            caller_api: caller.uri.to_string(),
        })
        .await
    }

    pub async fn unregister_subscriber(&self, caller: &SlaveIdentifier, topic: &GraphName) -> Result<i32> {
        self.call(MasterRequest::UnregisterSubscriber {
            caller_id: caller.name.to_string(),
            topic: topic.to_string(),
            caller_api: caller.uri.to_string(),
        })
        .await
    }

    pub async fn register_service(&self, caller: &SlaveIdentifier, service: &ServiceIdentifier) -> Result<i32> {
        self.call(MasterRequest::RegisterService {
            caller_id: caller.name.to_string(),
            service: service.name.to_string(),
            service_api: service.uri.to_string(),
            caller_api: caller.uri.to_string(),
        })
        .await
    }

    pub async fn unregister_service(&self, caller_id: &GraphName, service: &ServiceIdentifier) -> Result<i32> {
        self.call(MasterRequest::UnregisterService {
            caller_id: caller_id.to_string(),
            service: service.name.to_string(),
            service_api: service.uri.to_string(),
        })
        .await
    }

    pub async fn lookup_node(&self, caller_id: &GraphName, node_name: &str) -> Result<Url> {
        self.call(MasterRequest::LookupNode {
            caller_id: caller_id.to_string(),
            node_name: node_name.to_string(),
        })
        .await
    }

    /// Returns the `rosrpc://` address of the service's provider.
    pub async fn lookup_service(&self, caller_id: &GraphName, service: &str) -> Result<Url> {
        self.call(MasterRequest::LookupService {
            caller_id: caller_id.to_string(),
            service: service.to_string(),
        })
        .await
    }

    pub async fn get_published_topics(&self, caller_id: &GraphName, subgraph: &str) -> Result<NameType> {
        self.call(MasterRequest::GetPublishedTopics {
            caller_id: caller_id.to_string(),
            subgraph: subgraph.to_string(),
        })
        .await
    }

    pub async fn get_topic_types(&self, caller_id: &GraphName) -> Result<NameType> {
        self.call(MasterRequest::GetTopicTypes {
            caller_id: caller_id.to_string(),
        })
        .await
    }

    pub async fn get_system_state(&self, caller_id: &GraphName) -> Result<SystemState> {
        self.call(MasterRequest::GetSystemState {
            caller_id: caller_id.to_string(),
        })
        .await
    }

    pub async fn get_uri(&self, caller_id: &GraphName) -> Result<Url> {
        self.call(MasterRequest::GetUri {
            caller_id: caller_id.to_string(),
        })
        .await
    }

    /// [`MasterClient::get_uri`] with an explicit deadline, used to probe
    /// the master before a node commits to starting.
    pub async fn get_uri_timeout(&self, caller_id: &GraphName, timeout: Duration) -> Result<Url> {
        let request = MasterRequest::GetUri {
            caller_id: caller_id.to_string(),
        };
        self.rpc.call_timeout(request.method(), &request, timeout).await
    }
}
