use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::Result;
use crate::name::GraphName;
use crate::rpc::RpcClient;
use crate::rpc::protocol::{BusInfo, BusStats, NameType, ProtocolDescription, SlaveRequest};

/// Typed stub for another node's slave endpoint.
#[derive(Debug, Clone)]
pub struct SlaveClient {
    caller_id: GraphName,
    rpc: RpcClient,
}

impl SlaveClient {
    pub fn new(caller_id: GraphName, slave_uri: Url) -> Self {
        Self {
            caller_id,
            rpc: RpcClient::new(slave_uri),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.rpc = self.rpc.with_timeout(timeout);
        self
    }

    pub fn uri(&self) -> &Url {
        self.rpc.uri()
    }

    fn caller(&self) -> String {
        self.caller_id.to_string()
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: SlaveRequest) -> Result<T> {
        self.rpc.call(request.method(), &request).await
    }

    pub async fn request_topic(&self, topic: &GraphName, protocols: &[&str]) -> Result<ProtocolDescription> {
        self.call(SlaveRequest::RequestTopic {
            caller_id: self.caller(),
            topic: topic.to_string(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
        })
        .await
    }

    pub async fn publisher_update(&self, topic: &GraphName, publishers: &[Url]) -> Result<i32> {
        self.call(SlaveRequest::PublisherUpdate {
            caller_id: self.caller(),
            topic: topic.to_string(),
            publishers: publishers.iter().map(Url::to_string).collect(),
        })
        .await
    }

    pub async fn param_update(&self, key: &str, value: Value) -> Result<i32> {
        self.call(SlaveRequest::ParamUpdate {
            caller_id: self.caller(),
            key: key.to_string(),
            value,
        })
        .await
    }

    pub async fn get_bus_stats(&self) -> Result<BusStats> {
        self.call(SlaveRequest::GetBusStats { caller_id: self.caller() }).await
    }

    pub async fn get_bus_info(&self) -> Result<Vec<BusInfo>> {
        self.call(SlaveRequest::GetBusInfo { caller_id: self.caller() }).await
    }

    pub async fn get_master_uri(&self) -> Result<Url> {
        self.call(SlaveRequest::GetMasterUri { caller_id: self.caller() }).await
    }

    pub async fn get_pid(&self) -> Result<u32> {
        self.call(SlaveRequest::GetPid { caller_id: self.caller() }).await
    }

    pub async fn get_publications(&self) -> Result<NameType> {
        self.call(SlaveRequest::GetPublications { caller_id: self.caller() }).await
    }

    pub async fn get_subscriptions(&self) -> Result<NameType> {
        self.call(SlaveRequest::GetSubscriptions { caller_id: self.caller() }).await
    }

    pub async fn shutdown(&self, message: &str) -> Result<i32> {
        self.call(SlaveRequest::Shutdown {
            caller_id: self.caller(),
            message: message.to_string(),
        })
        .await
    }
}
