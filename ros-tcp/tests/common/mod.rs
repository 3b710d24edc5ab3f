use std::future::Future;
use std::time::{Duration, Instant};

use ros_tcp::Builder;
use ros_tcp::context::{RosContext, RosContextBuilder};
use ros_tcp::master::MasterServer;
use ros_tcp::node::RosNode;

/// Master on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn start_master() -> MasterServer {
    MasterServer::builder()
        .with_bind_addr("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .expect("Failed to start master")
}

#[allow(dead_code)]
pub async fn create_context(master: &MasterServer) -> RosContext {
    RosContextBuilder::default()
        .with_master_uri(master.uri().as_str())
        .with_hostname("127.0.0.1")
        .with_rpc_timeout(Duration::from_secs(2))
        .build()
        .await
        .expect("Failed to create context")
}

#[allow(dead_code)]
pub async fn create_node(ctx: &RosContext, name: &str) -> RosNode {
    ctx.create_node(name).build().await.expect("Failed to create node")
}

/// Poll `check` every 20ms until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
