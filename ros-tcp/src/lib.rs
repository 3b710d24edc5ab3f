pub mod common;
pub mod context;
pub mod entity;
pub mod error;
pub mod master;
pub mod msg;
pub mod name;
pub mod node;
pub mod pubsub;
pub mod queue;
pub mod ros_msg;
pub mod rpc;
pub mod service;
pub mod slave;
pub mod tcpros;
pub mod topic;

pub use error::{Error, Result};

/// Finish configuring something that may need the network to come up.
///
/// Implementations are written as `async fn build`.
pub trait Builder {
    type Output;
    fn build(self) -> impl std::future::Future<Output = Result<Self::Output>> + Send;
}

pub mod prelude {
    pub use crate::context::{RosContext, RosContextBuilder};
    pub use crate::master::{MasterServer, MasterServerBuilder};
    pub use crate::msg::{RosMessage, RosService};
    pub use crate::name::GraphName;
    pub use crate::node::{NodeBuilder, RosNode};
    pub use crate::pubsub::{RosPub, RosSub};
    pub use crate::service::{ServiceClient, ServiceServer};
    pub use crate::{Builder, Error, Result};
}
