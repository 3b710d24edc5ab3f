use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::master::DEFAULT_MASTER_PORT;
use crate::name::{GraphName, NameResolver};
use crate::node::NodeBuilder;
use crate::rpc::DEFAULT_RPC_TIMEOUT;
use crate::{Builder, Error, Result};

pub const ENV_MASTER_URI: &str = "ROS_MASTER_URI";
pub const ENV_HOSTNAME: &str = "ROS_HOSTNAME";
pub const ENV_IP: &str = "ROS_IP";
pub const ENV_NAMESPACE: &str = "ROS_NAMESPACE";

/// Hands out connection, link and handler ids unique within a context.
#[derive(Debug, Default)]
pub struct GlobalCounter(AtomicUsize);

impl GlobalCounter {
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel)
    }
}

/// Collects the configuration shared by every node of a context.
///
/// Values set through a builder call or a `key:=value` argument win over
/// the `ROS_*` environment variables, which win over the defaults.
///
/// ```no_run
/// # use ros_tcp::{Builder, context::RosContextBuilder};
/// # async fn run() -> ros_tcp::Result<()> {
/// let ctx = RosContextBuilder::default()
///     .with_master_uri("http://127.0.0.1:11311/")
///     .with_args(std::env::args())
///     .build()
///     .await?;
/// let node = ctx.create_node("talker").build().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RosContextBuilder {
    master_uri: Option<String>,
    hostname: Option<String>,
    namespace: Option<String>,
    node_name: Option<String>,
    remappings: Vec<(String, String)>,
    rpc_timeout: Duration,
}

impl Default for RosContextBuilder {
    fn default() -> Self {
        Self {
            master_uri: None,
            hostname: None,
            namespace: None,
            node_name: None,
            remappings: Vec::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl RosContextBuilder {
    pub fn with_master_uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.master_uri = Some(uri.into());
        self
    }

    /// Host or IP this context's nodes advertise in their URIs.
    pub fn with_hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_remapping<F: Into<String>, T: Into<String>>(mut self, from: F, to: T) -> Self {
        self.remappings.push((from.into(), to.into()));
        self
    }

    /// Timeout applied to every control-plane call and to connection setup.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Apply ROS command-line remapping arguments.
    ///
    /// Recognizes `__master:=`, `__hostname:=`, `__ip:=`, `__ns:=` and
    /// `__name:=`; any other `from:=to` is a name remapping. Arguments
    /// without `:=` are ignored.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let Some((key, value)) = arg.as_ref().split_once(":=") else {
                continue;
            };
            let value = value.to_string();
            match key {
                "__master" => self.master_uri = Some(value),
                "__hostname" | "__ip" => self.hostname = Some(value),
                "__ns" => self.namespace = Some(value),
                "__name" => self.node_name = Some(value),
                special if special.starts_with("__") => {
                    debug!("Ignoring unsupported argument {}:={}", special, value);
                }
                from => self.remappings.push((from.to_string(), value)),
            }
        }
        self
    }

    /// Fill unset options from `env`, then defaults, and validate.
    fn resolve_with<E>(self, env: E) -> Result<RosContext>
    where
        E: Fn(&str) -> Option<String>,
    {
        let from_env = |key: &str| {
            let value = env(key).filter(|v| !v.is_empty());
            if let Some(v) = &value {
                debug!("Using {}={}", key, v);
            }
            value
        };

        let master_uri = self
            .master_uri
            .or_else(|| from_env(ENV_MASTER_URI))
            .unwrap_or_else(|| format!("http://localhost:{}/", DEFAULT_MASTER_PORT));
        let master_uri = Url::parse(&master_uri)?;
        if master_uri.host_str().is_none() || master_uri.port_or_known_default().is_none() {
            return Err(Error::InvalidUri(master_uri.to_string()));
        }

        let host = self
            .hostname
            .or_else(|| from_env(ENV_HOSTNAME))
            .or_else(|| from_env(ENV_IP))
            .unwrap_or_else(|| "localhost".to_string());

        let namespace = match self.namespace.or_else(|| from_env(ENV_NAMESPACE)) {
            Some(ns) => GraphName::parse(&ns)?.to_global()?,
            None => GraphName::root(),
        };

        let mut remappings = HashMap::new();
        for (from, to) in &self.remappings {
            let from = GraphName::parse(from)?;
            let to = GraphName::parse(to)?;
            remappings.insert(from, to);
        }
        let resolver = NameResolver::new(namespace, remappings)?;

        let node_name = self.node_name.as_deref().map(GraphName::parse).transpose()?;

        Ok(RosContext {
            master_uri,
            host,
            resolver,
            node_name,
            rpc_timeout: self.rpc_timeout,
            counter: Arc::new(GlobalCounter::default()),
        })
    }
}

impl Builder for RosContextBuilder {
    type Output = RosContext;

    async fn build(self) -> Result<RosContext> {
        let ctx = self.resolve_with(|key| std::env::var(key).ok())?;
        debug!(
            "Context: master={}, host={}, namespace={}",
            ctx.master_uri,
            ctx.host,
            ctx.resolver.namespace()
        );
        Ok(ctx)
    }
}

/// Configuration shared by the nodes of one process.
#[derive(Debug, Clone)]
pub struct RosContext {
    master_uri: Url,
    host: String,
    resolver: NameResolver,
    node_name: Option<GraphName>,
    rpc_timeout: Duration,
    counter: Arc<GlobalCounter>,
}

impl RosContext {
    pub fn master_uri(&self) -> &Url {
        &self.master_uri
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &GraphName {
        self.resolver.namespace()
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// A `__name:=` argument replaces `name`.
    pub fn create_node<S: AsRef<str>>(&self, name: S) -> NodeBuilder {
        let name = match &self.node_name {
            Some(name) => name.to_string(),
            None => name.as_ref().to_owned(),
        };
        NodeBuilder {
            name,
            namespace: None,
            master_uri: self.master_uri.clone(),
            host: self.host.clone(),
            resolver: self.resolver.clone(),
            rpc_timeout: self.rpc_timeout,
            counter: self.counter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let ctx = RosContextBuilder::default().resolve_with(env(&[])).unwrap();
        assert_eq!(ctx.master_uri().as_str(), "http://localhost:11311/");
        assert_eq!(ctx.host(), "localhost");
        assert!(ctx.namespace().is_root());
        assert_eq!(ctx.rpc_timeout(), DEFAULT_RPC_TIMEOUT);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let vars = &[
            (ENV_MASTER_URI, "http://master.local:11312/"),
            (ENV_IP, "10.1.2.3"),
            (ENV_NAMESPACE, "robot"),
        ];
        let ctx = RosContextBuilder::default().resolve_with(env(vars)).unwrap();
        assert_eq!(ctx.master_uri().port(), Some(11312));
        assert_eq!(ctx.host(), "10.1.2.3");
        assert_eq!(ctx.namespace().as_str(), "/robot");
    }

    #[test]
    fn test_hostname_wins_over_ip() {
        let vars = &[(ENV_IP, "10.1.2.3"), (ENV_HOSTNAME, "robot.local")];
        let ctx = RosContextBuilder::default().resolve_with(env(vars)).unwrap();
        assert_eq!(ctx.host(), "robot.local");
    }

    #[test]
    fn test_explicit_wins_over_env() {
        let vars = &[(ENV_MASTER_URI, "http://master.local:11312/"), (ENV_NAMESPACE, "robot")];
        let ctx = RosContextBuilder::default()
            .with_master_uri("http://127.0.0.1:5000/")
            .with_args(["__ns:=/arm"])
            .resolve_with(env(vars))
            .unwrap();
        assert_eq!(ctx.master_uri().port(), Some(5000));
        assert_eq!(ctx.namespace().as_str(), "/arm");
    }

    #[test]
    fn test_args() {
        let ctx = RosContextBuilder::default()
            .with_args([
                "my_node",
                "__master:=http://10.0.0.1:11311/",
                "__ip:=10.0.0.5",
                "__name:=renamed",
                "__log:=/tmp/x.log",
                "chatter:=/other_chatter",
            ])
            .resolve_with(env(&[]))
            .unwrap();
        assert_eq!(ctx.master_uri().host_str(), Some("10.0.0.1"));
        assert_eq!(ctx.host(), "10.0.0.5");
        assert_eq!(ctx.create_node("talker").name, "renamed");
        assert_eq!(ctx.resolver().resolve_str("chatter").unwrap().as_str(), "/other_chatter");
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(RosContextBuilder::default()
            .with_master_uri("not a uri")
            .resolve_with(env(&[]))
            .is_err());
        assert!(RosContextBuilder::default()
            .with_namespace("1bad")
            .resolve_with(env(&[]))
            .is_err());
        assert!(RosContextBuilder::default()
            .with_remapping("a b", "c")
            .resolve_with(env(&[]))
            .is_err());
    }

    #[test]
    fn test_counter_is_monotonic() {
        let counter = GlobalCounter::default();
        let a = counter.increment();
        let b = counter.increment();
        assert!(b > a);
    }
}
