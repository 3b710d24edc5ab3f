use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{LinkStats, TopicDescriptor};
use crate::common::DataHandler;
use crate::context::GlobalCounter;
use crate::name::GraphName;
use crate::rpc::protocol::{BusInfo, TCPROS, TopicStats};
use crate::rpc::resolve_host;
use crate::slave::client::SlaveClient;
use crate::tcpros::handshake::{Connection, client_handshake};
use crate::tcpros::header::{self, ConnectionHeader};
use crate::{Error, Result};

/// Connection to one publisher, keyed by the publisher's control URI.
struct PublisherLink {
    id: usize,
    uri: Url,
    stats: LinkStats,
    cancel: CancellationToken,
}

/// A topic this node subscribes to.
///
/// Publisher URIs are learned from the master and from `publisherUpdate`
/// pushes. Each one gets its own connection task; a URI is forgotten when
/// its connection ends so that a later update can reconnect to it.
pub struct Subscription {
    descriptor: TopicDescriptor,
    caller_id: GraphName,
    tcp_nodelay: bool,
    rpc_timeout: Duration,
    handlers: Mutex<Vec<(usize, DataHandler<Vec<u8>>)>>,
    publishers: Mutex<HashMap<Url, Arc<PublisherLink>>>,
    counter: Arc<GlobalCounter>,
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        descriptor: TopicDescriptor,
        caller_id: GraphName,
        tcp_nodelay: bool,
        rpc_timeout: Duration,
        counter: Arc<GlobalCounter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            caller_id,
            tcp_nodelay,
            rpc_timeout,
            handlers: Mutex::new(Vec::new()),
            publishers: Mutex::new(HashMap::new()),
            counter,
            cancel,
        }
    }

    pub fn descriptor(&self) -> &TopicDescriptor {
        &self.descriptor
    }

    pub fn topic(&self) -> &GraphName {
        &self.descriptor.name
    }

    pub(crate) fn add_handler(&self, handler: DataHandler<Vec<u8>>) -> usize {
        let id = self.counter.increment();
        self.handlers.lock().push((id, handler));
        id
    }

    /// Returns how many handlers are left.
    pub(crate) fn remove_handler(&self, id: usize) -> usize {
        let mut handlers = self.handlers.lock();
        handlers.retain(|(h, _)| *h != id);
        handlers.len()
    }

    /// Control URIs of the publishers currently connected or connecting.
    pub fn known_publishers(&self) -> Vec<Url> {
        self.publishers.lock().keys().cloned().collect()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers
            .lock()
            .values()
            .filter(|l| l.stats.is_connected())
            .count()
    }

    /// Connect to every URI in `uris` not already known. Known publishers
    /// missing from `uris` are left alone; a dead publisher is only noticed
    /// when its connection fails.
    pub fn update_publishers<I: IntoIterator<Item = Url>>(self: &Arc<Self>, uris: I) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut publishers = self.publishers.lock();
        for uri in uris {
            if publishers.contains_key(&uri) {
                continue;
            }
            let link = Arc::new(PublisherLink {
                id: self.counter.increment(),
                uri: uri.clone(),
                stats: LinkStats::new(),
                cancel: self.cancel.child_token(),
            });
            publishers.insert(uri, link.clone());
            debug!("[SUB] New publisher {} for {}", link.uri, self.topic());
            tokio::spawn(self.clone().run_link(link));
        }
    }

    async fn run_link(self: Arc<Self>, link: Arc<PublisherLink>) {
        let result = tokio::select! {
            result = self.connect_and_stream(&link) => result,
            _ = link.cancel.cancelled() => Ok(()),
        };
        link.stats.set_connected(false);

        match result {
            Ok(()) => debug!("[SUB] Publisher {} for {} went away", link.uri, self.topic()),
            Err(e) => warn!("[SUB] Skipping publisher {} for {}: {}", link.uri, self.topic(), e),
        }

        let mut publishers = self.publishers.lock();
        if publishers.get(&link.uri).is_some_and(|l| l.id == link.id) {
            publishers.remove(&link.uri);
        }
    }

    fn request_header(&self) -> ConnectionHeader {
        ConnectionHeader::new()
            .with(header::CALLER_ID, self.caller_id.as_str())
            .with(header::TOPIC, self.topic().as_str())
            .with(header::MD5SUM, self.descriptor.type_info.md5sum.as_str())
            .with(header::TYPE, self.descriptor.type_info.name.as_str())
            .with(header::MESSAGE_DEFINITION, self.descriptor.definition.as_str())
            .with(header::TCP_NODELAY, if self.tcp_nodelay { "1" } else { "0" })
    }

    /// Negotiate with the publisher's slave, handshake and then deliver
    /// frames until the stream ends.
    async fn connect_and_stream(&self, link: &PublisherLink) -> Result<()> {
        let mut conn = tokio::time::timeout(self.rpc_timeout, self.connect(link))
            .await
            .map_err(|_| Error::timeout(format!("connecting to {}", link.uri), self.rpc_timeout))??;

        link.stats.set_connected(true);
        info!("[SUB] Connected to {} for {}", link.uri, self.topic());

        while let Some(frame) = conn.read_frame().await? {
            link.stats.record(frame.len());
            trace!("[SUB] {} bytes on {} from {}", frame.len(), self.topic(), link.uri);
            self.dispatch(frame, link);
        }
        Ok(())
    }

    async fn connect(&self, link: &PublisherLink) -> Result<Connection> {
        let slave = SlaveClient::new(self.caller_id.clone(), link.uri.clone()).with_timeout(self.rpc_timeout);
        let description = slave.request_topic(self.topic(), &[TCPROS]).await?;
        if description.protocol != TCPROS {
            return Err(Error::NoSupportedProtocol(vec![description.protocol]));
        }

        let addr = resolve_host(&description.host, description.port).await?;
        let mut conn = Connection::connect(addr).await?;
        if self.tcp_nodelay {
            conn.set_nodelay(true)?;
        }
        client_handshake(
            &mut conn,
            self.topic().as_str(),
            &self.request_header(),
            &self.descriptor.type_info,
        )
        .await?;
        Ok(conn)
    }

    fn dispatch(&self, frame: Vec<u8>, link: &PublisherLink) {
        let handlers: Vec<DataHandler<Vec<u8>>> = self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
        let Some((last, rest)) = handlers.split_last() else {
            return;
        };
        for handler in rest {
            if handler.handle(frame.clone()) {
                link.stats.record_drop();
            }
        }
        if last.handle(frame) {
            link.stats.record_drop();
        }
    }

    pub fn stats(&self) -> TopicStats {
        TopicStats {
            topic: self.topic().to_string(),
            connections: self
                .publishers
                .lock()
                .values()
                .map(|l| l.stats.snapshot(l.id))
                .collect(),
        }
    }

    pub fn bus_info(&self) -> Vec<BusInfo> {
        self.publishers
            .lock()
            .values()
            .map(|l| BusInfo {
                connection_id: l.id,
                destination: l.uri.to_string(),
                direction: "i".to_string(),
                transport: TCPROS.to_string(),
                topic: self.topic().to_string(),
                connected: l.stats.is_connected(),
            })
            .collect()
    }

    /// Close every publisher connection and stop accepting updates.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.publishers.lock().clear();
    }
}
