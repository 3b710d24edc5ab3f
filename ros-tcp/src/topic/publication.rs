use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{LinkStats, TopicDescriptor};
use crate::context::GlobalCounter;
use crate::name::GraphName;
use crate::queue::BoundedQueue;
use crate::rpc::protocol::{BusInfo, TCPROS, TopicStats};
use crate::tcpros::frame;
use crate::tcpros::handshake::{self, Connection};
use crate::tcpros::header::{self, ConnectionHeader};
use crate::Result;

pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// One connected subscriber. Its queue is only drained by its own writer
/// task.
struct SubscriberLink {
    id: usize,
    destination: String,
    queue: BoundedQueue<Arc<[u8]>>,
    stats: LinkStats,
    cancel: CancellationToken,
}

/// A topic this node publishes, with all of its subscriber connections.
pub struct Publication {
    descriptor: TopicDescriptor,
    caller_id: GraphName,
    latching: bool,
    queue_size: usize,
    latched: Mutex<Option<Arc<[u8]>>>,
    links: Mutex<Vec<Arc<SubscriberLink>>>,
    handles: AtomicUsize,
    counter: Arc<GlobalCounter>,
    cancel: CancellationToken,
}

impl Publication {
    pub(crate) fn new(
        descriptor: TopicDescriptor,
        caller_id: GraphName,
        latching: bool,
        queue_size: usize,
        counter: Arc<GlobalCounter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            caller_id,
            latching,
            queue_size,
            latched: Mutex::new(None),
            links: Mutex::new(Vec::new()),
            handles: AtomicUsize::new(0),
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

    pub fn is_latching(&self) -> bool {
        self.latching
    }

    pub fn subscriber_count(&self) -> usize {
        self.links.lock().len()
    }

    pub(crate) fn attach(&self) -> usize {
        self.handles.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns how many handles are left.
    pub(crate) fn detach(&self) -> usize {
        self.handles.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    /// Queue `payload` on every subscriber connection. The payload is
    /// serialized once and shared.
    pub fn publish(&self, payload: Arc<[u8]>) {
        // Latched value and link snapshot are taken under one lock so a
        // subscriber connecting concurrently sees this payload exactly once.
        let links = {
            let mut latched = self.latched.lock();
            if self.latching {
                *latched = Some(payload.clone());
            }
            self.links.lock().clone()
        };
        trace!("[PUB] {} bytes on {} to {} subscribers", payload.len(), self.topic(), links.len());
        for link in links {
            if link.queue.push(payload.clone()) {
                let dropped = link.stats.record_drop();
                debug!(
                    "[PUB] Queue full on {} -> {}, dropped oldest ({} total)",
                    self.topic(),
                    link.destination,
                    dropped
                );
            }
        }
    }

    fn reply_header(&self) -> ConnectionHeader {
        ConnectionHeader::new()
            .with(header::CALLER_ID, self.caller_id.as_str())
            .with(header::TOPIC, self.topic().as_str())
            .with(header::TYPE, self.descriptor.type_info.name.as_str())
            .with(header::MD5SUM, self.descriptor.type_info.md5sum.as_str())
            .with(header::MESSAGE_DEFINITION, self.descriptor.definition.as_str())
            .with(header::LATCHING, if self.latching { "1" } else { "0" })
    }

    /// Finish the handshake of a subscriber connection whose request header
    /// named this topic, then start streaming to it.
    pub(crate) async fn accept(self: Arc<Self>, mut conn: Connection, request: ConnectionHeader) -> Result<()> {
        handshake::server_accept(&mut conn, self.topic().as_str(), &self.descriptor.type_info, &request).await?;
        conn.write_header(&self.reply_header()).await?;

        let destination = request.get(header::CALLER_ID).unwrap_or("unknown").to_string();
        if request.flag(header::PROBE) {
            debug!("[PUB] Probe of {} from {}", self.topic(), destination);
            conn.close().await;
            return Ok(());
        }
        if request.flag(header::TCP_NODELAY) {
            conn.set_nodelay(true)?;
        }
        conn.establish()?;
        let (reader, writer) = conn.into_split()?;

        let link = Arc::new(SubscriberLink {
            id: self.counter.increment(),
            destination,
            queue: BoundedQueue::new(self.queue_size),
            stats: LinkStats::new(),
            cancel: self.cancel.child_token(),
        });
        link.stats.set_connected(true);
        {
            let latched = self.latched.lock();
            if let Some(latched) = latched.as_ref() {
                link.queue.push(latched.clone());
            }
            self.links.lock().push(link.clone());
        }
        info!("[PUB] {} connected to {}", link.destination, self.topic());

        tokio::spawn(self.run_link(link, reader, writer));
        Ok(())
    }

    async fn run_link(self: Arc<Self>, link: Arc<SubscriberLink>, mut reader: OwnedReadHalf, mut writer: OwnedWriteHalf) {
        let mut scratch = [0u8; 64];
        loop {
            tokio::select! {
                payload = link.queue.recv_async() => {
                    if let Err(e) = frame::write_frame(&mut writer, &payload).await {
                        debug!("[PUB] Write to {} on {} failed: {}", link.destination, self.topic(), e);
                        break;
                    }
                    link.stats.record(payload.len());
                }
                read = reader.read(&mut scratch) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                },
                _ = link.cancel.cancelled() => break,
            }
        }

        link.stats.set_connected(false);
        self.links.lock().retain(|l| l.id != link.id);
        info!("[PUB] {} disconnected from {}", link.destination, self.topic());
    }

    pub fn stats(&self) -> TopicStats {
        TopicStats {
            topic: self.topic().to_string(),
            connections: self.links.lock().iter().map(|l| l.stats.snapshot(l.id)).collect(),
        }
    }

    pub fn bus_info(&self) -> Vec<BusInfo> {
        self.links
            .lock()
            .iter()
            .map(|l| BusInfo {
                connection_id: l.id,
                destination: l.destination.clone(),
                direction: "o".to_string(),
                transport: TCPROS.to_string(),
                topic: self.topic().to_string(),
                connected: l.stats.is_connected(),
            })
            .collect()
    }

    /// Close every subscriber connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
