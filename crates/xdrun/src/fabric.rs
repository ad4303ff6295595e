//! # Tagged Message Fabric
//!
//! The send/receive primitive underneath the correlated transport. Frames
//! travel under a `CorrelationTag`; a channel only sees the frames its
//! subscription selects.
//!
//! ## Invariants
//!
//! - A channel is subscribed when `open` returns, so nothing sent after that
//!   point can slip past it.
//! - Dropping a channel releases its subscription. No exit path leaks one.
//!
//! ## MemoryBus
//!
//! The in-process fabric. Request frames queue on the bus until a channel
//! subscribed to `Requests` reads them, so a server that starts listening late
//! still sees them. Response frames are copied to every channel subscribed to
//! exactly their tag, and dropped when nobody is waiting.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use xdrpc::CorrelationTag;

use crate::transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The fabric has been shut down.
    Closed,
    /// `recv` on a channel opened without a receive subscription.
    NotSubscribed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Fabric closed"),
            Self::NotSubscribed => write!(f, "Channel has no receive subscription"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for transport::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Closed => transport::Error::Unavailable("fabric closed".into()),
            other => transport::Error::ConnectionLost(other.to_string()),
        }
    }
}

/// Which frames a channel receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilter {
    /// Only frames carrying exactly this tag.
    Exact(CorrelationTag),
    /// Any request frame; each is delivered to one reader.
    Requests,
    /// Send-only.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFrame {
    pub tag: CorrelationTag,
    pub payload: Vec<u8>,
}

/// Opens channels onto a shared tagged medium.
#[async_trait::async_trait]
pub trait Fabric: Send + Sync + 'static {
    async fn open(&self, filter: TagFilter) -> Result<Box<dyn Channel>>;
}

/// One end of a (send, receive) pair on a fabric.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    async fn send(&self, tag: CorrelationTag, payload: Vec<u8>) -> Result<()>;

    /// Waits for the next frame matching this channel's filter.
    async fn recv(&mut self) -> Result<TaggedFrame>;
}

struct Subscriber {
    tag: CorrelationTag,
    tx: mpsc::UnboundedSender<TaggedFrame>,
}

struct BusInner {
    requests_tx: mpsc::UnboundedSender<TaggedFrame>,
    requests_rx: Mutex<mpsc::UnboundedReceiver<TaggedFrame>>,
    subscribers: DashMap<u64, Subscriber>,
    id_gen: AtomicU64,
    closed: watch::Sender<bool>,
}

impl BusInner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn publish(&self, frame: TaggedFrame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if frame.tag.is_request() {
            tracing::trace!(tag = %frame.tag, "queued request frame");
            return self.requests_tx.send(frame).map_err(|_| Error::Closed);
        }

        let mut delivered = 0;
        for sub in self.subscribers.iter() {
            if sub.tag == frame.tag && sub.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            tracing::trace!(tag = %frame.tag, "dropped response frame with no subscriber");
        }
        Ok(())
    }
}

/// In-process fabric shared by both sides of a boundary.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        Self {
            inner: Arc::new(BusInner {
                requests_tx,
                requests_rx: Mutex::new(requests_rx),
                subscribers: DashMap::new(),
                id_gen: AtomicU64::new(1),
                closed,
            }),
        }
    }

    /// Shuts the bus down. Waiting receivers wake with `Error::Closed`.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    /// Number of live exact-tag subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

#[async_trait::async_trait]
impl Fabric for MemoryBus {
    async fn open(&self, filter: TagFilter) -> Result<Box<dyn Channel>> {
        if self.inner.is_closed() {
            return Err(Error::Closed);
        }

        let mut subscription = None;
        let mut rx = None;
        if let TagFilter::Exact(tag) = filter {
            let id = self.inner.id_gen.fetch_add(1, Ordering::Relaxed);
            let (tx, sub_rx) = mpsc::unbounded_channel();
            self.inner.subscribers.insert(id, Subscriber { tag, tx });
            subscription = Some(id);
            rx = Some(sub_rx);
        }

        Ok(Box::new(BusChannel {
            inner: self.inner.clone(),
            filter,
            subscription,
            rx,
        }))
    }
}

struct BusChannel {
    inner: Arc<BusInner>,
    filter: TagFilter,
    subscription: Option<u64>,
    rx: Option<mpsc::UnboundedReceiver<TaggedFrame>>,
}

#[async_trait::async_trait]
impl Channel for BusChannel {
    async fn send(&self, tag: CorrelationTag, payload: Vec<u8>) -> Result<()> {
        self.inner.publish(TaggedFrame { tag, payload })
    }

    async fn recv(&mut self) -> Result<TaggedFrame> {
        let mut closed = self.inner.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::Closed);
        }

        match self.filter {
            TagFilter::None => Err(Error::NotSubscribed),
            TagFilter::Requests => {
                let mut queue = tokio::select! {
                    guard = self.inner.requests_rx.lock() => guard,
                    _ = closed.wait_for(|c| *c) => return Err(Error::Closed),
                };
                tokio::select! {
                    frame = queue.recv() => frame.ok_or(Error::Closed),
                    _ = closed.wait_for(|c| *c) => Err(Error::Closed),
                }
            }
            TagFilter::Exact(_) => {
                let Some(rx) = self.rx.as_mut() else {
                    return Err(Error::NotSubscribed);
                };
                tokio::select! {
                    frame = rx.recv() => frame.ok_or(Error::Closed),
                    _ = closed.wait_for(|c| *c) => Err(Error::Closed),
                }
            }
        }
    }
}

impl Drop for BusChannel {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.inner.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request_tag(handle: i32) -> CorrelationTag {
        CorrelationTag::request(2, "demo.Foo", "bar", handle)
    }

    #[tokio::test]
    async fn test_requests_queue_until_read() {
        let bus = MemoryBus::new();
        let sender = bus.open(TagFilter::None).await.unwrap();
        sender.send(request_tag(1), vec![1]).await.unwrap();
        sender.send(request_tag(2), vec![2]).await.unwrap();

        // A listener that arrives late still sees both, in order.
        let mut listener = bus.open(TagFilter::Requests).await.unwrap();
        assert_eq!(listener.recv().await.unwrap().payload, vec![1]);
        assert_eq!(listener.recv().await.unwrap().payload, vec![2]);
    }

    #[tokio::test]
    async fn test_response_goes_only_to_exact_subscriber() {
        let bus = MemoryBus::new();
        let wanted = request_tag(5).response();
        let other = request_tag(6).response();

        let mut waiting = bus.open(TagFilter::Exact(wanted)).await.unwrap();
        let sender = bus.open(TagFilter::None).await.unwrap();

        sender.send(other, vec![0xEE]).await.unwrap();
        sender.send(wanted, vec![0xAA]).await.unwrap();

        let frame = waiting.recv().await.unwrap();
        assert_eq!(frame.tag, wanted);
        assert_eq!(frame.payload, vec![0xAA]);
    }

    #[tokio::test]
    async fn test_unsubscribed_response_is_dropped() {
        let bus = MemoryBus::new();
        let tag = request_tag(5).response();
        let sender = bus.open(TagFilter::None).await.unwrap();

        // Nobody waits yet: the frame must not be replayed to a later subscriber.
        sender.send(tag, vec![1]).await.unwrap();

        let mut late = bus.open(TagFilter::Exact(tag)).await.unwrap();
        let res = tokio::time::timeout(Duration::from_millis(50), late.recv()).await;
        assert!(res.is_err(), "late subscriber must not see an earlier response");
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let bus = MemoryBus::new();
        {
            let _a = bus.open(TagFilter::Exact(request_tag(1).response())).await.unwrap();
            let _b = bus.open(TagFilter::Exact(request_tag(2).response())).await.unwrap();
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_send_only_channel_cannot_receive() {
        let bus = MemoryBus::new();
        let mut channel = bus.open(TagFilter::None).await.unwrap();
        assert_eq!(channel.recv().await.err(), Some(Error::NotSubscribed));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let bus = MemoryBus::new();
        let mut listener = bus.open(TagFilter::Requests).await.unwrap();

        let closer = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        assert_eq!(listener.recv().await.err(), Some(Error::Closed));
        assert!(bus.open(TagFilter::Requests).await.is_err());
    }
}
