//! # Correlated Transport
//!
//! Sends each message as a tagged frame on a `Fabric` and, unless the message
//! is one-way, waits on the same channel for the frame carrying its response
//! tag.
//!
//! ## Invariants
//!
//! - Every request opens a fresh channel; channels are never pooled.
//! - The channel subscribes to the response tag before the request is sent.
//! - The channel is dropped (and unsubscribed) on every exit path, including
//!   timeouts and errors.

use std::sync::Arc;
use std::time::Duration;

use xdrpc::Message;
use xdrpc::Reply;
use xdrpc::codec;

use crate::fabric::Fabric;
use crate::fabric::TagFilter;
use crate::transport;
use crate::transport::Transport;

pub struct CorrelatedTransport {
    fabric: Arc<dyn Fabric>,
    recv_timeout: Option<Duration>,
}

impl CorrelatedTransport {
    pub fn new(fabric: Arc<dyn Fabric>) -> Self {
        Self {
            fabric,
            recv_timeout: None,
        }
    }

    /// Bounds how long a round trip waits for its reply. Without this the
    /// transport waits indefinitely.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl Transport for CorrelatedTransport {
    async fn send(&self, message: &Message, one_way: bool) -> transport::Result<Option<Reply>> {
        let payload = codec::encode_message(message)?;
        let tag = message.tag();

        if one_way {
            let channel = self.fabric.open(TagFilter::None).await?;
            channel.send(tag, payload).await?;
            tracing::trace!(tag = %tag, "sent one-way frame");
            return Ok(None);
        }

        let response_tag = message.response_tag();
        let mut channel = self.fabric.open(TagFilter::Exact(response_tag)).await?;
        channel.send(tag, payload).await?;
        tracing::trace!(tag = %tag, response = %response_tag, "sent request frame");

        let receive = async {
            loop {
                let frame = channel.recv().await?;
                if frame.tag == response_tag {
                    return Ok::<_, transport::Error>(frame);
                }
                tracing::trace!(tag = %frame.tag, "ignored unrelated frame");
            }
        };

        let frame = match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, receive)
                .await
                .map_err(|_| transport::Error::Timeout)??,
            None => receive.await?,
        };

        let reply = codec::decode_reply(&frame.payload)?;
        Ok(Some(reply))
    }
}
