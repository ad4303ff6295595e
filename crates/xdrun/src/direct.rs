//! # Direct Transport
//!
//! Calls a named endpoint in-process. The endpoint is resolved on first use
//! and cached for the transport's lifetime; a failed resolution is not
//! cached, so the next call tries again.

use std::sync::Arc;

use tokio::sync::OnceCell;
use xdrpc::Message;
use xdrpc::Reply;

use crate::names::Endpoint;
use crate::names::NameService;
use crate::transport;
use crate::transport::Transport;

pub struct DirectTransport {
    names: Arc<NameService>,
    endpoint_name: String,
    endpoint: OnceCell<Arc<dyn Endpoint>>,
}

impl DirectTransport {
    pub fn new(names: Arc<NameService>, endpoint_name: impl Into<String>) -> Self {
        Self {
            names,
            endpoint_name: endpoint_name.into(),
            endpoint: OnceCell::new(),
        }
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    /// Whether the endpoint has been resolved yet.
    pub fn is_resolved(&self) -> bool {
        self.endpoint.initialized()
    }

    async fn resolve(&self) -> transport::Result<&Arc<dyn Endpoint>> {
        self.endpoint
            .get_or_try_init(|| async {
                let endpoint = self
                    .names
                    .lookup(&self.endpoint_name)
                    .map_err(|e| transport::Error::Unavailable(e.to_string()))?;
                tracing::debug!(endpoint = %self.endpoint_name, "resolved direct endpoint");
                Ok::<_, transport::Error>(endpoint)
            })
            .await
    }
}

#[async_trait::async_trait]
impl Transport for DirectTransport {
    async fn send(&self, message: &Message, one_way: bool) -> transport::Result<Option<Reply>> {
        let endpoint = self.resolve().await?;
        let reply = endpoint.call(message.clone()).await;

        if one_way {
            return Ok(None);
        }

        match reply {
            Some(reply) => Ok(Some(reply)),
            None => Err(transport::Error::ConnectionLost(format!(
                "{} returned no reply to a {}",
                self.endpoint_name,
                message.kind()
            ))),
        }
    }
}
