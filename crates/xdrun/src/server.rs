//! # Server Dispatch Loop
//!
//! Pulls request frames off a `Fabric` one at a time, runs each through the
//! `Dispatcher`, and answers on the request's response tag.
//!
//! ## Invariants
//!
//! - One message is handled completely before the next is read.
//! - Every iteration opens its own channel and drops it before the next.
//! - A bad message is logged and skipped. Only a failing fabric stops the loop.
//! - A request that decodes but breaks a shape invariant is answered with
//!   `Unsupported` unless it is one-way.

use std::future::Future;
use std::sync::Arc;

use xdrpc::FailureReason;
use xdrpc::Message;
use xdrpc::Reply;
use xdrpc::codec;

use crate::dispatch::Dispatcher;
use crate::fabric;
use crate::fabric::Fabric;
use crate::fabric::TagFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Fabric(fabric::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fabric(e) => write!(f, "Fabric error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fabric(e) => Some(e),
        }
    }
}

impl From<fabric::Error> for Error {
    fn from(e: fabric::Error) -> Self {
        Self::Fabric(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    fabric: Arc<dyn Fabric>,
}

impl Server {
    pub fn new(dispatcher: Arc<Dispatcher>, fabric: Arc<dyn Fabric>) -> Self {
        Self { dispatcher, fabric }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serves until the fabric fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes or the fabric fails.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("server loop started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("server loop stopped");
                    return Ok(());
                }
                res = self.serve_one() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "server loop failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Receives and handles exactly one request frame.
    pub async fn serve_one(&self) -> Result<()> {
        let mut channel = self.fabric.open(TagFilter::Requests).await?;
        let frame = channel.recv().await?;

        let message: Message = match codec::deserialize(&frame.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(tag = %frame.tag, error = %e, "dropped undecodable request");
                return Ok(());
            }
        };

        let tag = message.tag();
        if tag != frame.tag {
            tracing::warn!(tag = %frame.tag, expected = %tag, "request arrived under a foreign tag");
        }

        // A caller waiting on a malformed request still gets an answer.
        let reply = match message.validate() {
            Ok(()) => self.dispatcher.dispatch(&message),
            Err(e) => {
                tracing::warn!(tag = %frame.tag, class = %message.class_name(), error = %e, "rejected malformed request");
                (!message.is_one_way()).then_some(Reply::Err(FailureReason::Unsupported))
            }
        };
        let Some(reply) = reply else {
            return Ok(());
        };

        let payload = match codec::encode_reply(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "could not encode reply");
                return Ok(());
            }
        };

        channel.send(message.response_tag(), payload).await?;
        tracing::trace!(tag = %message.response_tag(), "sent reply");
        Ok(())
    }
}
