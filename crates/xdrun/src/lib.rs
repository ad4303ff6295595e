//! # xdrun
//!
//! Runtime for calling objects that live on the other side of a trust
//! boundary.
//!
//! The client side is `shadow::Shadow`: it keeps local object identity in a
//! `registry::ClientRegistry`, builds `xdrpc::Message`s, and ships them over
//! a `transport::Transport`, either `direct::DirectTransport` (in-process,
//! through a `names::NameService`) or `correlated::CorrelatedTransport`
//! (tagged frames on a `fabric::Fabric`).
//!
//! The server side is `server::Server`, a loop that feeds each request into a
//! `dispatch::Dispatcher`, which keeps live objects in a `table::InstanceTable`
//! and resolves members through a `catalog::TypeCatalog`.

pub mod catalog;
pub mod config;
pub mod correlated;
pub mod direct;
pub mod dispatch;
pub mod fabric;
pub mod logging;
pub mod names;
pub mod policy;
pub mod registry;
pub mod server;
pub mod shadow;
pub mod table;
pub mod transport;

#[cfg(test)]
mod tests;
