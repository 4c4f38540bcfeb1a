//! # portsub
//!
//! `portsub` is a minimalist, topic-based publish/subscribe broker for
//! processes on one host. Clients reach the broker over TCP on loopback to
//! publish data to named topics and to subscribe; the broker pushes every
//! published payload to each subscriber on a port it assigned to that client.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `protocol`: Command codes and the layout of command and response frames.
//! - `transport`: Length-prefixed framing and short-lived TCP exchanges.
//! - `broker`: The topic table, the client port pool and the broker service.
//! - `client`: The per-process handle that sends commands and receives deliveries.
//! - `config`: Handles loading and managing configuration.
//! - `utils`: Error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use broker::Service;
pub use client::Client;

#[cfg(test)]
mod tests;
