//! The `broker` module holds the topic table, the client port pool and the
//! service that exposes them over TCP.

pub mod engine;
pub mod message;
pub mod pool;
pub mod service;
pub mod topic;

pub use engine::Broker;
pub use service::Service;

#[cfg(test)]
mod tests;
