//! The `client` module defines the handle processes use to talk to a broker.
//!
//! A [`Client`] plays two roles: it sends control commands to the broker, and
//! it runs a small listener on its assigned port that receives pushed
//! deliveries and queues them for the consumption APIs.

mod listener;
pub mod pubsub_client;
pub mod queue;

pub use pubsub_client::{Client, validate_topic};
pub use queue::DeliveryQueue;
