//! Broker engine
//!
//! This module contains the in-memory broker state responsible for:
//! - managing topics and their subscriber ports
//! - handing out client ports from a finite pool
//! - keeping a registry of allocated ports
//! - turning a publish into the set of deliveries to perform
//!
//! Concurrency and usage notes:
//! - The API here is synchronous and performs no I/O. The service holds it
//!   behind a `Mutex` and never keeps the lock across an await: deliveries
//!   returned by [`Broker::handle`] are pushed after the lock is released.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::message::Delivery;
use crate::broker::pool::PortPool;
use crate::broker::topic::{SubscriberPort, Topic};
use crate::protocol::{Command, CommandCode, PORT_TOPIC, Response};
use crate::utils::error::BrokerError;

/// Opaque identifier registered for every port allocation.
pub type ClientId = String;

/// Represents the broker that manages topics and client ports
/// Topics are created on first subscription and dropped once their last
/// subscriber leaves
#[derive(Debug, Default)]
pub struct Broker {
    pub topics: HashMap<String, Topic>,
    pub clients: HashMap<ClientId, SubscriberPort>,
    ports: PortPool,
}

impl Broker {
    /// Creates a broker whose port pool holds `pool_size` ports directly
    /// above `control_port`.
    pub fn new(control_port: u16, pool_size: u16) -> Self {
        Self {
            topics: HashMap::new(),
            clients: HashMap::new(),
            ports: PortPool::above(control_port, pool_size),
        }
    }

    /// Takes the next unused port and registers it under a fresh id.
    pub fn allocate_port(&mut self) -> Result<(ClientId, SubscriberPort), BrokerError> {
        let port = self.ports.take().ok_or(BrokerError::PoolExhausted)?;
        let id = format!("client-{}", Uuid::new_v4());
        self.clients.insert(id.clone(), port);
        Ok((id, port))
    }

    /// Subscribes a port to a topic. Automatically creates the topic if it doesn't exist.
    pub fn subscribe(&mut self, topic: &str, port: SubscriberPort) -> bool {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(port)
    }

    /// Unsubscribes a port from a topic
    /// Unknown topics and ports are ignored
    pub fn unsubscribe(&mut self, topic: &str, port: SubscriberPort) -> bool {
        let Some(t) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = t.unsubscribe(port);
        if t.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Snapshot of the ports subscribed to `topic`, empty for unknown topics.
    pub fn subscribers(&self, topic: &str) -> Vec<SubscriberPort> {
        self.topics
            .get(topic)
            .map(|t| t.subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Builds one delivery per current subscriber of `topic`.
    pub fn publish(&self, topic: &str, data: &[u8]) -> Vec<Delivery> {
        self.subscribers(topic)
            .into_iter()
            .map(|port| Delivery {
                port,
                topic: topic.to_string(),
                data: data.to_vec(),
            })
            .collect()
    }

    /// Applies one decoded command and returns the response together with the
    /// deliveries the caller must perform.
    pub fn handle(&mut self, command: Command) -> (Response, Vec<Delivery>) {
        let code = command.code;

        match code {
            CommandCode::Port => match self.allocate_port() {
                Ok((id, port)) => {
                    debug!("allocated port {port} to {id}");
                    (Response::allocated_port(port), Vec::new())
                }
                Err(e) => {
                    warn!("PORT request failed: {e}");
                    (Response::err(code, PORT_TOPIC, &e.to_string()), Vec::new())
                }
            },
            CommandCode::Sub | CommandCode::Unsub => {
                let port = match command.port_argument() {
                    Ok(port) => port,
                    Err(e) => {
                        warn!("{code} {} rejected: {e}", command.topic);
                        let response = Response::err(code, command.topic, &e.to_string());
                        return (response, Vec::new());
                    }
                };
                if code == CommandCode::Sub {
                    self.subscribe(&command.topic, port);
                    debug!("port {port} subscribed to {}", command.topic);
                } else {
                    self.unsubscribe(&command.topic, port);
                    debug!("port {port} unsubscribed from {}", command.topic);
                }
                (Response::ok(code, command.topic, Vec::new()), Vec::new())
            }
            CommandCode::Pub => {
                let deliveries = self.publish(&command.topic, &command.data);
                debug!(
                    "publish to {} fans out to {} ports",
                    command.topic,
                    deliveries.len()
                );
                (Response::ok(code, command.topic, Vec::new()), deliveries)
            }
        }
    }

    pub fn remaining_ports(&self) -> usize {
        self.ports.remaining()
    }

    pub fn client_port(&self, id: &str) -> Option<SubscriberPort> {
        self.clients.get(id).copied()
    }
}
