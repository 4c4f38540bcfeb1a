use crate::broker::topic::SubscriberPort;

/// One pending push of a published payload to one subscriber.
///
/// Produced by [`crate::broker::Broker::handle`] for every subscriber of the
/// published topic. The service performs the network I/O after releasing the
/// broker lock.
///
/// # Fields
///
/// - `port` - The loopback port the subscriber listens on.
/// - `topic` - The topic the payload was published to.
/// - `data` - The published payload, unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub port: SubscriberPort,
    pub topic: String,
    pub data: Vec<u8>,
}
