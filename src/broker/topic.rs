use std::collections::HashSet;

/// Subscribers are identified by the client port deliveries are pushed to.
pub type SubscriberPort = u16;

/// Represents a topic in the broker system
/// Contains a name and the set of subscriber ports
/// A port appears at most once, so re-subscribing has no effect
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<SubscriberPort>,
}

impl Topic {
    /// Creates a new instance of the Topic with the given name
    /// Initializes an empty set of subscribers
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Adds the port to the set of subscribers
    /// Returns false if it was already subscribed
    pub fn subscribe(&mut self, port: SubscriberPort) -> bool {
        self.subscribers.insert(port)
    }

    /// Removes the port from the set of subscribers
    /// If the port is not subscribed, it has no effect
    pub fn unsubscribe(&mut self, port: SubscriberPort) -> bool {
        self.subscribers.remove(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
