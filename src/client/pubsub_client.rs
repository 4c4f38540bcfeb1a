use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::Stream;
use futures::stream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::client::listener::delivery_loop;
use crate::client::queue::DeliveryQueue;
use crate::config::ClientSettings;
use crate::protocol::{Command, MAX_TOPIC_LEN, Response, decode_response};
use crate::transport::request;
use crate::utils::error::{ClientError, TransportError};

/// A per-process handle on a broker.
///
/// The client sends SUB/UNSUB/PUB/PORT commands over short-lived control
/// connections and, once [`Client::start_consuming`] has been called, listens
/// on its own port for payloads the broker pushes to it. Delivered payloads
/// are queued until one of the `get*` methods consumes them.
#[derive(Debug)]
pub struct Client {
    control_addr: SocketAddr,
    settings: ClientSettings,

    /// Allocated by the broker at most once per client.
    assigned_port: OnceCell<u16>,

    queue: Arc<DeliveryQueue>,
    receiving: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn new(control_addr: SocketAddr) -> Self {
        Self::with_settings(control_addr, ClientSettings::default())
    }

    pub fn with_settings(control_addr: SocketAddr, settings: ClientSettings) -> Self {
        Self {
            control_addr,
            settings,
            assigned_port: OnceCell::new(),
            queue: Arc::new(DeliveryQueue::new()),
            receiving: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
        }
    }

    /// The assigned port, if one was already allocated.
    pub fn port(&self) -> Option<u16> {
        self.assigned_port.get().copied()
    }

    /// Returns the port the broker assigned to this client, asking for one on
    /// first use.
    pub async fn get_port(&self) -> Result<u16, ClientError> {
        self.assigned_port
            .get_or_try_init(|| async {
                let response = self.send(Command::port()).await?;
                let port = response.port()?;
                info!("broker {} assigned port {port}", self.control_addr);
                Ok::<_, ClientError>(port)
            })
            .await
            .copied()
    }

    /// Starts listening for deliveries on the assigned port.
    ///
    /// Returns only after a connection to the listener succeeded, so
    /// subscriptions made afterwards cannot lose pushes.
    pub async fn start_consuming(&self) -> Result<u16, ClientError> {
        let port = self.get_port().await?;

        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(port);
        }

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        *slot = Some(tokio::spawn(delivery_loop(
            listener,
            self.queue.clone(),
            self.settings.max_frame_len,
            self.settings.request_timeout(),
        )));
        drop(slot);

        let limit = self.settings.request_timeout();
        let probe = timeout(limit, TcpStream::connect((Ipv4Addr::LOCALHOST, port)))
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        drop(probe);

        info!("consuming deliveries on port {port}");
        Ok(port)
    }

    /// Stops accepting deliveries. Already queued payloads stay available.
    pub async fn stop_consuming(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
            debug!("stopped consuming deliveries");
        }
    }

    /// Subscribes this client's port to `topic`.
    ///
    /// The topic is validated before any network I/O happens.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        validate_topic(topic)?;
        let port = self.get_port().await?;
        self.send(Command::subscribe(topic, port)).await?;
        Ok(())
    }

    /// Removes this client's port from `topic`; not being subscribed is fine.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        let port = self.get_port().await?;
        self.send(Command::unsubscribe(topic, port)).await?;
        Ok(())
    }

    /// Publishes `data` to `topic`.
    ///
    /// Returns once the broker accepted the command, not once subscribers
    /// received it.
    pub async fn publish(&self, topic: &str, data: impl Into<Vec<u8>>) -> Result<(), ClientError> {
        self.send(Command::publish(topic, data)).await?;
        Ok(())
    }

    /// Pops one delivered payload.
    ///
    /// `Some(Duration::ZERO)` polls without waiting, `None` waits
    /// indefinitely, any other value waits at most that long.
    pub async fn get(&self, timeout: Option<Duration>) -> Option<Vec<u8>> {
        self.queue.pop_wait(timeout).await
    }

    /// Drains every payload queued right now, without waiting.
    pub fn get_all(&self) -> Vec<Vec<u8>> {
        self.queue.drain()
    }

    /// Streams delivered payloads until [`Client::stop_getting`] is called.
    ///
    /// Every call starts a new session. The queue is polled every
    /// `poll_interval`, which bounds how long a stop takes to be noticed.
    pub fn get_iter(&self) -> impl Stream<Item = Vec<u8>> + Send + 'static {
        self.receiving.store(true, Ordering::SeqCst);
        let session = (
            self.queue.clone(),
            self.receiving.clone(),
            self.settings.poll_interval(),
        );

        stream::unfold(session, |(queue, receiving, interval)| async move {
            loop {
                if !receiving.load(Ordering::SeqCst) {
                    return None;
                }
                if let Some(item) = queue.try_pop() {
                    return Some((item, (queue, receiving, interval)));
                }
                sleep(interval).await;
            }
        })
    }

    /// Ends the stream returned by [`Client::get_iter`] at its next poll.
    pub fn stop_getting(&self) {
        self.receiving.store(false, Ordering::SeqCst);
    }

    /// Number of payloads waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    async fn send(&self, command: Command) -> Result<Response, ClientError> {
        let frame = command.encode()?;
        let reply = request(
            self.control_addr,
            &frame,
            self.settings.request_timeout(),
            self.settings.max_frame_len,
        )
        .await?;
        let response = decode_response(&reply)?;

        if !response.is_ok() {
            let reason = response.reason();
            warn!("{} {} failed: {reason}", command.code, command.topic);
            return Err(ClientError::Rejected {
                code: command.code,
                reason,
            });
        }
        if response.code != Some(command.code) {
            return Err(ClientError::UnexpectedCode {
                sent: command.code,
                received: response.code,
            });
        }
        Ok(response)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

/// Accepts topics made of ASCII letters, digits, `_` and `-` that fit the
/// wire's topic length field.
pub fn validate_topic(topic: &str) -> Result<(), ClientError> {
    let valid = !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ClientError::InvalidTopic(topic.to_string()))
    }
}
