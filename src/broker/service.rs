//! Broker service
//!
//! Owns the control listener and the lifecycle of one broker instance:
//! - binds the control port, probing downward when it is taken
//! - serves every control connection on its own task
//! - pushes published payloads to subscribers, one short-lived connection
//!   per subscriber, without waiting for the outcome
//! - stops when its cancellation channel fires

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::engine::Broker;
use crate::broker::message::Delivery;
use crate::config::BrokerSettings;
use crate::protocol::{Command, Response, decode_command};
use crate::transport::{Connection, request};
use crate::utils::error::{BrokerError, TransportError};

type Ready = Result<(SocketAddr, Arc<Mutex<Broker>>), BrokerError>;

/// A broker instance that can be started and stopped from the owning task.
///
/// All state lives on the instance; two services in one process share nothing.
#[derive(Debug)]
pub struct Service {
    settings: BrokerSettings,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    addr: SocketAddr,
    broker: Arc<Mutex<Broker>>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Service {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            running: None,
        }
    }

    /// Spawns the control loop and returns once the broker accepts connections.
    ///
    /// Waits for the loop to report its bound address, then proves it is
    /// reachable by opening and closing one connection.
    pub async fn start(&mut self) -> Result<SocketAddr, BrokerError> {
        if self.running.is_some() {
            return Err(BrokerError::AlreadyRunning);
        }

        let limit = self.settings.startup_timeout();
        let (ready_tx, ready_rx) = oneshot::channel::<Ready>();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(control_loop(self.settings.clone(), ready_tx, stop_rx));

        let (addr, broker) = match timeout(limit, ready_rx).await {
            Ok(Ok(Ok(ready))) => ready,
            Ok(Ok(Err(e))) => {
                let _ = handle.await;
                return Err(e);
            }
            Ok(Err(_)) | Err(_) => {
                handle.abort();
                return Err(BrokerError::StartupTimeout(limit));
            }
        };

        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(probe)) => drop(probe),
            _ => {
                let _ = stop_tx.send(true);
                let _ = handle.await;
                return Err(BrokerError::Unreachable(addr));
            }
        }

        info!("broker ready on {addr}");
        self.running = Some(Running {
            addr,
            broker,
            stop: stop_tx,
            handle,
        });
        Ok(addr)
    }

    /// Signals the control loop and waits until it has exited.
    ///
    /// Deliveries already dispatched keep running to completion.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop.send(true);
        if let Err(e) = running.handle.await {
            error!("broker loop on {} ended abnormally: {e}", running.addr);
        }
        info!("broker on {} stopped", running.addr);
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Shared handle to the broker state of the running instance.
    pub fn state(&self) -> Option<Arc<Mutex<Broker>>> {
        self.running.as_ref().map(|r| r.broker.clone())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            let _ = running.stop.send(true);
        }
    }
}

/// Binds `host:port`, stepping the port down by `step` while it is in use.
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    step: u16,
) -> Result<TcpListener, BrokerError> {
    let mut candidate = port;
    loop {
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if candidate != port {
                    info!("control port {port} is busy, using {candidate}");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("control port {candidate} is in use");
                candidate = match candidate.checked_sub(step) {
                    Some(next) if step > 0 && next > 0 => next,
                    _ => return Err(BrokerError::NoFreePort { start: port }),
                };
            }
            Err(source) => {
                return Err(BrokerError::Bind {
                    port: candidate,
                    source,
                });
            }
        }
    }
}

async fn control_loop(
    settings: BrokerSettings,
    ready: oneshot::Sender<Ready>,
    mut stop: watch::Receiver<bool>,
) {
    let bound = bind_with_fallback(&settings.host, settings.control_port, settings.port_probe_step)
        .await
        .and_then(|listener| Ok((listener.local_addr()?, listener)));
    let (addr, listener) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let broker = Arc::new(Mutex::new(Broker::new(
        addr.port(),
        settings.port_pool_size,
    )));
    if ready.send(Ok((addr, broker.clone()))).is_err() {
        return;
    }
    info!("broker listening on {addr}");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let conn = Connection::accepted(stream, peer)
                        .with_max_frame_len(settings.max_frame_len);
                    tokio::spawn(serve_connection(conn, broker.clone(), settings.clone()));
                }
                Err(e) => warn!("accept on {addr} failed: {e}"),
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    info!("broker on {addr} shutting down");
}

/// Serves one control connection: one command in, one response out.
async fn serve_connection(mut conn: Connection, broker: Arc<Mutex<Broker>>, settings: BrokerSettings) {
    let peer = conn.peer();
    let limit = settings.read_timeout();
    let received = match timeout(limit, conn.receive()).await {
        Ok(received) => received,
        Err(_) => {
            warn!("no request from {peer} within {limit:?}, closing");
            conn.close().await;
            return;
        }
    };
    let frame = match received {
        Ok(frame) => frame,
        // reachability probes connect and leave
        Err(TransportError::NoData) => return,
        Err(e) if e.is_malformed() => {
            warn!("invalid message from {peer}: {e}");
            reply(&mut conn, &Response::invalid_message()).await;
            conn.close().await;
            return;
        }
        Err(e) => {
            warn!("failed to read request from {peer}: {e}");
            return;
        }
    };

    let command = match decode_command(&frame) {
        Ok(command) => command,
        Err(e) => {
            warn!("invalid message from {peer}: {e}");
            reply(&mut conn, &Response::invalid_message()).await;
            conn.close().await;
            return;
        }
    };
    debug!("{} {} from {peer}", command.code, command.topic);

    let (response, deliveries) = broker
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .handle(command);

    for delivery in deliveries {
        tokio::spawn(deliver(
            delivery,
            settings.delivery_timeout(),
            settings.max_frame_len,
        ));
    }

    reply(&mut conn, &response).await;
    conn.close().await;
}

async fn reply(conn: &mut Connection, response: &Response) {
    let frame = match response.encode() {
        Ok(frame) => frame,
        Err(e) => {
            error!("failed to encode response: {e}");
            return;
        }
    };
    if let Err(e) = conn.send(&frame).await {
        warn!("failed to answer {}: {e}", conn.peer());
    }
}

/// Pushes one payload to one subscriber. Failures are logged and dropped.
async fn deliver(delivery: Delivery, limit: Duration, max_frame_len: usize) {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, delivery.port));
    let frame = match Command::publish(&delivery.topic, delivery.data).encode() {
        Ok(frame) => frame,
        Err(e) => {
            error!("failed to encode delivery for {}: {e}", delivery.topic);
            return;
        }
    };

    match request(addr, &frame, limit, max_frame_len).await {
        Ok(_) => debug!("delivered {} to port {}", delivery.topic, delivery.port),
        Err(e) => warn!(
            "delivery of {} to port {} failed: {e}",
            delivery.topic, delivery.port
        ),
    }
}
