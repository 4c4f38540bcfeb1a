//! Inbound side of a client: the broker opens one connection per delivered
//! message, sends one frame and waits for a short acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::queue::DeliveryQueue;
use crate::protocol::{Response, decode_command};
use crate::transport::Connection;
use crate::utils::error::TransportError;

/// Accepts deliveries until the task is aborted.
///
/// A connection that sends nothing within `read_timeout` is closed.
pub(crate) async fn delivery_loop(
    listener: TcpListener,
    queue: Arc<DeliveryQueue>,
    max_frame_len: usize,
    read_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let conn = Connection::accepted(stream, peer).with_max_frame_len(max_frame_len);
                tokio::spawn(receive_delivery(conn, queue.clone(), read_timeout));
            }
            Err(e) => warn!("failed to accept delivery: {e}"),
        }
    }
}

async fn receive_delivery(mut conn: Connection, queue: Arc<DeliveryQueue>, read_timeout: Duration) {
    let peer = conn.peer();
    let received = match timeout(read_timeout, conn.receive()).await {
        Ok(received) => received,
        Err(_) => {
            warn!("no delivery from {peer} within {read_timeout:?}, closing");
            conn.close().await;
            return;
        }
    };
    let frame = match received {
        Ok(frame) => frame,
        // readiness self-check
        Err(TransportError::NoData) => return,
        Err(e) => {
            warn!("dropping delivery from {peer}: {e}");
            return;
        }
    };
    let command = match decode_command(&frame) {
        Ok(command) => command,
        Err(e) => {
            warn!("dropping delivery from {peer}: {e}");
            return;
        }
    };

    debug!("received {} bytes on {}", command.data.len(), command.topic);
    queue.push(command.data);

    let ack = Response::ok(command.code, command.topic, Vec::new());
    match ack.encode() {
        Ok(frame) => {
            if let Err(e) = conn.send(&frame).await {
                debug!("failed to acknowledge delivery from {peer}: {e}");
            }
        }
        Err(e) => warn!("failed to encode acknowledgement: {e}"),
    }
    conn.close().await;
}
