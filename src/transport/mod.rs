//! The `transport` module is responsible for moving frames over TCP.
//!
//! Every exchange in the system uses a fresh, short-lived connection carrying
//! exactly one length-prefixed frame in each direction. The helpers here are
//! used identically by the broker (control connections and outbound
//! deliveries) and by clients (control requests and inbound deliveries).

pub mod framed;

pub use framed::{Connection, DEFAULT_MAX_FRAME_LEN, receive, receive_limited, request, send};
