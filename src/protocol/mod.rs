//! The `protocol` module defines the wire format shared by the broker and its
//! clients.
//!
//! Every connection carries exactly one command frame in one direction and one
//! response frame in the other. The bodies defined here are wrapped in a
//! length prefix by [`crate::transport`].

pub mod message;

pub use message::{
    Command, CommandCode, MAX_TOPIC_LEN, PORT_TOPIC, Resolution, Response, decode_command, decode_response,
    encode_command, encode_response,
};
