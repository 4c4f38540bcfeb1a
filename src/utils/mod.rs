//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `portsub` crate.
//!
//! This module centralizes the error taxonomy shared by the protocol, transport,
//! broker and client layers, along with logging initialisation.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;
