use std::sync::atomic::{AtomicU16, Ordering};


/// Gap between control ports handed to test brokers. Wider than the default
/// pool plus one fallback step, so neighbouring brokers never share ports.
const CONTROL_PORT_GAP: u16 = 250;

static NEXT_CONTROL_PORT: AtomicU16 = AtomicU16::new(21000);

/// A control port below the ephemeral range, distinct per call.
pub(crate) fn next_control_port() -> u16 {
    NEXT_CONTROL_PORT.fetch_add(CONTROL_PORT_GAP, Ordering::Relaxed)
}
