use std::collections::VecDeque;

/// A finite, ordered supply of client ports.
///
/// Ports are handed out front to back and never returned, so one pool never
/// issues the same port twice.
#[derive(Debug, Default)]
pub struct PortPool {
    ports: VecDeque<u16>,
}

impl PortPool {
    /// Pool of up to `size` sequential ports starting right above `control_port`.
    ///
    /// The range stops at `u16::MAX`.
    pub fn above(control_port: u16, size: u16) -> Self {
        let first = u32::from(control_port) + 1;
        let last = (first + u32::from(size)).min(u32::from(u16::MAX) + 1);
        let ports = (first..last).filter_map(|p| u16::try_from(p).ok()).collect();
        Self { ports }
    }

    pub fn take(&mut self) -> Option<u16> {
        self.ports.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.ports.len()
    }
}
