use super::types::PID_MAX;
use crate::error::{ExtractError, Result};

/// An ordered, bounded set of PIDs kept in discovery order.
///
/// A PID is stored at most once; pushing a PID that is already present is a
/// no-op. Pushing a new PID into a full table fails with
/// [`ExtractError::TooManyPids`] and leaves the table unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidTable {
    name: &'static str,
    capacity: usize,
    pids: Vec<u16>,
}

impl PidTable {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            pids: Vec::with_capacity(capacity),
        }
    }

    /// Appends `pid` unless it is already present.
    ///
    /// Returns `true` if the PID was added.
    pub fn push(&mut self, pid: u16) -> Result<bool> {
        if pid > PID_MAX {
            return Err(ExtractError::InvalidPid(pid));
        }
        if self.contains(pid) {
            return Ok(false);
        }
        if self.pids.len() >= self.capacity {
            return Err(ExtractError::TooManyPids {
                table: self.name,
                capacity: self.capacity,
            });
        }
        self.pids.push(pid);
        Ok(true)
    }

    pub fn contains(&self, pid: u16) -> bool {
        self.pids.contains(&pid)
    }

    pub fn clear(&mut self) {
        self.pids.clear();
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.pids
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.pids.iter().copied()
    }
}
