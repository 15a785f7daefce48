//! Matchpoint bookkeeping.
//!
//! Software breakpoints overwrite the instruction at their address with
//! EBREAK; this table remembers the original bytes so `z` can put them
//! back. Hardware kinds are recorded with a zero value purely so insert
//! and remove stay paired.

use std::collections::HashMap;

use rvgs_target::MatchKind;

/// Associative store keyed by (kind, address).
#[derive(Debug, Default)]
pub struct MatchpointTable {
    map: HashMap<(MatchKind, u64), u32>,
}

impl MatchpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a matchpoint. A key that is already present is left
    /// untouched and `false` is returned.
    pub fn add(&mut self, kind: MatchKind, addr: u64, instr: u32) -> bool {
        use std::collections::hash_map::Entry;
        match self.map.entry((kind, addr)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(instr);
                true
            }
        }
    }

    pub fn lookup(&self, kind: MatchKind, addr: u64) -> Option<u32> {
        self.map.get(&(kind, addr)).copied()
    }

    /// Remove a matchpoint, returning the stored instruction bytes, or
    /// `None` if no such matchpoint was set.
    pub fn remove(&mut self, kind: MatchKind, addr: u64) -> Option<u32> {
        self.map.remove(&(kind, addr))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
