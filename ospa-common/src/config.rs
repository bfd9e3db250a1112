//! Configuration store: the server port and the ADK proof allow-list.
//!
//! The XDP program reads it through `XDP_CONFIG_MAP`; the control plane is
//! the only writer.

use crate::{
    ADK_PROOF_SLOTS, CONFIG_MAP_IDX_ADK_PROOF_FIRST, CONFIG_MAP_IDX_OPENSPA_SERVER_PORT,
    CONFIG_MAP_SIZE,
};

/// Read-only view over the configuration table.
pub trait ConfigStore {
    /// Value at `index`, or `None` when the slot cannot be read.
    /// Out-of-range indices always fail, they never wrap.
    fn lookup(&self, index: u32) -> Option<u32>;
}

/// Configured OpenSPA UDP port, `0` when unset or unreadable.
#[inline(always)]
pub fn openspa_server_port<C: ConfigStore>(config: &C) -> u16 {
    match config.lookup(CONFIG_MAP_IDX_OPENSPA_SERVER_PORT) {
        Some(val) => val as u16,
        None => 0,
    }
}

/// In-memory configuration table with the same layout as `XDP_CONFIG_MAP`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigTable {
    slots: [u32; CONFIG_MAP_SIZE],
}

impl ConfigTable {
    pub const fn new() -> Self {
        Self { slots: [0; CONFIG_MAP_SIZE] }
    }

    pub fn with_server_port(port: u16) -> Self {
        let mut table = Self::new();
        table.set_server_port(port);
        table
    }

    /// Write a raw slot. Returns `false` for an out-of-range index.
    pub fn set(&mut self, index: u32, value: u32) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn set_server_port(&mut self, port: u16) {
        self.slots[CONFIG_MAP_IDX_OPENSPA_SERVER_PORT as usize] = u32::from(port);
    }

    /// Store `proof` in allow-list slot `slot` (0-based). Returns `false`
    /// when `slot` is outside the allow-list.
    pub fn set_adk_proof(&mut self, slot: usize, proof: u32) -> bool {
        if slot >= ADK_PROOF_SLOTS {
            return false;
        }
        self.slots[CONFIG_MAP_IDX_ADK_PROOF_FIRST as usize + slot] = proof;
        true
    }

    pub fn adk_proofs(&self) -> &[u32] {
        let first = CONFIG_MAP_IDX_ADK_PROOF_FIRST as usize;
        &self.slots[first..first + ADK_PROOF_SLOTS]
    }

    /// Raw slots in map index order, ready to be written to the BPF map.
    pub fn slots(&self) -> &[u32; CONFIG_MAP_SIZE] {
        &self.slots
    }
}

impl ConfigStore for ConfigTable {
    #[inline(always)]
    fn lookup(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).copied()
    }
}
