//! OpenSPA ADK Common - Single Source of Truth for the XDP gate
//!
//! This crate contains everything shared between:
//! - ospa-ebpf (XDP program)
//! - ospa-cli (userspace loader / control plane)
//! - verification (property tests, Kani proofs, fuzzing)
//!
//! Besides the map layouts it also carries the packet parsers and the
//! decision pipeline itself, so the exact code that runs under XDP can be
//! exercised on the host.
//!
//! IMPORTANT: Any change here affects ALL components!

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod cursor;
pub mod headers;
pub mod parsing;
pub mod pipeline;
pub mod proof;
pub mod stats;

pub use config::{ConfigStore, ConfigTable};
pub use cursor::{HdrCursor, ParseError};
pub use pipeline::{classify, process_packet, Reason, Verdict};
pub use proof::{adk_proof_valid, ProofCheck};
pub use stats::{AdkStats, StatsRecord, StatsSink, StatsTables};

#[cfg(feature = "user")]
use serde::{Deserialize, Serialize};

// ============================================================
// STATISTICS RECORDS (Per-CPU map values)
// ============================================================

/// Per-action counters, one entry per XDP action in `XDP_STATS_MAP`
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Debug, Serialize, Deserialize))]
#[repr(C)]
pub struct StatsDatarec {
    pub rx_packets: u64,  // Packets that ended with this action
    pub rx_bytes: u64,    // Sum of frame lengths (data_end - data)
}                         // Total: 16 bytes

/// Scheme event counter, one entry per `OspaStatId` in `XDP_OPENSPA_STATS_MAP`
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Debug, Serialize, Deserialize))]
#[repr(C)]
pub struct OspaStatDatarec {
    pub value: u64,
}

// ============================================================
// XDP ACTIONS
// ============================================================

/// Final disposition of a frame. Discriminants match the kernel's
/// `enum xdp_action`, so `as u32` is the program's return value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum XdpAction {
    Aborted = 0,
    Drop = 1,
    Pass = 2,
    Tx = 3,
    Redirect = 4,
}

pub const XDP_ACTION_MAX: usize = 5;

impl XdpAction {
    pub const ALL: [XdpAction; XDP_ACTION_MAX] = [
        XdpAction::Aborted,
        XdpAction::Drop,
        XdpAction::Pass,
        XdpAction::Tx,
        XdpAction::Redirect,
    ];

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(XdpAction::Aborted),
            1 => Some(XdpAction::Drop),
            2 => Some(XdpAction::Pass),
            3 => Some(XdpAction::Tx),
            4 => Some(XdpAction::Redirect),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            XdpAction::Aborted => "XDP_ABORTED",
            XdpAction::Drop => "XDP_DROP",
            XdpAction::Pass => "XDP_PASS",
            XdpAction::Tx => "XDP_TX",
            XdpAction::Redirect => "XDP_REDIRECT",
        }
    }
}

// ============================================================
// OPENSPA EVENT IDS
// ============================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum OspaStatId {
    NotOpenspaPacket = 0,  // Addressed to the server port but not OpenSPA
    AdkProofInvalid = 1,   // Zero, unknown or unverifiable proof
    AdkProofValid = 2,     // Proof found in the allow-list
}

pub const OSPA_STAT_ID_MAX: usize = 3;

impl OspaStatId {
    pub const ALL: [OspaStatId; OSPA_STAT_ID_MAX] = [
        OspaStatId::NotOpenspaPacket,
        OspaStatId::AdkProofInvalid,
        OspaStatId::AdkProofValid,
    ];

    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

// ============================================================
// CONFIG MAP LAYOUT
// ============================================================
//   0: OpenSPA UDP server port (host order, 0 = unset)
//   1: ADK proof array, first index
//   ...
//   CONFIG_MAP_IDX_ADK_PROOF_LAST: ADK proof array, last index

pub const CONFIG_MAP_IDX_OPENSPA_SERVER_PORT: u32 = 0;
pub const CONFIG_MAP_IDX_ADK_PROOF_FIRST: u32 = 1;
pub const CONFIG_MAP_IDX_ADK_PROOF_LAST: u32 = 2;

/// Number of allow-listed proofs (current + next TOTP step)
pub const ADK_PROOF_SLOTS: usize =
    (CONFIG_MAP_IDX_ADK_PROOF_LAST - CONFIG_MAP_IDX_ADK_PROOF_FIRST + 1) as usize;
pub const CONFIG_MAP_SIZE: usize = CONFIG_MAP_IDX_ADK_PROOF_LAST as usize + 1;

// ============================================================
// MAP NAMES (as declared in ospa-ebpf)
// ============================================================

pub const MAP_XDP_STATS: &str = "XDP_STATS_MAP";
pub const MAP_XDP_OPENSPA_STATS: &str = "XDP_OPENSPA_STATS_MAP";
pub const MAP_XDP_CONFIG: &str = "XDP_CONFIG_MAP";
pub const PROGRAM_NAME: &str = "xdp_openspa_adk";

// ============================================================
// PROTOCOL CONSTANTS
// ============================================================

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_8021Q: u16 = 0x8100;
pub const ETH_P_8021AD: u16 = 0x88A8;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// VLAN tags unwrapped before giving up (fixed loop bound)
pub const VLAN_MAX_DEPTH: usize = 2;
pub const VLAN_VID_MASK: u16 = 0x0fff;

// ============================================================
// OPENSPA HEADER CONSTANTS
// ============================================================

pub const OSPA_CTRL_VERSION: u8 = 2;
pub const OSPA_CTRL_VERSION_MASK: u8 = 0x70;
pub const OSPA_CTRL_VERSION_OFFSET: u8 = 4;
/// Empirically the lowest bound, not protocol wise
pub const OSPA_BODY_MIN_SIZE: usize = 42;

// ============================================================
// AYA POD IMPLEMENTATIONS (userspace only)
// ============================================================

#[cfg(feature = "user")]
unsafe impl aya::Pod for StatsDatarec {}

#[cfg(feature = "user")]
unsafe impl aya::Pod for OspaStatDatarec {}

const _: () = {
    assert!(core::mem::size_of::<StatsDatarec>() == 16);
    assert!(core::mem::size_of::<OspaStatDatarec>() == 8);
    assert!(ADK_PROOF_SLOTS == 2);
    assert!(CONFIG_MAP_SIZE == 1 + ADK_PROOF_SLOTS);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip_and_names() {
        for action in XdpAction::ALL {
            assert_eq!(XdpAction::from_u32(action.as_u32()), Some(action));
        }
        assert_eq!(XdpAction::from_u32(XDP_ACTION_MAX as u32), None);
        assert_eq!(XdpAction::Pass.name(), "XDP_PASS");
        assert_eq!(XdpAction::Aborted.as_u32(), 0);
    }

    #[test]
    fn test_stat_ids_are_dense() {
        for (i, id) in OspaStatId::ALL.iter().enumerate() {
            assert_eq!(id.as_u32() as usize, i);
        }
    }
}
