//! OpenSPA ADK Verification Module
//!
//! Formal verification and property-based testing for the gate's decision
//! pipeline. The pipeline in `ospa-common` is the exact code the XDP program
//! runs, so everything here exercises production logic on the host.
//!
//! ## Verification Layers:
//! 1. **Kani Model Checking** - Cursor bounds, proof check, verdict/event consistency
//! 2. **Property-Based Testing** - Random frames against the pipeline invariants
//! 3. **Fuzzing** - Coverage-guided mutation of raw frames (see `fuzz/`)

use ospa_common::config::ConfigStore;
use ospa_common::*;

// ============================================================
// INVARIANTS (Properties that MUST always hold)
// ============================================================

/// Per-action map value: packets + bytes
pub const STATS_DATAREC_SIZE_INVARIANT: usize = 16;

/// Per-CPU values must stay u64-aligned
pub const STATS_ALIGNMENT_INVARIANT: usize = 8;

/// Ethernet + IPv4 + UDP + OpenSPA header + minimum body
pub const MIN_OSPA_FRAME_V4: usize = 14 + 20 + 8 + 8 + OSPA_BODY_MIN_SIZE;

// ============================================================
// COMPILE-TIME ASSERTIONS (Zero runtime cost)
// ============================================================

const _: () = {
    assert!(core::mem::size_of::<StatsDatarec>() == STATS_DATAREC_SIZE_INVARIANT);
    assert!(core::mem::align_of::<StatsDatarec>() == STATS_ALIGNMENT_INVARIANT);
    assert!(core::mem::size_of::<OspaStatDatarec>() == 8);

    // Headers are read in place at arbitrary offsets
    assert!(core::mem::size_of::<headers::EthHdr>() == headers::EthHdr::LEN);
    assert!(core::mem::size_of::<headers::VlanHdr>() == headers::VlanHdr::LEN);
    assert!(core::mem::size_of::<headers::Ipv4Hdr>() == headers::Ipv4Hdr::LEN);
    assert!(core::mem::size_of::<headers::Ipv6Hdr>() == headers::Ipv6Hdr::LEN);
    assert!(core::mem::size_of::<headers::UdpHdr>() == headers::UdpHdr::LEN);
    assert!(core::mem::size_of::<headers::OspaHdr>() == headers::OspaHdr::LEN);
    assert!(core::mem::align_of::<headers::OspaHdr>() == 1);

    // Config map: port slot first, proof slots contiguous after it
    assert!(CONFIG_MAP_IDX_OPENSPA_SERVER_PORT == 0);
    assert!(CONFIG_MAP_IDX_ADK_PROOF_FIRST == 1);
    assert!(CONFIG_MAP_IDX_ADK_PROOF_LAST as usize == CONFIG_MAP_SIZE - 1);
};

/// Config store whose proof slots can all be made unreadable.
pub struct FlakyConfig {
    pub table: ConfigTable,
    pub proofs_readable: bool,
}

impl ConfigStore for FlakyConfig {
    fn lookup(&self, index: u32) -> Option<u32> {
        if !self.proofs_readable && index >= CONFIG_MAP_IDX_ADK_PROOF_FIRST {
            return None;
        }
        self.table.lookup(index)
    }
}

/// Build an Ethernet/IPv4/UDP frame to `dst_port` carrying `payload`.
pub fn udp4_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut f = vec![0x02, 0, 0, 0, 0, 1, 0x02, 0, 0, 0, 0, 2, 0x08, 0x00];
    f.extend_from_slice(&[
        0x45, 0, 0, 0, 0, 0, 0, 0, 64, IPPROTO_UDP, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2,
    ]);
    let udp_len = (8 + payload.len()) as u16;
    f.extend_from_slice(&40000u16.to_be_bytes());
    f.extend_from_slice(&dst_port.to_be_bytes());
    f.extend_from_slice(&udp_len.to_be_bytes());
    f.extend_from_slice(&[0, 0]);
    f.extend_from_slice(payload);
    f
}

/// OpenSPA v2 header with `proof` followed by a minimum-size body.
pub fn ospa_payload(proof: u32) -> Vec<u8> {
    let mut p = vec![OSPA_CTRL_VERSION << OSPA_CTRL_VERSION_OFFSET, 0x01, 0x01, 0];
    p.extend_from_slice(&proof.to_be_bytes());
    p.extend(core::iter::repeat(0xAB).take(OSPA_BODY_MIN_SIZE));
    p
}

// ============================================================
// KANI PROOFS (Formal Verification)
// ============================================================

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Prove: the cursor never hands out bytes past the end of the frame
    #[kani::proof]
    #[kani::unwind(3)]
    fn verify_cursor_never_out_of_bounds() {
        let buf: [u8; 16] = kani::any();
        let len: usize = kani::any();
        kani::assume(len <= buf.len());
        let first: usize = kani::any();
        let second: usize = kani::any();

        let mut nh = HdrCursor::new(&buf[..len]);
        if let Ok(bytes) = nh.advance_bytes(first) {
            assert!(bytes.len() == first);
        }
        let _ = nh.advance_bytes(second);
        assert!(nh.offset() <= len);
        assert!(nh.offset() + nh.remaining() == len);
    }

    /// Prove: a zero proof is never valid, whatever the allow-list holds
    #[kani::proof]
    #[kani::unwind(3)]
    fn verify_zero_proof_never_valid() {
        let mut table = ConfigTable::new();
        table.set_adk_proof(0, kani::any());
        table.set_adk_proof(1, kani::any());
        assert!(adk_proof_valid(&table, 0) == ProofCheck::Invalid);
    }

    /// Prove: a proof is valid iff it is non-zero and in the allow-list
    #[kani::proof]
    #[kani::unwind(3)]
    fn verify_proof_match_exact() {
        let a: u32 = kani::any();
        let b: u32 = kani::any();
        let proof: u32 = kani::any();
        let mut table = ConfigTable::new();
        table.set_adk_proof(0, a);
        table.set_adk_proof(1, b);

        let valid = adk_proof_valid(&table, proof).is_valid();
        assert!(valid == (proof != 0 && (proof == a || proof == b)));
    }

    /// Prove: a sub-Ethernet frame is aborted, counted once and raises no event
    #[kani::proof]
    fn verify_short_frame_aborted() {
        let frame: [u8; 8] = kani::any();
        let table = ConfigTable::with_server_port(kani::any());
        let mut stats = StatsTables::new();
        let mut nh = HdrCursor::new(&frame);

        let v = process_packet(&mut nh, &table, &mut stats);
        assert!(v.action == XdpAction::Aborted);
        assert!(v.reason.event().is_none());
        assert!(stats.action(XdpAction::Aborted).rx_packets == 1);
    }
}

// ============================================================
// PROPERTY-BASED TESTS (proptest)
// ============================================================


// ============================================================
// DETERMINISTIC UNIT TESTS
// ============================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(core::mem::size_of::<StatsDatarec>(), 16);
        assert_eq!(core::mem::size_of::<OspaStatDatarec>(), 8);
        assert_eq!(core::mem::size_of::<headers::OspaHdr>(), 8);
    }

    #[test]
    fn test_frame_builder_layout() {
        let frame = udp4_frame(22211, &ospa_payload(1));
        assert_eq!(frame.len(), MIN_OSPA_FRAME_V4);
        assert_eq!(&frame[36..38], &22211u16.to_be_bytes());
    }

    #[test]
    fn test_minimum_frame_is_openspa() {
        let mut table = ConfigTable::with_server_port(22211);
        table.set_adk_proof(0, 7);
        let frame = udp4_frame(22211, &ospa_payload(7));
        let v = classify(&mut HdrCursor::new(&frame), &table);
        assert_eq!(v.reason, Reason::ProofValid);

        // One byte short of the minimum body
        let short = &frame[..frame.len() - 1];
        let v = classify(&mut HdrCursor::new(short), &table);
        assert_eq!(v, Verdict { action: XdpAction::Drop, reason: Reason::NotOpenspa });
    }

    #[test]
    fn test_flaky_config_keeps_port() {
        let config = FlakyConfig {
            table: ConfigTable::with_server_port(22211),
            proofs_readable: false,
        };
        assert_eq!(config::openspa_server_port(&config), 22211);
        assert_eq!(adk_proof_valid(&config, 5), ProofCheck::LookupError);
    }

    #[test]
    fn test_action_counters_cover_every_action() {
        assert_eq!(XdpAction::ALL.len(), XDP_ACTION_MAX);
        assert_eq!(OspaStatId::ALL.len(), OSPA_STAT_ID_MAX);
    }
}
