//! Fuzz target for the ADK decision pipeline
//!
//! Feeds raw frames through the same `process_packet` the XDP program runs
//! and checks that it never panics and keeps its counting invariants.

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use ospa_common::*;

/// Gate configuration chosen by the fuzzer
#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    server_port: u16,
    proofs: [u32; ADK_PROOF_SLOTS],
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(cfg) = FuzzConfig::arbitrary(&mut u) else {
        return;
    };
    let frame = u.take_rest();

    let mut table = ConfigTable::with_server_port(cfg.server_port);
    for (slot, proof) in cfg.proofs.iter().enumerate() {
        table.set_adk_proof(slot, *proof);
    }

    let mut stats = StatsTables::new();
    let mut nh = HdrCursor::new(frame);
    let verdict = process_packet(&mut nh, &table, &mut stats);

    // Cursor stayed inside the frame
    assert!(nh.offset() <= frame.len());

    // Exactly one action counted, with the whole frame length
    let counted: u64 = stats.actions.iter().map(|r| r.rx_packets).sum();
    assert_eq!(counted, 1);
    assert_eq!(stats.action(verdict.action).rx_bytes, frame.len() as u64);

    // Only the gate port can produce a drop
    if verdict.action == XdpAction::Drop {
        assert!(cfg.server_port != 0);
        assert!(verdict.reason.event().is_some());
    }

    // A pass on the gate port needs an allow-listed proof
    if verdict.reason == Reason::ProofValid {
        assert!(stats.event(OspaStatId::AdkProofValid) == 1);
    }

    // Same frame, same answer
    let again = classify(&mut HdrCursor::new(frame), &table);
    assert_eq!(again.action, verdict.action);
});
