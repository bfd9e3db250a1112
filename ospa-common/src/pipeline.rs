//! Per-packet decision pipeline.
//!
//! Stages run in order, each with a terminal action on failure:
//!
//! ```text
//! link -> network class -> network -> transport class -> transport
//!      -> configured port -> dst port -> ospa header -> plausibility -> proof
//! ```
//!
//! Whatever the path, the final action is counted exactly once.

use crate::config::{openspa_server_port, ConfigStore};
use crate::cursor::HdrCursor;
use crate::parsing::{
    parse_ethhdr, parse_ip6hdr, parse_iphdr, parse_ospahdr, parse_udphdr, potentially_ospa_packet,
};
use crate::proof::{adk_proof_valid, ProofCheck};
use crate::stats::StatsSink;
use crate::{OspaStatId, XdpAction, ETH_P_IP, ETH_P_IPV6, IPPROTO_UDP};

/// Why the pipeline stopped where it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// A header boundary failed a length check
    Malformed,
    UnsupportedLink,
    UnsupportedTransport,
    /// No server port configured, the gate is inactive
    PortUnset,
    PortMismatch,
    NotOpenspa,
    ProofInvalid,
    /// A proof slot could not be read; handled as `ProofInvalid`
    ProofLookupError,
    ProofValid,
    /// Action counter slot unavailable while finalizing
    StatsUnavailable,
}

impl Reason {
    /// Scheme event counted for this outcome, if any.
    #[inline(always)]
    pub fn event(self) -> Option<OspaStatId> {
        match self {
            Reason::NotOpenspa => Some(OspaStatId::NotOpenspaPacket),
            Reason::ProofInvalid | Reason::ProofLookupError => Some(OspaStatId::AdkProofInvalid),
            Reason::ProofValid => Some(OspaStatId::AdkProofValid),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub action: XdpAction,
    pub reason: Reason,
}

impl Verdict {
    #[inline(always)]
    const fn new(action: XdpAction, reason: Reason) -> Self {
        Self { action, reason }
    }
}

/// Decide the fate of the frame under `nh` without touching any counter.
#[inline(always)]
pub fn classify<C: ConfigStore>(nh: &mut HdrCursor<'_>, config: &C) -> Verdict {
    let h_proto = match parse_ethhdr(nh) {
        Ok((_, h_proto)) => h_proto,
        Err(_) => return Verdict::new(XdpAction::Aborted, Reason::Malformed),
    };

    let ip_type = if h_proto == ETH_P_IP.to_be() {
        match parse_iphdr(nh) {
            Ok((_, proto)) => proto,
            Err(_) => return Verdict::new(XdpAction::Aborted, Reason::Malformed),
        }
    } else if h_proto == ETH_P_IPV6.to_be() {
        match parse_ip6hdr(nh) {
            Ok((_, next_header)) => next_header,
            Err(_) => return Verdict::new(XdpAction::Aborted, Reason::Malformed),
        }
    } else {
        return Verdict::new(XdpAction::Pass, Reason::UnsupportedLink);
    };

    if ip_type != IPPROTO_UDP {
        return Verdict::new(XdpAction::Pass, Reason::UnsupportedTransport);
    }

    let udph = match parse_udphdr(nh) {
        Ok((udph, _)) => udph,
        Err(_) => return Verdict::new(XdpAction::Aborted, Reason::Malformed),
    };

    let server_port = openspa_server_port(config);
    if server_port == 0 {
        return Verdict::new(XdpAction::Pass, Reason::PortUnset);
    }

    if udph.dest() != server_port {
        return Verdict::new(XdpAction::Pass, Reason::PortMismatch);
    }

    let ospah = match parse_ospahdr(nh) {
        Ok(ospah) => ospah,
        Err(_) => return Verdict::new(XdpAction::Drop, Reason::NotOpenspa),
    };

    if !potentially_ospa_packet(nh, ospah) {
        return Verdict::new(XdpAction::Drop, Reason::NotOpenspa);
    }

    match adk_proof_valid(config, ospah.adk_proof()) {
        ProofCheck::Valid => Verdict::new(XdpAction::Pass, Reason::ProofValid),
        ProofCheck::Invalid => Verdict::new(XdpAction::Drop, Reason::ProofInvalid),
        ProofCheck::LookupError => Verdict::new(XdpAction::Drop, Reason::ProofLookupError),
    }
}

/// Classify the frame, count its event and final action, return the verdict.
///
/// When the action counter slot cannot be updated the frame is aborted.
#[inline(always)]
pub fn process_packet<C, S>(nh: &mut HdrCursor<'_>, config: &C, stats: &mut S) -> Verdict
where
    C: ConfigStore,
    S: StatsSink,
{
    let verdict = classify(nh, config);

    if let Some(id) = verdict.reason.event() {
        stats.record_event(id);
    }

    if !stats.record_action(verdict.action, nh.packet_len() as u64) {
        return Verdict::new(XdpAction::Aborted, Reason::StatsUnavailable);
    }

    verdict
}
