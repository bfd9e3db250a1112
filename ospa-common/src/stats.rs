//! Statistics: per-unit counter tables and their aggregation.
//!
//! The XDP program writes one isolated copy per CPU (`PerCpuArray`), so the
//! hot path never synchronizes. Userspace sums the copies for reporting.

#[cfg(feature = "user")]
use serde::{Deserialize, Serialize};

use crate::{OspaStatDatarec, OspaStatId, StatsDatarec, XdpAction, OSPA_STAT_ID_MAX, XDP_ACTION_MAX};

/// Write side of the counters, as seen by the decision pipeline.
pub trait StatsSink {
    /// Count one frame of `bytes` for `action`. Returns `false` when the
    /// action's counter slot is unavailable.
    fn record_action(&mut self, action: XdpAction, bytes: u64) -> bool;

    /// Bump a scheme event counter. Returns `false` when the slot is unavailable.
    fn record_event(&mut self, id: OspaStatId) -> bool;
}

/// One processing unit's private copy of both counter tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsTables {
    pub actions: [StatsDatarec; XDP_ACTION_MAX],
    pub events: [OspaStatDatarec; OSPA_STAT_ID_MAX],
}

impl StatsTables {
    pub const fn new() -> Self {
        Self {
            actions: [StatsDatarec { rx_packets: 0, rx_bytes: 0 }; XDP_ACTION_MAX],
            events: [OspaStatDatarec { value: 0 }; OSPA_STAT_ID_MAX],
        }
    }

    pub fn action(&self, action: XdpAction) -> StatsDatarec {
        self.actions[action as usize]
    }

    pub fn event(&self, id: OspaStatId) -> u64 {
        self.events[id as usize].value
    }
}

impl StatsSink for StatsTables {
    #[inline(always)]
    fn record_action(&mut self, action: XdpAction, bytes: u64) -> bool {
        match self.actions.get_mut(action as usize) {
            Some(rec) => {
                rec.rx_packets = rec.rx_packets.wrapping_add(1);
                rec.rx_bytes = rec.rx_bytes.wrapping_add(bytes);
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    fn record_event(&mut self, id: OspaStatId) -> bool {
        match self.events.get_mut(id as usize) {
            Some(rec) => {
                rec.value = rec.value.wrapping_add(1);
                true
            }
            None => false,
        }
    }
}

// ============================================================
// AGGREGATION (reporting path)
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Serialize, Deserialize))]
pub struct StatsRecord {
    pub packets: u64,
    pub bytes: u64,
}

impl StatsRecord {
    /// Sum one action's per-CPU records.
    pub fn sum<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StatsDatarec>,
    {
        records.into_iter().fold(Self::default(), |acc, r| Self {
            packets: acc.packets.wrapping_add(r.rx_packets),
            bytes: acc.bytes.wrapping_add(r.rx_bytes),
        })
    }
}

/// Gate statistics summed over all processing units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(Serialize, Deserialize))]
pub struct AdkStats {
    pub xdp_aborted: StatsRecord,
    pub xdp_drop: StatsRecord,
    pub xdp_pass: StatsRecord,
    pub xdp_tx: StatsRecord,
    pub xdp_redirect: StatsRecord,

    pub openspa_not: u64,
    pub openspa_adk_proof_invalid: u64,
    pub openspa_adk_proof_valid: u64,
}

impl AdkStats {
    pub fn action(&self, action: XdpAction) -> StatsRecord {
        match action {
            XdpAction::Aborted => self.xdp_aborted,
            XdpAction::Drop => self.xdp_drop,
            XdpAction::Pass => self.xdp_pass,
            XdpAction::Tx => self.xdp_tx,
            XdpAction::Redirect => self.xdp_redirect,
        }
    }

    pub fn set_action(&mut self, action: XdpAction, record: StatsRecord) {
        let slot = match action {
            XdpAction::Aborted => &mut self.xdp_aborted,
            XdpAction::Drop => &mut self.xdp_drop,
            XdpAction::Pass => &mut self.xdp_pass,
            XdpAction::Tx => &mut self.xdp_tx,
            XdpAction::Redirect => &mut self.xdp_redirect,
        };
        *slot = record;
    }

    pub fn event(&self, id: OspaStatId) -> u64 {
        match id {
            OspaStatId::NotOpenspaPacket => self.openspa_not,
            OspaStatId::AdkProofInvalid => self.openspa_adk_proof_invalid,
            OspaStatId::AdkProofValid => self.openspa_adk_proof_valid,
        }
    }

    pub fn set_event(&mut self, id: OspaStatId, value: u64) {
        match id {
            OspaStatId::NotOpenspaPacket => self.openspa_not = value,
            OspaStatId::AdkProofInvalid => self.openspa_adk_proof_invalid = value,
            OspaStatId::AdkProofValid => self.openspa_adk_proof_valid = value,
        }
    }

    /// Sum a set of per-unit tables.
    pub fn from_tables<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = &'a StatsTables>,
    {
        let mut out = Self::default();
        for t in tables {
            for action in XdpAction::ALL {
                let cur = out.action(action);
                let rec = t.action(action);
                out.set_action(action, StatsRecord {
                    packets: cur.packets.wrapping_add(rec.rx_packets),
                    bytes: cur.bytes.wrapping_add(rec.rx_bytes),
                });
            }
            for id in OspaStatId::ALL {
                out.set_event(id, out.event(id).wrapping_add(t.event(id)));
            }
        }
        out
    }

    /// Overlay `other` on `self`: every non-zero field of `other` wins.
    pub fn merge(self, other: AdkStats) -> AdkStats {
        let mut out = self;

        for action in XdpAction::ALL {
            let mut rec = out.action(action);
            let upd = other.action(action);
            if upd.packets > 0 {
                rec.packets = upd.packets;
            }
            if upd.bytes > 0 {
                rec.bytes = upd.bytes;
            }
            out.set_action(action, rec);
        }

        for id in OspaStatId::ALL {
            let upd = other.event(id);
            if upd > 0 {
                out.set_event(id, upd);
            }
        }

        out
    }

    /// Frames that reached any final action.
    pub fn total_packets(&self) -> u64 {
        XdpAction::ALL
            .iter()
            .fold(0u64, |acc, a| acc.wrapping_add(self.action(*a).packets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_accumulate() {
        let mut t = StatsTables::new();
        assert!(t.record_action(XdpAction::Pass, 60));
        assert!(t.record_action(XdpAction::Pass, 40));
        assert!(t.record_event(OspaStatId::AdkProofValid));

        assert_eq!(t.action(XdpAction::Pass), StatsDatarec { rx_packets: 2, rx_bytes: 100 });
        assert_eq!(t.action(XdpAction::Drop), StatsDatarec::default());
        assert_eq!(t.event(OspaStatId::AdkProofValid), 1);
    }

    #[test]
    fn test_per_unit_tables_are_summed() {
        let mut cpu0 = StatsTables::new();
        let mut cpu1 = StatsTables::new();
        cpu0.record_action(XdpAction::Drop, 100);
        cpu1.record_action(XdpAction::Drop, 50);
        cpu1.record_action(XdpAction::Aborted, 10);
        cpu0.record_event(OspaStatId::AdkProofInvalid);
        cpu1.record_event(OspaStatId::AdkProofInvalid);

        let total = AdkStats::from_tables([&cpu0, &cpu1]);
        assert_eq!(total.xdp_drop, StatsRecord { packets: 2, bytes: 150 });
        assert_eq!(total.xdp_aborted, StatsRecord { packets: 1, bytes: 10 });
        assert_eq!(total.openspa_adk_proof_invalid, 2);
        assert_eq!(total.total_packets(), 3);
    }

    #[test]
    fn test_sum_per_cpu_records() {
        let recs = [
            StatsDatarec { rx_packets: 1, rx_bytes: 64 },
            StatsDatarec { rx_packets: 2, rx_bytes: 128 },
        ];
        assert_eq!(StatsRecord::sum(&recs), StatsRecord { packets: 3, bytes: 192 });
        assert_eq!(StatsRecord::sum(&[]), StatsRecord::default());
    }

    #[test]
    fn test_merge_keeps_fields_that_are_zero_in_update() {
        let mut base = AdkStats::default();
        base.xdp_pass = StatsRecord { packets: 5, bytes: 500 };
        base.openspa_not = 3;

        let mut upd = AdkStats::default();
        upd.xdp_pass.packets = 7;
        upd.openspa_adk_proof_valid = 1;

        let merged = base.merge(upd);
        assert_eq!(merged.xdp_pass, StatsRecord { packets: 7, bytes: 500 });
        assert_eq!(merged.openspa_not, 3);
        assert_eq!(merged.openspa_adk_proof_valid, 1);
    }
}
