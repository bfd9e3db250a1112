//! ADK proof allow-list check.

use crate::config::ConfigStore;
use crate::{ADK_PROOF_SLOTS, CONFIG_MAP_IDX_ADK_PROOF_FIRST};

/// Outcome of an allow-list check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofCheck {
    Valid,
    Invalid,
    /// A config slot could not be read, the check was not completed.
    LookupError,
}

impl ProofCheck {
    /// Only an explicit match authorizes, uncertainty never does.
    #[inline(always)]
    pub fn is_valid(self) -> bool {
        matches!(self, ProofCheck::Valid)
    }
}

/// Check `adk_proof` (host order) against the configured allow-list.
///
/// `0` is never valid. The scan visits at most `ADK_PROOF_SLOTS` entries and
/// stops at the first exact match or the first unreadable slot.
#[inline(always)]
pub fn adk_proof_valid<C: ConfigStore>(config: &C, adk_proof: u32) -> ProofCheck {
    if adk_proof == 0 {
        return ProofCheck::Invalid;
    }

    for i in 0..ADK_PROOF_SLOTS as u32 {
        let val = match config.lookup(CONFIG_MAP_IDX_ADK_PROOF_FIRST + i) {
            Some(val) => val,
            None => return ProofCheck::LookupError,
        };

        if val == adk_proof {
            return ProofCheck::Valid;
        }
    }

    ProofCheck::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigTable;

    /// Config whose proof slots past `readable` cannot be read
    struct PartialConfig {
        table: ConfigTable,
        readable: u32,
    }

    impl ConfigStore for PartialConfig {
        fn lookup(&self, index: u32) -> Option<u32> {
            if index >= self.readable {
                return None;
            }
            self.table.lookup(index)
        }
    }

    fn table(proofs: &[u32]) -> ConfigTable {
        let mut t = ConfigTable::with_server_port(12345);
        for (slot, p) in proofs.iter().enumerate() {
            t.set_adk_proof(slot, *p);
        }
        t
    }

    #[test]
    fn test_zero_is_never_valid() {
        // Unset slots hold 0, a zero proof must still be rejected
        assert_eq!(adk_proof_valid(&table(&[]), 0), ProofCheck::Invalid);
        assert_eq!(adk_proof_valid(&table(&[0, 0]), 0), ProofCheck::Invalid);
    }

    #[test]
    fn test_match_in_any_slot() {
        let t = table(&[0x11111111, 0xAABBCCDD]);
        assert_eq!(adk_proof_valid(&t, 0x11111111), ProofCheck::Valid);
        assert_eq!(adk_proof_valid(&t, 0xAABBCCDD), ProofCheck::Valid);
        assert_eq!(adk_proof_valid(&t, 0xAABBCCDE), ProofCheck::Invalid);
    }

    #[test]
    fn test_unreadable_slot_is_lookup_error() {
        let cfg = PartialConfig { table: table(&[1, 2]), readable: CONFIG_MAP_IDX_ADK_PROOF_FIRST };
        assert_eq!(adk_proof_valid(&cfg, 2), ProofCheck::LookupError);
        assert!(!adk_proof_valid(&cfg, 2).is_valid());
    }

    #[test]
    fn test_match_before_unreadable_slot_wins() {
        let cfg = PartialConfig {
            table: table(&[7, 8]),
            readable: CONFIG_MAP_IDX_ADK_PROOF_FIRST + 1,
        };
        assert_eq!(adk_proof_valid(&cfg, 7), ProofCheck::Valid);
        assert_eq!(adk_proof_valid(&cfg, 8), ProofCheck::LookupError);
    }
}
