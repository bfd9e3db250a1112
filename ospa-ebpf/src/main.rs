//! OpenSPA ADK gate - eBPF Program
//!
//! XDP ingress filter that only lets OpenSPA requests carrying an
//! allow-listed ADK proof reach the server port. Everything else addressed
//! to that port is dropped; all other traffic is passed untouched.
//! All parsing and decision logic lives in ospa-common (Single Source of Truth).

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{Array, PerCpuArray},
    programs::XdpContext,
};

use ospa_common::{
    process_packet, ConfigStore, HdrCursor, OspaStatDatarec, OspaStatId, StatsDatarec, StatsSink,
    XdpAction, CONFIG_MAP_SIZE, OSPA_STAT_ID_MAX, XDP_ACTION_MAX,
};

// ============================================================
// BPF MAPS
// ============================================================

/// Per-CPU packet/byte counters, indexed by final XDP action
#[map(name = "XDP_STATS_MAP")]
static XDP_STATS_MAP: PerCpuArray<StatsDatarec> =
    PerCpuArray::with_max_entries(XDP_ACTION_MAX as u32, 0);

/// Per-CPU OpenSPA event counters, indexed by `OspaStatId`
#[map(name = "XDP_OPENSPA_STATS_MAP")]
static XDP_OPENSPA_STATS_MAP: PerCpuArray<OspaStatDatarec> =
    PerCpuArray::with_max_entries(OSPA_STAT_ID_MAX as u32, 0);

/// Server port and ADK proof allow-list, written by ospa-cli
#[map(name = "XDP_CONFIG_MAP")]
static XDP_CONFIG_MAP: Array<u32> = Array::with_max_entries(CONFIG_MAP_SIZE as u32, 0);

// ============================================================
// MAP ADAPTERS
// ============================================================

struct MapConfig;

impl ConfigStore for MapConfig {
    #[inline(always)]
    fn lookup(&self, index: u32) -> Option<u32> {
        XDP_CONFIG_MAP.get(index).copied()
    }
}

/// This CPU's slice of the stats maps
struct PerCpuStats;

impl StatsSink for PerCpuStats {
    #[inline(always)]
    fn record_action(&mut self, action: XdpAction, bytes: u64) -> bool {
        match XDP_STATS_MAP.get_ptr_mut(action.as_u32()) {
            Some(rec) => {
                unsafe {
                    (*rec).rx_packets = (*rec).rx_packets.wrapping_add(1);
                    (*rec).rx_bytes = (*rec).rx_bytes.wrapping_add(bytes);
                }
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    fn record_event(&mut self, id: OspaStatId) -> bool {
        match XDP_OPENSPA_STATS_MAP.get_ptr_mut(id.as_u32()) {
            Some(rec) => {
                unsafe { (*rec).value = (*rec).value.wrapping_add(1) };
                true
            }
            None => false,
        }
    }
}

// ============================================================
// MAIN XDP PROGRAM
// ============================================================

#[xdp]
pub fn xdp_openspa_adk(ctx: XdpContext) -> u32 {
    match try_xdp_openspa_adk(&ctx) {
        Ok(ret) => ret,
        Err(_) => xdp_action::XDP_ABORTED,
    }
}

#[inline(always)]
fn try_xdp_openspa_adk(ctx: &XdpContext) -> Result<u32, ()> {
    let (data, data_end) = (ctx.data(), ctx.data_end());
    if data > data_end {
        return Err(());
    }

    // Safety: the kernel guarantees [data, data_end) is readable for the
    // duration of this invocation.
    let mut nh = unsafe { HdrCursor::from_raw(data, data_end) };

    let verdict = process_packet(&mut nh, &MapConfig, &mut PerCpuStats);
    Ok(verdict.action.as_u32())
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
