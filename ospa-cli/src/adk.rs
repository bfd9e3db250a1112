//! XDP gate lifecycle: load, configure, attach, synchronize, report, detach.

use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use aya::maps::{Array, Map, MapData, PerCpuArray};
use aya::programs::{Xdp, XdpFlags};
use aya::programs::xdp::XdpLinkId;
use aya::{Ebpf, EbpfLoader};
use serde::Serialize;

use ospa_common::{
    AdkStats, ConfigTable, OspaStatDatarec, OspaStatId, StatsDatarec, StatsRecord, XdpAction,
    CONFIG_MAP_SIZE, MAP_XDP_CONFIG, MAP_XDP_OPENSPA_STATS, MAP_XDP_STATS, PROGRAM_NAME,
};
use ospa_cli::config::Mode;
use ospa_cli::proof::ProofGenerator;
use ospa_cli::sync::{install_proofs, set_server_port, ConfigWriter, ProofSync};

// ============================================================
// EMBEDDED eBPF BYTECODE (Single Binary Distribution)
// ============================================================
// If compiled with the XDP object present, it is embedded directly.
// Use --ebpf-path to override with an external file.

#[cfg(embedded_xdp)]
pub static EMBEDDED_XDP: &[u8] = include_bytes!(env!("OSPA_XDP_OBJ"));

/// Default path for the external XDP object
pub const DEFAULT_XDP_PATH: &str = "/usr/local/share/openspa/ospa-ebpf.o";

/// Pin directory shared by `run` and `status`
pub const PIN_DIR: &str = "/sys/fs/bpf/openspa";

/// Maps pinned while the gate runs
pub const PINNED_MAPS: [&str; 3] = [MAP_XDP_STATS, MAP_XDP_OPENSPA_STATS, MAP_XDP_CONFIG];

pub fn pin_path(map: &str) -> String {
    format!("{}/{}", PIN_DIR, map)
}

/// Load the XDP object. The embedded copy wins for the default path and
/// stands in for a missing file.
fn load_xdp_program(path: &str) -> Result<Ebpf> {
    let mut loader = EbpfLoader::new();
    let on_disk = Path::new(path).exists();

    #[cfg(embedded_xdp)]
    if path == DEFAULT_XDP_PATH || !on_disk {
        if !on_disk && path != DEFAULT_XDP_PATH {
            println!("⚠️  File {} not found, using embedded XDP", path);
        }
        log::debug!("Loading embedded XDP object ({} bytes)", EMBEDDED_XDP.len());
        println!("📦 Loading embedded XDP program");
        return loader.load(EMBEDDED_XDP).context("embedded XDP object");
    }

    if !on_disk {
        anyhow::bail!(
            "XDP object not found at {} and none embedded (run `cargo xtask build-ebpf` first)",
            path
        );
    }

    println!("📁 Loading XDP program from: {}", path);
    loader.load_file(path).with_context(|| format!("XDP object {}", path))
}

/// Netlink flags for `mode`. Without `replace_if_loaded` an XDP program
/// already on the interface makes the attach fail instead of being replaced.
pub fn attach_flags(mode: Mode, replace_if_loaded: bool) -> XdpFlags {
    let mut flags = match mode {
        Mode::Skb => XdpFlags::SKB_MODE,
        Mode::Driver => XdpFlags::DRV_MODE,
    };
    if !replace_if_loaded {
        flags |= XdpFlags::UPDATE_IF_NOEXIST;
    }
    flags
}

// ============================================================
// CONFIG MAP
// ============================================================

/// `XDP_CONFIG_MAP` as seen from userspace
pub struct ConfigMap(Array<MapData, u32>);

impl ConfigWriter for ConfigMap {
    fn put(&mut self, index: u32, value: u32) -> Result<()> {
        self.0
            .set(index, value, 0)
            .with_context(|| format!("{} update at index {}", MAP_XDP_CONFIG, index))
    }
}

/// Copy a config array into a [`ConfigTable`].
pub fn read_config<T: Borrow<MapData>>(map: &Array<T, u32>) -> Result<ConfigTable> {
    let mut table = ConfigTable::new();
    for index in 0..CONFIG_MAP_SIZE as u32 {
        let value = map
            .get(&index, 0)
            .with_context(|| format!("{} lookup at index {}", MAP_XDP_CONFIG, index))?;
        table.set(index, value);
    }
    Ok(table)
}

// ============================================================
// STATISTICS
// ============================================================

/// Sum both per-CPU stats arrays. Any missing entry is an error.
pub fn read_stats<A, E>(
    actions: &PerCpuArray<A, StatsDatarec>,
    events: &PerCpuArray<E, OspaStatDatarec>,
) -> Result<AdkStats>
where
    A: Borrow<MapData>,
    E: Borrow<MapData>,
{
    let mut stats = AdkStats::default();

    for action in XdpAction::ALL {
        let values = actions
            .get(&action.as_u32(), 0)
            .with_context(|| format!("lookup action {}", action.name()))?;
        stats.set_action(action, StatsRecord::sum(values.iter()));
    }

    for id in OspaStatId::ALL {
        let values = events
            .get(&id.as_u32(), 0)
            .with_context(|| format!("lookup event {:?}", id))?;
        let total = values.iter().fold(0u64, |acc, v| acc.wrapping_add(v.value));
        stats.set_event(id, total);
    }

    Ok(stats)
}

/// What `status` reports
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub udp_server_port: u16,
    pub adk_proofs: Vec<u32>,
    pub stats: AdkStats,
}

impl StatusReport {
    pub fn new(config: &ConfigTable, stats: AdkStats) -> Self {
        Self {
            udp_server_port: ospa_common::config::openspa_server_port(config),
            adk_proofs: config.adk_proofs().to_vec(),
            stats,
        }
    }

    pub fn print(&self) {
        println!("🔐 OpenSPA ADK Gate Status");
        println!("---------------------------");
        println!("UDP Server Port:   {}", self.udp_server_port);
        for (i, proof) in self.adk_proofs.iter().enumerate() {
            println!("ADK Proof [{}]:     {:09}", i, proof);
        }
        println!();
        for action in XdpAction::ALL {
            let rec = self.stats.action(action);
            println!("{:<14} {:>12} pkts {:>14} bytes", action.name(), rec.packets, rec.bytes);
        }
        println!();
        println!("Not OpenSPA:       {}", self.stats.openspa_not);
        println!("ADK Proof Invalid: {}", self.stats.openspa_adk_proof_invalid);
        println!("ADK Proof Valid:   {}", self.stats.openspa_adk_proof_valid);
    }
}

/// Read the maps pinned by a running gate.
pub fn read_pinned_status() -> Result<StatusReport> {
    let open = |name: &str| {
        let path = pin_path(name);
        MapData::from_pin(&path)
            .with_context(|| format!("gate is not running (no map at {})", path))
    };

    let actions =
        PerCpuArray::<_, StatsDatarec>::try_from(Map::PerCpuArray(open(MAP_XDP_STATS)?))?;
    let events = PerCpuArray::<_, OspaStatDatarec>::try_from(Map::PerCpuArray(open(
        MAP_XDP_OPENSPA_STATS,
    )?))?;
    let config = Array::<_, u32>::try_from(Map::Array(open(MAP_XDP_CONFIG)?))?;

    Ok(StatusReport::new(&read_config(&config)?, read_stats(&actions, &events)?))
}

// ============================================================
// GATE
// ============================================================

pub struct AdkSettings {
    pub iface: String,
    pub mode: Mode,
    pub replace_if_loaded: bool,
    pub udp_server_port: u16,
    pub sync_interval: Duration,
}

/// A loaded (and possibly attached) XDP gate.
pub struct Adk {
    bpf: Ebpf,
    settings: AdkSettings,
    link: Option<XdpLinkId>,
    proof_sync: ProofSync<ConfigMap>,
    pins: MapPins,
}

impl Adk {
    /// Load the program, pin its maps and write the initial configuration.
    /// Nothing is attached yet. The pins go away with the returned gate, or
    /// right away if any step fails.
    pub fn load(
        ebpf_path: &str,
        settings: AdkSettings,
        generator: Arc<dyn ProofGenerator>,
    ) -> Result<Self> {
        let mut bpf = load_xdp_program(ebpf_path)?;

        let program: &mut Xdp = bpf
            .program_mut(PROGRAM_NAME)
            .with_context(|| format!("program {} not found in object", PROGRAM_NAME))?
            .try_into()?;
        program.load().context("XDP program load")?;

        let pins = MapPins::pin(&mut bpf, Path::new(PIN_DIR));

        let config_map = bpf
            .take_map(MAP_XDP_CONFIG)
            .with_context(|| format!("{} not found", MAP_XDP_CONFIG))?;
        let config = ConfigMap(Array::try_from(config_map)?);

        let (pins, proof_sync) = configure(pins, config, &settings, generator)?;

        Ok(Self { bpf, settings, link: None, proof_sync, pins })
    }

    /// Attach in the configured mode, falling back from driver to SKB mode.
    /// Returns the mode actually in use.
    pub fn attach(&mut self) -> Result<Mode> {
        let iface = self.settings.iface.as_str();
        let replace = self.settings.replace_if_loaded;

        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .with_context(|| format!("program {} not found in object", PROGRAM_NAME))?
            .try_into()?;

        let (link, mode) = match program.attach(iface, attach_flags(self.settings.mode, replace)) {
            Ok(id) => (id, self.settings.mode),
            Err(driver_err) if self.settings.mode == Mode::Driver => {
                // Common for virtual/wireless interfaces
                println!("ℹ️  Driver mode unavailable for {}, trying SKB mode...", iface);
                match program.attach(iface, attach_flags(Mode::Skb, replace)) {
                    Ok(id) => (id, Mode::Skb),
                    Err(skb_err) => {
                        eprintln!("❌ XDP attach failed!");
                        eprintln!("   Driver mode error: {}", driver_err);
                        eprintln!("   SKB mode error: {}", skb_err);
                        eprintln!(
                            "   Hint: Check if interface '{}' exists and supports XDP",
                            iface
                        );
                        return Err(skb_err).context("link set xdp");
                    }
                }
            }
            Err(e) => {
                if !replace {
                    eprintln!(
                        "   Hint: another XDP program may already be attached \
                         (replace_if_loaded = false)"
                    );
                }
                return Err(e).context("link set xdp");
            }
        };

        println!(
            "✅ XDP attached to {} in {} mode (link_id: {:?})",
            iface,
            mode.to_string().to_uppercase(),
            link
        );
        self.link = Some(link);
        Ok(mode)
    }

    pub fn start_proof_sync(&mut self) {
        self.proof_sync.start();
    }

    pub fn stats(&self) -> Result<AdkStats> {
        let actions = PerCpuArray::<_, StatsDatarec>::try_from(
            self.bpf.map(MAP_XDP_STATS).with_context(|| format!("{} not found", MAP_XDP_STATS))?,
        )?;
        let events = PerCpuArray::<_, OspaStatDatarec>::try_from(
            self.bpf
                .map(MAP_XDP_OPENSPA_STATS)
                .with_context(|| format!("{} not found", MAP_XDP_OPENSPA_STATS))?,
        )?;
        read_stats(&actions, &events)
    }

    /// Stop synchronizing, detach and remove the pins. The pins are removed
    /// even when the detach fails.
    pub async fn stop(mut self) -> Result<()> {
        self.proof_sync.stop().await;
        let detached = self.detach();
        drop(self.pins);
        detached
    }

    fn detach(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .with_context(|| format!("program {} not found in object", PROGRAM_NAME))?
            .try_into()?;
        program.detach(link).context("unlink")
    }
}

/// Write the port and first proofs, then hand the writer to a [`ProofSync`].
/// `pins` is dropped, and so removed, when the setup fails.
fn configure<W: ConfigWriter + 'static>(
    pins: MapPins,
    mut writer: W,
    settings: &AdkSettings,
    generator: Arc<dyn ProofGenerator>,
) -> Result<(MapPins, ProofSync<W>)> {
    set_server_port(&mut writer, settings.udp_server_port).context("setup config map")?;
    install_proofs(&mut writer, generator.as_ref()).context("setup config map")?;

    let writer = Arc::new(Mutex::new(writer));
    Ok((pins, ProofSync::new(writer, generator, settings.sync_interval)))
}

/// Map pins of a loaded gate, removed on drop so that `status` never sees a
/// gate that is gone.
struct MapPins {
    dir: PathBuf,
}

impl MapPins {
    /// Pin maps for `status`. Failures only cost observability.
    fn pin(bpf: &mut Ebpf, dir: &Path) -> Self {
        let pins = MapPins { dir: dir.to_path_buf() };
        if let Err(e) = std::fs::create_dir_all(dir) {
            println!("⚠️  Cannot create {}: {}", dir.display(), e);
            return pins;
        }

        for name in PINNED_MAPS {
            if let Some(map) = bpf.map_mut(name) {
                let path = dir.join(name);
                let _ = std::fs::remove_file(&path); // Force overwrite
                if let Err(e) = map.pin(&path) {
                    println!("⚠️  Failed to pin map {}: {}", name, e);
                }
            }
        }
        pins
    }
}

impl Drop for MapPins {
    fn drop(&mut self) {
        for name in PINNED_MAPS {
            let path = self.dir.join(name);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to unpin {}: {}", path.display(), e);
                }
            }
        }
    }
}
