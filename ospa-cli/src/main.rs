mod adk;
mod compat;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use ospa_cli::config::{self, AdkConfig, Mode};
use ospa_cli::proof::{self, ProofGenerator, TotpProofGenerator};

use adk::{Adk, AdkSettings, DEFAULT_XDP_PATH};

/// How often `run` logs aggregated stats at debug level
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[clap(
    name = "ospa-adk",
    about = "OpenSPA ADK gate: XDP single packet authorization filter",
    version
)]
struct Opt {
    /// Network interface to attach to (overrides config)
    #[clap(short, long)]
    iface: Option<String>,

    /// Path to XDP eBPF object file (uses embedded if not specified)
    #[clap(long, default_value = DEFAULT_XDP_PATH)]
    ebpf_path: String,

    /// System config file
    #[clap(short, long, default_value = config::DEFAULT_SYSTEM_CONFIG)]
    config: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and attach the gate, keep ADK proofs in sync until SIGTERM/SIGINT
    Run {
        /// XDP attach mode: skb or driver (overrides config)
        #[clap(long)]
        mode: Option<Mode>,
        /// OpenSPA UDP server port (overrides config)
        #[clap(long)]
        port: Option<u16>,
    },
    /// Show runtime statistics of a running gate
    Status {
        /// Print as JSON
        #[clap(long)]
        json: bool,
    },
    /// Generate a new ADK secret
    GenSecret {
        /// Store it as `adk.secret` in the config file instead of printing it
        #[clap(long)]
        save: bool,
    },
    /// Print the current and next ADK proof for the configured secret
    Proof {
        /// Base32 secret (overrides config)
        #[clap(long)]
        secret: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Target shell: bash, zsh, fish, elvish
        #[clap(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    if !needs_config(&opt.command) {
        init_logger(config::DEFAULT_LOG_LEVEL);
        return without_config(opt.command);
    }

    let (mut cfg, source) = AdkConfig::load(Some(&opt.config))?;
    init_logger(&cfg.logging.level);
    log::info!("{}", source);

    if let Some(iface) = &opt.iface {
        cfg.interface = iface.clone();
    }

    match opt.command {
        Commands::Run { mode, port } => {
            if let Some(mode) = mode {
                cfg.xdp.mode = mode;
            }
            if let Some(port) = port {
                cfg.adk.udp_server_port = port;
            }
            run(&opt.ebpf_path, cfg).await
        }
        Commands::Proof { secret } => {
            let secret = secret.unwrap_or(cfg.adk.secret);
            let gen = TotpProofGenerator::new(&secret)?;
            println!("now:  {:09}", gen.proof_now());
            println!("next: {:09}", gen.proof_next());
            Ok(())
        }
        Commands::GenSecret { .. } => {
            cfg.adk.secret = proof::generate_secret();
            cfg.save(Some(&opt.config))?;
            println!("🔑 New ADK secret written to {}", opt.config);
            Ok(())
        }
        other => without_config(other),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Diagnostics and helpers must keep working with a broken config file.
fn needs_config(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Status { .. } | Commands::Completions { .. } | Commands::GenSecret { save: false }
    )
}

fn without_config(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Status { json } => {
            let report = adk::read_pinned_status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Opt::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Commands::GenSecret { save: false } => {
            println!("{}", proof::generate_secret());
            Ok(())
        }
        _ => anyhow::bail!("command requires the system config"),
    }
}

async fn run(ebpf_path: &str, cfg: AdkConfig) -> anyhow::Result<()> {
    cfg.validate()?;

    compat::bump_memlock_rlimit();

    let caps = compat::KernelCaps::detect();
    caps.print_summary();
    if let Err(e) = caps.validate() {
        eprintln!("\n❌ KERNEL REQUIREMENTS NOT MET:\n{}", e);
        anyhow::bail!(
            "the ADK gate requires Linux kernel >= {}.{} with BPF support",
            compat::MIN_KERNEL_VERSION.0,
            compat::MIN_KERNEL_VERSION.1
        );
    }
    if cfg.xdp.mode == Mode::Driver && !caps.has_xdp_driver {
        log::warn!("Kernel lacks XDP driver mode, attach will fall back to SKB mode");
    }

    let generator: Arc<dyn ProofGenerator> = Arc::new(TotpProofGenerator::new(&cfg.adk.secret)?);

    let settings = AdkSettings {
        iface: cfg.interface.clone(),
        mode: cfg.xdp.mode,
        replace_if_loaded: cfg.xdp.replace_if_loaded,
        udp_server_port: cfg.adk.udp_server_port,
        sync_interval: Duration::from_secs(cfg.adk.sync_interval_secs),
    };

    let mut gate = Adk::load(ebpf_path, settings, generator)?;
    gate.attach()?;
    gate.start_proof_sync();

    println!(
        "🔐 ADK gate active on {} for UDP port {} (proof sync every {}s). \
         Send SIGTERM or SIGINT to stop.",
        cfg.interface, cfg.adk.udp_server_port, cfg.adk.sync_interval_secs
    );

    wait_for_shutdown(&gate).await?;

    println!("🔌 Detaching from {}...", cfg.interface);
    gate.stop().await?;
    println!("✅ Gate detached. Shutdown complete.");
    Ok(())
}

/// Block until SIGTERM (systemd) or SIGINT (Ctrl+C), logging stats meanwhile.
async fn wait_for_shutdown(gate: &Adk) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    let mut stats_tick = tokio::time::interval(STATS_LOG_INTERVAL);
    stats_tick.tick().await;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                println!("\n📥 Received SIGTERM");
                return Ok(());
            }
            _ = sigint.recv() => {
                println!("\n📥 Received SIGINT (Ctrl+C)");
                return Ok(());
            }
            _ = stats_tick.tick() => match gate.stats() {
                Ok(s) => log::debug!(
                    "pass={} drop={} aborted={} not_openspa={} proof_valid={} proof_invalid={}",
                    s.xdp_pass.packets, s.xdp_drop.packets, s.xdp_aborted.packets,
                    s.openspa_not, s.openspa_adk_proof_valid, s.openspa_adk_proof_invalid
                ),
                Err(e) => log::warn!("Failed to read XDP stats: {:#}", e),
            },
        }
    }
}
