//! OpenSPA ADK Build Tasks
//!
//! `cargo xtask build-ebpf` compiles the XDP program for `bpfel-unknown-none`
//! into the workspace target/ directory, where ospa-cli's build script picks
//! up the release object for embedding.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use clap::Parser;

const BPF_TARGET: &str = "bpfel-unknown-none";
const EBPF_CRATE: &str = "ospa-ebpf";

#[derive(Parser)]
#[clap(name = "xtask")]
struct Cli {
    #[clap(subcommand)]
    task: Task,
}

#[derive(Parser)]
enum Task {
    /// Build the XDP gate eBPF program
    BuildEbpf {
        /// Build the unoptimized debug object (not embedded by ospa-cli)
        #[clap(long)]
        debug: bool,
    },
    /// Remove the workspace target/ directory
    Clean,
}

fn main() -> anyhow::Result<()> {
    let root = workspace_root();
    match Cli::parse().task {
        Task::BuildEbpf { debug } => build_ebpf(&root, !debug),
        Task::Clean => {
            println!("🧹 Cleaning build artifacts...");
            run(Command::new("cargo").arg("clean").current_dir(&root), "cargo clean")?;
            println!("✅ Clean complete");
            Ok(())
        }
    }
}

/// xtask lives one level below the workspace root.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
}

fn build_ebpf(root: &Path, release: bool) -> anyhow::Result<()> {
    let target_dir = root.join("target");
    let object = object_path(&target_dir, release);

    println!("📦 Building {} ({})", EBPF_CRATE, if release { "release" } else { "debug" });
    println!("   Target dir: {}", target_dir.display());

    let mut cargo = Command::new("cargo");
    cargo
        .current_dir(root.join(EBPF_CRATE))
        .args(["+nightly", "build", "-Zbuild-std=core", "--target", BPF_TARGET])
        .arg("--target-dir")
        .arg(&target_dir);
    if release {
        cargo.arg("--release");
    }
    run(&mut cargo, EBPF_CRATE)?;

    if !object.exists() {
        bail!("build finished but {} is missing", object.display());
    }
    println!("✅ {}", object.display());
    Ok(())
}

fn run(cmd: &mut Command, what: &str) -> anyhow::Result<()> {
    let status = cmd.status().with_context(|| format!("failed to spawn {}", what))?;
    if !status.success() {
        bail!("❌ {} failed ({})", what, status);
    }
    Ok(())
}

fn object_path(target_dir: &Path, release: bool) -> PathBuf {
    let profile = if release { "release" } else { "debug" };
    target_dir.join(BPF_TARGET).join(profile).join(EBPF_CRATE)
}
