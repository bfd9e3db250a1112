//! Build script for ospa-cli
//!
//! Embeds the pre-compiled XDP object into the binary for single-file distribution.
//! If the object is not found, the binary will require `--ebpf-path` at runtime.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo::rustc-check-cfg=cfg(embedded_xdp)");
    println!("cargo:rerun-if-changed=../target/bpfel-unknown-none/release/ospa-ebpf");

    let Some(manifest_dir) = env::var_os("CARGO_MANIFEST_DIR").map(PathBuf::from) else {
        return;
    };
    let Some(workspace_root) = manifest_dir.parent() else {
        return;
    };

    let xdp_path = workspace_root.join("target/bpfel-unknown-none/release/ospa-ebpf");
    match xdp_path.canonicalize() {
        Ok(canonical) => {
            println!("cargo:rustc-env=OSPA_XDP_OBJ={}", canonical.display());
            println!("cargo:rustc-cfg=embedded_xdp");
            eprintln!("build.rs: Found XDP object at {}", canonical.display());
        }
        Err(_) => {
            eprintln!("build.rs: XDP object not found at {:?}, embedding disabled", xdp_path);
        }
    }
}
