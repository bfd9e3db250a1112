//! Kernel capability check run before the gate is loaded.
//!
//! Every feature the gate relies on is listed in [`FEATURES`] with the
//! release that introduced it, so a failed check can say what is missing.

use std::ffi::CStr;
use std::path::Path;

/// Oldest release the gate is tested against
pub const MIN_KERNEL_VERSION: (u32, u32) = (5, 4);

pub const BPF_FS: &str = "/sys/fs/bpf";

/// Lockable memory considered enough for our three small maps
const MEMLOCK_FLOOR: u64 = 64 * 1024 * 1024;

/// Version-gated kernel features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    PerCpuArray,
    Xdp,
    XdpDriverMode,
    /// BPF memory accounted to memcg instead of RLIMIT_MEMLOCK
    MemcgAccounting,
}

pub const FEATURES: [(Feature, (u32, u32, u32), &str); 4] = [
    (Feature::PerCpuArray, (4, 6, 0), "per-CPU array maps"),
    (Feature::Xdp, (4, 8, 0), "XDP"),
    (Feature::XdpDriverMode, (4, 12, 0), "XDP driver mode"),
    (Feature::MemcgAccounting, (5, 11, 0), "memcg-based BPF memory accounting"),
];

#[derive(Debug, Clone)]
pub struct KernelCaps {
    /// `uname -r`
    pub release: String,
    pub version: (u32, u32, u32),
    pub has_bpf_fs: bool,
    pub has_xdp: bool,
    pub has_xdp_driver: bool,
    pub has_percpu_array: bool,
    /// Maps can be created without hitting RLIMIT_MEMLOCK
    pub memlock_ok: bool,
}

impl KernelCaps {
    pub fn detect() -> Self {
        let release = kernel_release();
        let version = parse_version(&release);
        Self::from_parts(release, version, Path::new(BPF_FS).is_dir(), memlock_sufficient())
    }

    fn from_parts(
        release: String,
        version: (u32, u32, u32),
        has_bpf_fs: bool,
        memlock_raised: bool,
    ) -> Self {
        let has = |f: Feature| {
            FEATURES
                .iter()
                .find(|(feat, _, _)| *feat == f)
                .is_some_and(|(_, since, _)| version >= *since)
        };

        KernelCaps {
            release,
            version,
            has_bpf_fs,
            has_xdp: has(Feature::Xdp),
            has_xdp_driver: has(Feature::XdpDriverMode),
            has_percpu_array: has(Feature::PerCpuArray),
            memlock_ok: memlock_raised || has(Feature::MemcgAccounting),
        }
    }

    /// Every unmet requirement, one per line.
    pub fn validate(&self) -> Result<(), String> {
        let (major, minor, patch) = self.version;
        let mut problems = Vec::new();

        if (major, minor) < MIN_KERNEL_VERSION {
            problems.push(format!(
                "Kernel {}.{}.{} is older than the supported {}.{}",
                major, minor, patch, MIN_KERNEL_VERSION.0, MIN_KERNEL_VERSION.1
            ));
        }

        for (feature, since, name) in FEATURES {
            let present = match feature {
                Feature::PerCpuArray => self.has_percpu_array,
                Feature::Xdp => self.has_xdp,
                // Optional: attach falls back to SKB mode
                Feature::XdpDriverMode => true,
                Feature::MemcgAccounting => self.memlock_ok,
            };
            if !present {
                problems.push(format!("Missing {} (kernel >= {}.{})", name, since.0, since.1));
            }
        }

        if !self.has_bpf_fs {
            problems.push(format!("No BPF filesystem at {} (mount -t bpf bpf {})", BPF_FS, BPF_FS));
        }
        if !self.memlock_ok {
            problems.push("Locked memory limit too low, run with: ulimit -l unlimited".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("\n"))
        }
    }

    pub fn print_summary(&self) {
        let mark = |ok: bool| if ok { "✅" } else { "❌" };

        let (major, minor, patch) = self.version;
        println!("🔍 Kernel {} ({}.{}.{})", self.release, major, minor, patch);
        println!("   {} {}", mark(self.has_bpf_fs), BPF_FS);
        for (feature, _, name) in FEATURES {
            let ok = match feature {
                Feature::PerCpuArray => self.has_percpu_array,
                Feature::Xdp => self.has_xdp,
                Feature::XdpDriverMode => self.has_xdp_driver,
                Feature::MemcgAccounting => self.memlock_ok,
            };
            println!("   {} {}", mark(ok), name);
        }
    }
}

/// Release string from uname(2), "unknown" if the call fails.
fn kernel_release() -> String {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return "unknown".to_string();
    }
    // Safety: uname NUL-terminates every field on success
    unsafe { CStr::from_ptr(uts.release.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// "5.15.0-91-generic" -> (5, 15, 0). Missing components are 0.
fn parse_version(release: &str) -> (u32, u32, u32) {
    let mut nums = release
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().unwrap_or(0));

    (
        nums.next().unwrap_or(0),
        nums.next().unwrap_or(0),
        nums.next().unwrap_or(0),
    )
}

fn memlock_sufficient() -> bool {
    let mut rlim = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } != 0 {
        return false;
    }
    rlim.rlim_cur == libc::RLIM_INFINITY || rlim.rlim_cur as u64 >= MEMLOCK_FLOOR
}

/// Lift RLIMIT_MEMLOCK for kernels that still charge BPF maps against it.
pub fn bump_memlock_rlimit() {
    let unlimited = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &unlimited) };
    if ret != 0 {
        log::warn!("Failed to remove limit on locked memory, ret is: {}", ret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(version: (u32, u32, u32), bpf_fs: bool, memlock: bool) -> KernelCaps {
        let release = format!("{}.{}.{}", version.0, version.1, version.2);
        KernelCaps::from_parts(release, version, bpf_fs, memlock)
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("5.15.0-91-generic"), (5, 15, 0));
        assert_eq!(parse_version("6.8.12"), (6, 8, 12));
        assert_eq!(parse_version("4.18.0-372.el8.x86_64"), (4, 18, 0));
        assert_eq!(parse_version("5.4"), (5, 4, 0));
        assert_eq!(parse_version("unknown"), (0, 0, 0));
    }

    #[test]
    fn test_modern_kernel_passes() {
        let c = caps((6, 1, 0), true, false);
        assert!(c.has_xdp_driver);
        assert!(c.memlock_ok);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_old_kernel_reports_every_gap() {
        let err = caps((4, 4, 0), false, false).validate().unwrap_err();
        assert!(err.contains("older than"));
        assert!(err.contains("per-CPU array maps"));
        assert!(err.contains("Missing XDP "));
        assert!(err.contains("BPF filesystem"));
        assert!(err.contains("ulimit"));
        assert!(!err.contains("driver mode"));
    }

    #[test]
    fn test_memlock_needed_before_5_11() {
        assert!(!caps((5, 10, 0), true, false).memlock_ok);
        assert!(caps((5, 10, 0), true, true).validate().is_ok());
    }

    #[test]
    fn test_release_is_readable() {
        assert!(!kernel_release().is_empty());
    }
}
