use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Maximum config file size (1 MB), checked before parsing
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SYSTEM CONFIG (TOML): /etc/openspa/adk.toml
// =============================================================================

pub const DEFAULT_SYSTEM_CONFIG: &str = "/etc/openspa/adk.toml";

/// Default OpenSPA UDP server port
pub const DEFAULT_UDP_SERVER_PORT: u16 = 22211;

/// Three resyncs per 60 s proof period
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 20;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// XDP attach mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Generic XDP, works on every interface
    #[default]
    Skb,
    /// Native driver XDP
    Driver,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skb" => Ok(Mode::Skb),
            "driver" => Ok(Mode::Driver),
            other => bail!("invalid XDP mode '{}' (expected \"skb\" or \"driver\")", other),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Skb => write!(f, "skb"),
            Mode::Driver => write!(f, "driver"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AdkConfig {
    pub interface: String,
    pub xdp: XdpConfig,
    pub adk: AdkSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct XdpConfig {
    pub mode: Mode,
    /// Replace an XDP program already attached to the interface
    pub replace_if_loaded: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AdkSection {
    pub udp_server_port: u16,
    /// Base32 ADK secret shared with clients
    pub secret: String,
    pub sync_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for AdkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            xdp: XdpConfig::default(),
            adk: AdkSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for XdpConfig {
    fn default() -> Self {
        Self { mode: Mode::Skb, replace_if_loaded: false }
    }
}

impl Default for AdkSection {
    fn default() -> Self {
        Self {
            udp_server_port: DEFAULT_UDP_SERVER_PORT,
            secret: String::new(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.into() }
    }
}

/// Where [`AdkConfig::load`] found its settings. Logged by the caller once
/// the logger is configured from the loaded level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(String),
    Defaults(String),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "System config loaded: {}", path),
            ConfigSource::Defaults(path) => write!(f, "No config at {}, using defaults", path),
        }
    }
}

impl AdkConfig {
    /// Load the system config. A missing file yields defaults, an unreadable
    /// or malformed one is an error.
    pub fn load(path: Option<&str>) -> Result<(Self, ConfigSource)> {
        let config_path = path.unwrap_or(DEFAULT_SYSTEM_CONFIG);

        let meta = match std::fs::metadata(config_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Self::default(), ConfigSource::Defaults(config_path.to_string())));
            }
            Err(e) => return Err(e).with_context(|| format!("Cannot stat {}", config_path)),
        };

        if meta.len() > MAX_CONFIG_SIZE {
            bail!(
                "Config file too large ({} bytes, max {} bytes)",
                meta.len(),
                MAX_CONFIG_SIZE
            );
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Cannot read {}", config_path))?;
        let cfg = Self::parse(&content)
            .with_context(|| format!("Config parse error in {}", config_path))?;

        Ok((cfg, ConfigSource::File(config_path.to_string())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = path.unwrap_or(DEFAULT_SYSTEM_CONFIG);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path))?;
        Ok(())
    }

    /// Checks needed before the gate can be attached.
    pub fn validate(&self) -> Result<()> {
        validate_iface(&self.interface)?;

        if self.adk.udp_server_port == 0 {
            bail!("adk.udp_server_port must be non-zero");
        }
        if self.adk.secret.is_empty() {
            bail!("adk.secret is not set (generate one with `gen-secret`)");
        }
        if self.adk.sync_interval_secs == 0 {
            bail!("adk.sync_interval_secs must be non-zero");
        }

        Ok(())
    }
}

/// IFNAMSIZ = 16 including the terminator, so at most 15 chars.
pub fn validate_iface(iface: &str) -> Result<()> {
    if iface.len() > 15
        || iface.is_empty()
        || !iface.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("Invalid interface name: '{}' (max 15 chars, alphanumeric/-/_ only)", iface);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("skb".parse::<Mode>().unwrap(), Mode::Skb);
        assert_eq!("driver".parse::<Mode>().unwrap(), Mode::Driver);
        assert!("native".parse::<Mode>().is_err());
        assert!("SKB".parse::<Mode>().is_err());
        assert_eq!(Mode::Driver.to_string(), "driver");
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = AdkConfig::parse(
            r#"
            interface = "enp3s0"

            [xdp]
            mode = "driver"
            replace_if_loaded = true

            [adk]
            udp_server_port = 12345
            secret = "ABCDEFGH"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.interface, "enp3s0");
        assert_eq!(cfg.xdp.mode, Mode::Driver);
        assert!(cfg.xdp.replace_if_loaded);
        assert_eq!(cfg.adk.udp_server_port, 12345);
        assert_eq!(cfg.adk.sync_interval_secs, DEFAULT_SYNC_INTERVAL_SECS);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(AdkConfig::parse("[xdp]\nmode = \"hw\"\n").is_err());
    }

    #[test]
    fn test_validate() {
        let mut cfg = AdkConfig::default();
        assert!(cfg.validate().is_err()); // no secret
        cfg.adk.secret = "ABCDEFGH".into();
        assert!(cfg.validate().is_ok());
        cfg.adk.udp_server_port = 0;
        assert!(cfg.validate().is_err());
        cfg.adk.udp_server_port = 1;
        cfg.interface = "this-name-is-too-long".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_iface_names() {
        assert!(validate_iface("eth0").is_ok());
        assert!(validate_iface("wg_home-1").is_ok());
        assert!(validate_iface("").is_err());
        assert!(validate_iface("eth0;rm").is_err());
        assert!(validate_iface("abcdefghijklmnop").is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (cfg, source) = AdkConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.adk.udp_server_port, DEFAULT_UDP_SERVER_PORT);
        assert_eq!(cfg.logging.level, DEFAULT_LOG_LEVEL);
        assert!(matches!(source, ConfigSource::Defaults(_)));
        assert!(source.to_string().starts_with("No config at "));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[adk\nudp_server_port = ").unwrap();
        assert!(AdkConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adk.toml");
        let path = path.to_str().unwrap();

        let mut cfg = AdkConfig::default();
        cfg.adk.secret = "MFRGGZA".into();
        cfg.xdp.mode = Mode::Driver;
        cfg.logging.level = "debug".into();
        cfg.save(Some(path)).unwrap();

        let (loaded, source) = AdkConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.adk.secret, "MFRGGZA");
        assert_eq!(loaded.xdp.mode, Mode::Driver);
        assert_eq!(loaded.logging.level, "debug");
        assert_eq!(source, ConfigSource::File(path.to_string()));
        assert_eq!(source.to_string(), format!("System config loaded: {}", path));
    }
}
