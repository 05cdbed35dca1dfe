//! Driver daemon configuration

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    #[serde(default = "DriverSettings::default_log_level")]
    pub log_level: String,
    /// Directory the per-device socket nodes are created in
    #[serde(default = "DriverSettings::default_node_dir")]
    pub node_dir: PathBuf,
    /// Node name prefix; the minor is appended
    #[serde(default = "DriverSettings::default_node_prefix")]
    pub node_prefix: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            node_dir: Self::default_node_dir(),
            node_prefix: Self::default_node_prefix(),
        }
    }
}

impl DriverSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_node_dir() -> PathBuf {
        PathBuf::from("/run/launcher")
    }

    fn default_node_prefix() -> String {
        "launcher".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ID to bind, as "0x2123"
    #[serde(default = "UsbSettings::default_vendor_id")]
    pub vendor_id: String,
    #[serde(default = "UsbSettings::default_product_id")]
    pub product_id: String,
    /// Longest single wait on the status endpoint, in milliseconds
    #[serde(default = "UsbSettings::default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            poll_timeout_ms: Self::default_poll_timeout_ms(),
        }
    }
}

impl UsbSettings {
    fn default_vendor_id() -> String {
        format!("{:#06x}", protocol::VENDOR_ID)
    }

    fn default_product_id() -> String {
        format!("{:#06x}", protocol::PRODUCT_ID)
    }

    fn default_poll_timeout_ms() -> u64 {
        10
    }

    /// Parsed (vendor, product) pair
    pub fn device_ids(&self) -> Result<(u16, u16)> {
        Ok((
            parse_hex_id(&self.vendor_id, "vendor_id")?,
            parse_hex_id(&self.product_id, "product_id")?,
        ))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl DriverConfig {
    /// Load configuration from `path`, or from the first standard location
    /// that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/launcher/driver.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.driver.node_dir =
            PathBuf::from(shellexpand::tilde(&config.driver.node_dir.to_string_lossy()).as_ref());
        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Per-user configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("launcher").join("driver.toml")
        } else {
            PathBuf::from(".config/launcher/driver.toml")
        }
    }

    /// Socket node path for `minor`
    pub fn node_path(&self, minor: protocol::Minor) -> PathBuf {
        self.driver
            .node_dir
            .join(format!("{}{}", self.driver.node_prefix, minor))
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.driver.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.driver.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.driver.node_prefix.is_empty() || self.driver.node_prefix.contains('/') {
            return Err(anyhow!(
                "Invalid node prefix '{}', must be a non-empty file name",
                self.driver.node_prefix
            ));
        }

        self.usb.device_ids()?;

        if self.usb.poll_timeout_ms == 0 {
            return Err(anyhow!("poll_timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}

/// Parse a "0x1234" style USB ID
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("Invalid {} '{}', must start with '0x' (e.g., '0x1234')", name, id))?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Minor;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.driver.log_level, "info");
        assert_eq!(config.driver.node_dir, PathBuf::from("/run/launcher"));
        assert_eq!(config.usb.vendor_id, "0x2123");
        assert_eq!(config.usb.product_id, "0x1010");
        assert_eq!(config.usb.device_ids().unwrap(), (0x2123, 0x1010));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_node_path() {
        let config = DriverConfig::default();
        assert_eq!(
            config.node_path(Minor(2)),
            PathBuf::from("/run/launcher/launcher2")
        );
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x2123", "vid").unwrap(), 0x2123);
        assert_eq!(parse_hex_id("0XABCD", "vid").unwrap(), 0xabcd);
        assert!(parse_hex_id("2123", "vid").is_err());
        assert!(parse_hex_id("0x", "vid").is_err());
        assert!(parse_hex_id("0x12345", "vid").is_err());
        assert!(parse_hex_id("0xGHIJ", "vid").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DriverConfig::default();
        config.driver.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.driver.node_prefix = String::new();
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.usb.product_id = "1010".to_string();
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.usb.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: DriverConfig = toml::from_str("[driver]\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(config.driver.log_level, "debug");
        assert_eq!(config.driver.node_prefix, "launcher");
        assert_eq!(config.usb.poll_timeout_ms, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("driver.toml");

        let mut config = DriverConfig::default();
        config.driver.node_dir = dir.path().join("nodes");
        config.usb.poll_timeout_ms = 25;
        config.save(&path).unwrap();

        let loaded = DriverConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.driver.node_dir, dir.path().join("nodes"));
        assert_eq!(loaded.usb.poll_timeout_ms, 25);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("driver.toml");
        fs::write(&path, "[usb]\nvendor_id = \"nope\"\n").unwrap();

        assert!(DriverConfig::load(Some(path)).is_err());
    }
}
