//! Configuration management for the guest tool.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use limiquantix_guest::{
    CompatMode, HostCapabilities, OsDictionary, OsMetadata, ProbeObject,
};

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hypervisor connection
    pub connection: ConnectionConfig,
    /// Settings applied to every guest the tool loads
    pub guest: GuestConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.uri {
            self.connection.uri = uri.clone();
        }

        if let Some(ref variant) = args.variant {
            self.guest.variant = Some(variant.clone());
        }

        if let Some(compat) = args.compat {
            self.guest.compat = compat;
        }

        self
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.connection.uri.trim().is_empty() {
            bail!("connection.uri must not be empty");
        }

        if let Some(ref variant) = self.guest.variant {
            if !OsDictionary::new().is_valid_variant(&variant.to_ascii_lowercase()) {
                bail!("Distro '{}' does not exist in our dictionary", variant);
            }
        }

        match (self.guest.installer.kind, &self.guest.installer.location) {
            (InstallerKind::Cdrom, None) => {
                bail!("guest.installer.location is required for cdrom installs")
            }
            (InstallerKind::Import | InstallerKind::Pxe, Some(_)) => {
                bail!("guest.installer.location is only used by cdrom installs")
            }
            _ => {}
        }

        if self.connection.backend == Backend::Libvirt && !limiquantix_guest::libvirt::is_available() {
            bail!("libvirt support is not compiled in; rebuild with --features libvirt");
        }

        Ok(())
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Backend type
    pub backend: Backend,
    /// Connection URI; for the mock it selects the driver
    pub uri: String,
    /// Behaviour of the mock backend
    pub mock: MockConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mock,
            uri: "qemu:///system".to_string(),
            mock: MockConfig::default(),
        }
    }
}

/// Connection backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory connection for testing/development
    #[default]
    Mock,
    /// Libvirt daemon
    Libvirt,
}

/// Mock connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Library version as major * 1000000 + minor * 1000 + micro
    pub lib_version: u64,
    pub daemon_version: u64,
    pub driver_version: u64,
    pub host: HostCapabilities,
    /// Restrict the known API functions; all exist when unset
    pub functions: Option<Vec<MockFunction>>,
    /// API flags the mock pretends not to know
    pub missing_flags: Vec<String>,
    /// Guests that already exist on the connection
    pub guests: Vec<MockGuest>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            lib_version: 1_002_000,
            daemon_version: 1_002_000,
            driver_version: 1_006_000,
            host: HostCapabilities::default(),
            functions: None,
            missing_flags: Vec::new(),
            guests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockFunction {
    pub object: ProbeObject,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockGuest {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub macs: Vec<String>,
}

/// Guest settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    pub variant: Option<String>,
    pub compat: CompatMode,
    pub installer: InstallerConfig,
    /// Start the guest when the host boots
    pub autostart: bool,
    /// Replace an existing guest with the same name
    pub replace: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub kind: InstallerKind,
    /// Install media, for cdrom installs
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerKind {
    /// Boot an existing disk image
    #[default]
    Import,
    Pxe,
    Cdrom,
}
