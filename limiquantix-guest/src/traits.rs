//! Collaborator traits used by the guest model.

use std::path::Path;

use crate::devices::Device;
use crate::domain::DomainOs;
use crate::error::Result;
use crate::guest::Guest;
use crate::osdict::{OsKey, OsValue};
use crate::types::*;

/// Connection to a hypervisor management service.
///
/// The guest model only needs a narrow slice of the management API:
/// version numbers and host facts for default resolution, domain lifecycle
/// calls for installation, and a probe interface for capability checks.
/// Implementations must be safe to share between threads.
pub trait Connection: Send + Sync {
    // =========================================================================
    // Identity & Versions
    // =========================================================================

    /// Connection URI (e.g. `qemu:///system`).
    fn uri(&self) -> &str;

    /// Driver name derived from the URI scheme ("qemu", "xen", "lxc", ...).
    fn driver_name(&self) -> String {
        uri_driver(self.uri())
    }

    fn is_qemu(&self) -> bool {
        self.driver_name() == "qemu"
    }

    fn is_xen(&self) -> bool {
        self.driver_name() == "xen"
    }

    /// Version of the local management library, as `major * 1_000_000 +
    /// minor * 1000 + micro`.
    fn local_lib_version(&self) -> u64;

    /// Version of the management daemon. 0 when it cannot be determined.
    fn daemon_version(&self) -> u64;

    /// Version of the hypervisor driver.
    fn driver_version(&self) -> Result<u64>;

    fn host_capabilities(&self) -> Result<HostCapabilities>;

    // =========================================================================
    // Domain Lifecycle
    // =========================================================================

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainRef>>;

    /// Persistently define a domain.
    fn define_domain(&self, xml: &str) -> Result<DomainRef>;

    /// Create and boot a transient domain.
    fn create_domain(&self, xml: &str) -> Result<DomainRef>;

    /// Boot a defined domain.
    fn start_domain(&self, name: &str) -> Result<()>;

    fn destroy_domain(&self, name: &str) -> Result<()>;

    fn undefine_domain(&self, name: &str) -> Result<()>;

    fn set_autostart(&self, name: &str, autostart: bool) -> Result<()>;

    /// Every guest known to the connection, active or not.
    fn list_guests(&self) -> Result<Vec<GuestRecord>>;

    // =========================================================================
    // Capability Probes
    // =========================================================================

    /// True when the API exposes `function` on `object`.
    fn has_function(&self, object: ProbeObject, function: &str) -> bool;

    /// True when the API defines the named flag constant.
    fn has_flag(&self, flag: &str) -> bool;

    /// Invoke `function` on `target` to see whether the driver implements it.
    fn probe(
        &self,
        target: &ProbeTarget,
        function: &str,
        args: &[ProbeArg],
    ) -> std::result::Result<(), ProbeError>;
}

/// Driver name from a connection URI: `qemu+ssh://host/system` gives "qemu".
pub fn uri_driver(uri: &str) -> String {
    let scheme = uri.split("://").next().unwrap_or(uri);
    let driver = scheme.split('+').next().unwrap_or(scheme);
    driver.to_ascii_lowercase()
}

/// Receives progress updates from long-running operations.
pub trait ProgressMeter {
    fn start(&mut self, text: &str, size: Option<u64>);
    fn update(&mut self, done: u64);
    fn end(&mut self, done: u64);
}

/// Source of OS variant metadata.
pub trait OsMetadata: Send + Sync {
    fn is_valid_variant(&self, variant: &str) -> bool;

    /// Look up `key` for `variant`, falling back to the generic default.
    fn lookup(&self, variant: Option<&str>, key: OsKey) -> OsValue;
}

/// Installation method for a guest.
///
/// An installer may contribute a separate install phase (e.g. booting from
/// install media) and adjusts the OS block for each phase.
pub trait Installer: Send {
    /// Prepare media. `scratch_dir` is removed after installation.
    fn prepare(
        &mut self,
        guest: &Guest,
        meter: &mut dyn ProgressMeter,
        scratch_dir: &Path,
    ) -> Result<()>;

    /// True when installing needs a separate boot with its own config.
    fn has_install_phase(&self) -> bool;

    /// Adjust the OS block for the install (`is_install`) or final boot.
    fn alter_bootconfig(
        &self,
        guest: &Guest,
        is_install: bool,
        os: &mut DomainOs,
    ) -> Result<()>;

    /// Devices attached only for the install phase.
    fn install_devices(&self) -> Vec<Device> {
        Vec::new()
    }

    fn cleanup(&mut self) {}

    /// Install media location, if any.
    fn location(&self) -> Option<&str> {
        None
    }
}
