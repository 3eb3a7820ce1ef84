//! Capability checks against a live connection.
//!
//! Libvirt offers little feature introspection, so whether a feature can be
//! used is decided from a mix of evidence:
//!
//! 1. **API probes**: the binding must expose the function (and flag), and
//!    when probe arguments are registered the call is actually made. A
//!    successful call is conclusive.
//! 2. **Library versions**: the local library and the daemon must both be
//!    at least the required version.
//! 3. **Driver versions**: the connection driver must be listed, and its
//!    version must meet the threshold. A negative threshold means "at most".
//!
//! Checks are registered in a static table indexed by [`SupportFeature`] and
//! evaluated fresh on every call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{GuestError, Result};
use crate::traits::Connection;
use crate::types::{ProbeArg, ProbeError, ProbeObject, ProbeTarget};

/// Daemon version assumed when the daemon does not report one.
const UNKNOWN_DAEMON_VERSION: u64 = 1_000_000_000;

// =============================================================================
// COMPAT MODE
// =============================================================================

/// Which distribution's version thresholds apply.
///
/// RHEL6 backports many features to older version numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatMode {
    /// Decide from the guest: rhel6 for qemu/kvm guests whose emulator
    /// lives under `/usr/libexec/qemu`.
    #[default]
    Auto,
    Upstream,
    Rhel6,
}

impl CompatMode {
    /// Resolve `Auto` against a guest's hypervisor type and emulator.
    pub fn resolve(self, hv_type: &str, emulator: Option<&str>) -> CompatMode {
        match self {
            CompatMode::Auto => {
                let qemu = matches!(hv_type, "qemu" | "kvm");
                let libexec = emulator
                    .map(|e| e.starts_with("/usr/libexec/qemu"))
                    .unwrap_or(false);
                if qemu && libexec {
                    CompatMode::Rhel6
                } else {
                    CompatMode::Upstream
                }
            }
            other => other,
        }
    }

    pub fn is_rhel6(self) -> bool {
        self == CompatMode::Rhel6
    }
}

impl FromStr for CompatMode {
    type Err = GuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(CompatMode::Auto),
            "upstream" => Ok(CompatMode::Upstream),
            "rhel6" => Ok(CompatMode::Rhel6),
            other => Err(GuestError::Validation(format!("unknown compat mode '{}'", other))),
        }
    }
}

// =============================================================================
// CHECK TABLE
// =============================================================================

/// Argument for a registered probe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckArg {
    Null,
    Int(i64),
}

impl From<CheckArg> for ProbeArg {
    fn from(arg: CheckArg) -> Self {
        match arg {
            CheckArg::Null => ProbeArg::Null,
            CheckArg::Int(i) => ProbeArg::Int(i),
        }
    }
}

/// Driver (or hypervisor type) name and version threshold.
pub type VersionReq = (&'static str, i64);

/// One registered capability check.
#[derive(Debug, Clone, Copy)]
pub struct SupportCheck {
    pub function: Option<(ProbeObject, &'static str)>,
    pub args: Option<&'static [CheckArg]>,
    pub flag: Option<&'static str>,
    pub version: u64,
    pub force_version: bool,
    pub drv_version: &'static [VersionReq],
    pub drv_libvirt_version: &'static [VersionReq],
    pub hv_version: &'static [VersionReq],
    pub rhel6_version: u64,
    pub rhel6_drv_version: &'static [VersionReq],
}

impl SupportCheck {
    pub const fn new() -> Self {
        Self {
            function: None,
            args: None,
            flag: None,
            version: 0,
            force_version: false,
            drv_version: &[],
            drv_libvirt_version: &[],
            hv_version: &[],
            rhel6_version: 0,
            rhel6_drv_version: &[],
        }
    }

    const fn function(self, object: ProbeObject, name: &'static str) -> Self {
        Self { function: Some((object, name)), ..self }
    }

    const fn args(self, args: &'static [CheckArg]) -> Self {
        Self { args: Some(args), ..self }
    }

    const fn flag(self, flag: &'static str) -> Self {
        Self { flag: Some(flag), ..self }
    }

    const fn version(self, version: u64) -> Self {
        Self { version, ..self }
    }

    const fn force_version(self) -> Self {
        Self { force_version: true, ..self }
    }

    const fn drv_version(self, reqs: &'static [VersionReq]) -> Self {
        Self { drv_version: reqs, ..self }
    }

    const fn drv_libvirt_version(self, reqs: &'static [VersionReq]) -> Self {
        Self { drv_libvirt_version: reqs, ..self }
    }

    const fn rhel6_version(self, version: u64) -> Self {
        Self { rhel6_version: version, ..self }
    }

    const fn rhel6_drv_version(self, reqs: &'static [VersionReq]) -> Self {
        Self { rhel6_drv_version: reqs, ..self }
    }

    fn min_lib_version(&self, compat: CompatMode) -> u64 {
        if compat.is_rhel6() && self.rhel6_version != 0 {
            self.rhel6_version
        } else {
            self.version
        }
    }

    fn driver_reqs(&self, compat: CompatMode) -> &'static [VersionReq] {
        if compat.is_rhel6() && !self.rhel6_drv_version.is_empty() {
            self.rhel6_drv_version
        } else {
            self.drv_version
        }
    }
}

impl Default for SupportCheck {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! support_features {
    ($($variant:ident => $name:literal,)*) => {
        /// Registered capability checks.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SupportFeature {
            $($variant,)*
        }

        impl SupportFeature {
            pub const ALL: &'static [SupportFeature] = &[$(SupportFeature::$variant,)*];

            /// Stable lower-case name, e.g. `"conn_storage"`.
            pub fn name(self) -> &'static str {
                match self {
                    $(SupportFeature::$variant => $name,)*
                }
            }
        }
    };
}

support_features! {
    ConnStorage => "conn_storage",
    ConnNodedev => "conn_nodedev",
    ConnFindPoolSources => "conn_findpoolsources",
    ConnKeymapAutodetect => "conn_keymap_autodetect",
    ConnGetHostname => "conn_gethostname",
    ConnDomainVideo => "conn_domain_video",
    ConnNetwork => "conn_network",
    ConnInterface => "conn_interface",
    ConnMaxvcpusXml => "conn_maxvcpus_xml",
    ConnStream => "conn_stream",
    ConnGetVersion => "conn_getversion",
    ConnLibVersion => "conn_libversion",
    ConnListAllDomains => "conn_listalldomains",
    ConnListAllNetworks => "conn_listallnetworks",
    ConnListAllStoragePools => "conn_listallstoragepools",
    ConnListAllInterfaces => "conn_listallinterfaces",
    ConnVirtioMmio => "conn_virtio_mmio",
    ConnDiskSd => "conn_disk_sd",
    DomainGetVcpus => "domain_getvcpus",
    DomainXmlInactive => "domain_xml_inactive",
    DomainXmlSecure => "domain_xml_secure",
    DomainManagedSave => "domain_managed_save",
    DomainMigrateDowntime => "domain_migrate_downtime",
    DomainJobInfo => "domain_job_info",
    DomainConsoleStream => "domain_console_stream",
    DomainSetMetadata => "domain_set_metadata",
    DomainCpuHostModel => "domain_cpu_host_model",
    DomainListSnapshots => "domain_list_snapshots",
    StorageCreateVolFrom => "storage_createvolfrom",
    StorageIsActive => "storage_isactive",
    NodedevPciDetach => "nodedev_pci_detach",
    InterfaceXmlInactive => "interface_xml_inactive",
    InterfaceIsActive => "interface_isactive",
    HvSkipDefaultAcpi => "hv_skip_default_acpi",
    HvSoundAc97 => "hv_sound_ac97",
    HvSoundIch6 => "hv_sound_ich6",
    HvGraphicsSpice => "hv_graphics_spice",
    HvCharSpicevmc => "hv_char_spicevmc",
    HvDirectInterface => "hv_direct_interface",
    HvFilesystem => "hv_filesystem",
    StreamUpload => "stream_upload",
    NetIsActive => "net_isactive",
}

use ProbeObject::{Connection as Conn, Domain as Dom, Interface as Iface, Network as Net};

const NO_ARGS: &[CheckArg] = &[];

/// Checks in [`SupportFeature`] declaration order.
static SUPPORT_CHECKS: &[SupportCheck] = &[
    // Connection checks
    SupportCheck::new().function(Conn, "listStoragePools").args(NO_ARGS),
    SupportCheck::new()
        .function(Conn, "listDevices")
        .args(&[CheckArg::Null, CheckArg::Int(0)]),
    SupportCheck::new().function(Conn, "findStoragePoolSources"),
    SupportCheck::new().drv_version(&[("qemu", 11000)]),
    SupportCheck::new().function(Conn, "getHostname").args(NO_ARGS),
    SupportCheck::new().version(6005),
    SupportCheck::new().function(Conn, "listNetworks").args(NO_ARGS),
    SupportCheck::new().function(Conn, "listInterfaces").args(NO_ARGS),
    SupportCheck::new().version(8005),
    // Earliest version with working stream bindings
    SupportCheck::new()
        .version(9003)
        .function(Conn, "newStream")
        .args(&[CheckArg::Int(0)]),
    SupportCheck::new().function(Conn, "getVersion").args(NO_ARGS),
    SupportCheck::new().function(Conn, "getLibVersion").args(NO_ARGS),
    SupportCheck::new().function(Conn, "listAllDomains").args(NO_ARGS),
    SupportCheck::new().function(Conn, "listAllNetworks").args(NO_ARGS),
    SupportCheck::new().function(Conn, "listAllStoragePools").args(NO_ARGS),
    SupportCheck::new().function(Conn, "listAllInterfaces").args(NO_ARGS),
    SupportCheck::new()
        .version(1_001_002)
        .drv_version(&[("qemu", 1_006_000)]),
    SupportCheck::new().version(1_001_002),
    // Domain checks
    SupportCheck::new().function(Dom, "vcpus").args(NO_ARGS),
    SupportCheck::new()
        .function(Dom, "XMLDesc")
        .args(NO_ARGS)
        .flag("VIR_DOMAIN_XML_INACTIVE"),
    SupportCheck::new()
        .function(Dom, "XMLDesc")
        .args(NO_ARGS)
        .flag("VIR_DOMAIN_XML_SECURE"),
    SupportCheck::new()
        .function(Dom, "hasManagedSaveImage")
        .args(&[CheckArg::Int(0)]),
    // Bogus flags so an existing downtime value is not overwritten
    SupportCheck::new()
        .function(Dom, "migrateSetMaxDowntime")
        .args(&[CheckArg::Int(30), CheckArg::Int(12_345_678)]),
    SupportCheck::new().function(Dom, "jobInfo").args(NO_ARGS),
    SupportCheck::new().version(9003),
    SupportCheck::new().version(9010),
    SupportCheck::new().version(9010),
    SupportCheck::new().function(Dom, "listAllSnapshots").args(NO_ARGS),
    // Pool checks; never require a pool object
    SupportCheck::new()
        .function(ProbeObject::StoragePool, "createXMLFrom")
        .version(6004),
    SupportCheck::new()
        .function(ProbeObject::StoragePool, "isActive")
        .args(NO_ARGS),
    // Nodedev checks; never require a nodedev object
    SupportCheck::new()
        .function(ProbeObject::NodeDevice, "dettach")
        .version(6001),
    // Interface checks
    SupportCheck::new()
        .function(Iface, "XMLDesc")
        .flag("VIR_INTERFACE_XML_INACTIVE")
        .args(NO_ARGS),
    SupportCheck::new().function(Iface, "isActive").args(NO_ARGS),
    // Hypervisor checks
    SupportCheck::new().drv_version(&[("xen", -3_001_000)]),
    SupportCheck::new()
        .version(6000)
        .force_version()
        .drv_version(&[("qemu", 11000)]),
    SupportCheck::new()
        .version(8008)
        .drv_version(&[("qemu", 14000)])
        .rhel6_drv_version(&[("qemu", 12001)])
        .rhel6_version(8007),
    SupportCheck::new()
        .version(8006)
        .drv_version(&[("qemu", 14000)]),
    SupportCheck::new()
        .version(8008)
        .drv_version(&[("qemu", 14000)]),
    SupportCheck::new()
        .version(8007)
        .drv_version(&[("qemu", 0)]),
    SupportCheck::new()
        .drv_version(&[("qemu", 13000), ("lxc", 0), ("openvz", 0), ("test", 0)])
        .drv_libvirt_version(&[("qemu", 8005), ("lxc", 0), ("openvz", 0), ("test", 0)]),
    // Stream checks: latest tested for URL installs
    SupportCheck::new().version(9004),
    // Network checks
    SupportCheck::new().function(Net, "isActive").args(NO_ARGS),
];

impl SupportFeature {
    pub fn check(self) -> &'static SupportCheck {
        &SUPPORT_CHECKS[self as usize]
    }

    pub fn from_name(name: &str) -> Option<SupportFeature> {
        let name = name.to_ascii_lowercase().replace('-', "_");
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl fmt::Display for SupportFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Extra context for a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SupportData {
    #[default]
    None,
    /// Guest `<domain type=...>` value, for per-hypervisor thresholds.
    HvType(String),
    /// Object a probe runs against.
    Object(ProbeTarget),
}

fn version_matches(reqs: &[VersionReq], name: &str, actual: u64) -> bool {
    reqs.iter().filter(|(n, _)| *n == name).any(|(_, min)| {
        if *min < 0 {
            actual <= min.unsigned_abs()
        } else {
            actual >= *min as u64
        }
    })
}

/// Evaluate `feature` against `conn`.
///
/// Returns an error only when `data` is the wrong kind of object for a
/// probe, which is a programming error in the caller.
#[instrument(skip(conn, data, feature), fields(feature = %feature))]
pub fn check_support(
    conn: &dyn Connection,
    feature: SupportFeature,
    data: &SupportData,
    compat: CompatMode,
) -> Result<bool> {
    let check = feature.check();
    let min_lib_version = check.min_lib_version(compat);
    let driver_reqs = check.driver_reqs(compat);

    if let Some((object, function)) = check.function {
        if !conn.has_function(object, function) {
            debug!(object = object.class_name(), function, "Function not available");
            return Ok(false);
        }
        let mut call_args: Vec<ProbeArg> = Vec::new();
        if let Some(flag) = check.flag {
            if !conn.has_flag(flag) {
                debug!(flag, "Flag not available");
                return Ok(false);
            }
        }

        if let Some(args) = check.args {
            let target = match (data, object) {
                (SupportData::Object(target), _) if target.object() == object => target.clone(),
                (SupportData::None | SupportData::HvType(_), ProbeObject::Connection) => {
                    ProbeTarget::Connection
                }
                (other, _) => {
                    return Err(GuestError::Internal(format!(
                        "passed object {:?} with args must be of type {}",
                        other,
                        object.class_name()
                    )));
                }
            };
            call_args.extend(args.iter().copied().map(ProbeArg::from));
            if let Some(flag) = check.flag {
                call_args.push(ProbeArg::Flag(flag.to_string()));
            }

            // A real call is all the proof we need.
            let supported = match conn.probe(&target, function, &call_args) {
                Ok(()) => true,
                Err(ProbeError::NoSupport(_)) => false,
                Err(ProbeError::Hypervisor(_)) => check.flag.is_none(),
                Err(ProbeError::Binding(_)) => false,
            };
            debug!(function, supported, "Probe result");
            return Ok(supported);
        }
    }

    let drv_type = conn.driver_name();
    let lib_version = conn.local_lib_version();
    let mut daemon_version = conn.daemon_version();
    let drv_version = conn.driver_version().unwrap_or(0);
    if daemon_version == 0 && !check.force_version {
        daemon_version = UNKNOWN_DAEMON_VERSION;
    }

    if min_lib_version > lib_version || min_lib_version > daemon_version {
        return Ok(false);
    }
    if !driver_reqs.is_empty() && !version_matches(driver_reqs, &drv_type, drv_version) {
        return Ok(false);
    }
    if !check.drv_libvirt_version.is_empty()
        && !version_matches(check.drv_libvirt_version, &drv_type, lib_version)
    {
        return Ok(false);
    }
    if !check.hv_version.is_empty() {
        let hv_type = match data {
            SupportData::HvType(hv) => hv.as_str(),
            _ => "",
        };
        if !version_matches(check.hv_version, hv_type, drv_version) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Connection-level check with no extra data.
pub fn check_conn_support(conn: &dyn Connection, feature: SupportFeature, compat: CompatMode) -> bool {
    check_support(conn, feature, &SupportData::None, compat).unwrap_or(false)
}

/// Check qualified by a guest hypervisor type.
pub fn check_conn_hv_support(
    conn: &dyn Connection,
    feature: SupportFeature,
    hv_type: &str,
    compat: CompatMode,
) -> bool {
    check_support(conn, feature, &SupportData::HvType(hv_type.to_string()), compat).unwrap_or(false)
}

/// Check against a specific object, e.g. a domain.
pub fn check_object_support(
    conn: &dyn Connection,
    feature: SupportFeature,
    target: ProbeTarget,
    compat: CompatMode,
) -> Result<bool> {
    check_support(conn, feature, &SupportData::Object(target), compat)
}

/// Fail with [`GuestError::Unsupported`] when `feature` is unavailable.
pub fn require_support(
    conn: &dyn Connection,
    feature: SupportFeature,
    data: &SupportData,
    compat: CompatMode,
) -> Result<()> {
    if check_support(conn, feature, data, compat)? {
        Ok(())
    } else {
        Err(GuestError::Unsupported(feature.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;

    fn qemu(lib: u64, daemon: u64, driver: u64) -> MockConnection {
        MockConnection::new("qemu:///system").with_versions(lib, daemon, driver)
    }

    #[test]
    fn test_table_covers_every_feature() {
        assert_eq!(SUPPORT_CHECKS.len(), SupportFeature::ALL.len());
        for (i, f) in SupportFeature::ALL.iter().enumerate() {
            assert_eq!(*f as usize, i);
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(SupportFeature::from_name("hv_sound_ich6"), Some(SupportFeature::HvSoundIch6));
        assert_eq!(SupportFeature::from_name("HV-SOUND-AC97"), Some(SupportFeature::HvSoundAc97));
        assert_eq!(SupportFeature::from_name("nope"), None);
    }

    #[test]
    fn test_negative_threshold_means_at_most() {
        let old_xen = MockConnection::new("xen:///").with_versions(1_000_000, 1_000_000, 3_000_000);
        let new_xen = MockConnection::new("xen:///").with_versions(1_000_000, 1_000_000, 3_002_000);
        let exact = MockConnection::new("xen:///").with_versions(1_000_000, 1_000_000, 3_001_000);

        assert!(check_conn_support(&old_xen, SupportFeature::HvSkipDefaultAcpi, CompatMode::Upstream));
        assert!(check_conn_support(&exact, SupportFeature::HvSkipDefaultAcpi, CompatMode::Upstream));
        assert!(!check_conn_support(&new_xen, SupportFeature::HvSkipDefaultAcpi, CompatMode::Upstream));

        // Driver not listed
        let kvm = qemu(1_000_000, 1_000_000, 1_000_000);
        assert!(!check_conn_support(&kvm, SupportFeature::HvSkipDefaultAcpi, CompatMode::Upstream));
    }

    #[test]
    fn test_daemon_version_zero_treated_as_new() {
        let conn = qemu(9_000, 0, 14_000);
        assert!(check_conn_support(&conn, SupportFeature::HvSoundIch6, CompatMode::Upstream));

        // AC97 forces the daemon version check
        assert!(!check_conn_support(&conn, SupportFeature::HvSoundAc97, CompatMode::Upstream));
        let conn = qemu(9_000, 9_000, 14_000);
        assert!(check_conn_support(&conn, SupportFeature::HvSoundAc97, CompatMode::Upstream));
    }

    #[test]
    fn test_rhel6_thresholds() {
        let conn = qemu(8_007, 8_007, 12_001);
        assert!(!check_conn_support(&conn, SupportFeature::HvSoundIch6, CompatMode::Upstream));
        assert!(check_conn_support(&conn, SupportFeature::HvSoundIch6, CompatMode::Rhel6));

        // No rhel6 override: upstream thresholds still apply
        assert!(!check_conn_support(&conn, SupportFeature::HvCharSpicevmc, CompatMode::Rhel6));
    }

    #[test]
    fn test_lib_version_and_driver_libvirt_version() {
        let conn = qemu(8_005, 8_005, 13_000);
        assert!(check_conn_support(&conn, SupportFeature::HvFilesystem, CompatMode::Upstream));
        let conn = qemu(8_004, 8_004, 13_000);
        assert!(!check_conn_support(&conn, SupportFeature::HvFilesystem, CompatMode::Upstream));

        let lxc = MockConnection::new("lxc:///").with_versions(1, 1, 1);
        assert!(check_conn_support(&lxc, SupportFeature::HvFilesystem, CompatMode::Upstream));
        let xen = MockConnection::new("xen:///");
        assert!(!check_conn_support(&xen, SupportFeature::HvFilesystem, CompatMode::Upstream));
    }

    #[test]
    fn test_function_probes() {
        let conn = qemu(1_000_000, 1_000_000, 1_000_000);
        assert!(check_conn_support(&conn, SupportFeature::ConnStorage, CompatMode::Upstream));

        let conn = qemu(1_000_000, 1_000_000, 1_000_000)
            .with_probe_error("listNetworks", ProbeError::NoSupport("no".into()));
        assert!(!check_conn_support(&conn, SupportFeature::ConnNetwork, CompatMode::Upstream));

        // Hypervisor errors count as supported unless a flag was passed
        let conn = qemu(1_000_000, 1_000_000, 1_000_000)
            .with_probe_error("listInterfaces", ProbeError::Hypervisor("boom".into()))
            .with_probe_error("XMLDesc", ProbeError::Hypervisor("boom".into()));
        assert!(check_conn_support(&conn, SupportFeature::ConnInterface, CompatMode::Upstream));
        let dom = ProbeTarget::Domain("vm1".into());
        assert!(!check_object_support(&conn, SupportFeature::DomainXmlSecure, dom, CompatMode::Upstream).unwrap());

        let conn = qemu(1_000_000, 1_000_000, 1_000_000)
            .with_probe_error("getHostname", ProbeError::Binding("bad args".into()));
        assert!(!check_conn_support(&conn, SupportFeature::ConnGetHostname, CompatMode::Upstream));
    }

    #[test]
    fn test_missing_function_or_flag() {
        let conn = qemu(1_000_000, 1_000_000, 1_000_000).with_function(Conn, "getVersion");
        assert!(check_conn_support(&conn, SupportFeature::ConnGetVersion, CompatMode::Upstream));
        assert!(!check_conn_support(&conn, SupportFeature::ConnLibVersion, CompatMode::Upstream));

        let conn = qemu(1_000_000, 1_000_000, 1_000_000).without_flag("VIR_DOMAIN_XML_INACTIVE");
        let dom = ProbeTarget::Domain("vm1".into());
        assert!(!check_object_support(&conn, SupportFeature::DomainXmlInactive, dom, CompatMode::Upstream).unwrap());
    }

    #[test]
    fn test_function_without_args_falls_through_to_versions() {
        let conn = qemu(6_004, 6_004, 1);
        assert!(check_conn_support(&conn, SupportFeature::StorageCreateVolFrom, CompatMode::Upstream));
        let conn = qemu(6_003, 6_003, 1);
        assert!(!check_conn_support(&conn, SupportFeature::StorageCreateVolFrom, CompatMode::Upstream));
    }

    #[test]
    fn test_wrong_object_type_is_an_error() {
        let conn = qemu(1_000_000, 1_000_000, 1_000_000);
        let result = check_support(&conn, SupportFeature::DomainGetVcpus, &SupportData::None, CompatMode::Upstream);
        assert!(result.is_err());

        let result = check_object_support(
            &conn,
            SupportFeature::DomainGetVcpus,
            ProbeTarget::Network("default".into()),
            CompatMode::Upstream,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_require_support() {
        let conn = qemu(8_000, 8_000, 14_000);
        let err = require_support(&conn, SupportFeature::HvGraphicsSpice, &SupportData::None, CompatMode::Upstream)
            .unwrap_err();
        assert!(matches!(err, GuestError::Unsupported(ref f) if f == "hv_graphics_spice"));
    }

    #[test]
    fn test_compat_resolution() {
        assert_eq!(
            CompatMode::Auto.resolve("kvm", Some("/usr/libexec/qemu-kvm")),
            CompatMode::Rhel6
        );
        assert_eq!(CompatMode::Auto.resolve("kvm", Some("/usr/bin/qemu-kvm")), CompatMode::Upstream);
        assert_eq!(CompatMode::Auto.resolve("xen", Some("/usr/libexec/qemu-kvm")), CompatMode::Upstream);
        assert_eq!(CompatMode::Upstream.resolve("kvm", Some("/usr/libexec/qemu-kvm")), CompatMode::Upstream);
        assert_eq!("rhel6".parse::<CompatMode>().unwrap(), CompatMode::Rhel6);
    }
}
