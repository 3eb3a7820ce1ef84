//! OS variant dictionary for OS-specific virtual hardware defaults.
//!
//! Different guest operating systems expect different virtual hardware:
//! - Windows: local-time RTC, a USB tablet for absolute pointing, VGA video
//! - Windows XP/2000: a three stage install and no ACPI on old Xen
//! - Modern Linux: virtio disk and network drivers
//!
//! Each variant belongs to a family; the family profile supplies the values
//! and a few variants override single keys.
//!
//! ## Usage
//!
//! ```rust
//! use limiquantix_guest::osdict::{OsDictionary, OsKey};
//! use limiquantix_guest::OsMetadata;
//!
//! let dict = OsDictionary::new();
//! assert_eq!(dict.lookup(Some("win7"), OsKey::Clock).as_str(), Some("localtime"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::OsMetadata;

/// Keys the default passes look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsKey {
    Clock,
    DiskBus,
    NetModel,
    InputType,
    InputBus,
    VideoModel,
    Acpi,
    Apic,
    XenDisableAcpi,
    VirtioDisk,
    VirtioNet,
    VirtioMmio,
    ThreeStageInstall,
}

impl OsKey {
    pub fn name(&self) -> &'static str {
        match self {
            OsKey::Clock => "clock",
            OsKey::DiskBus => "diskbus",
            OsKey::NetModel => "netmodel",
            OsKey::InputType => "inputtype",
            OsKey::InputBus => "inputbus",
            OsKey::VideoModel => "videomodel",
            OsKey::Acpi => "acpi",
            OsKey::Apic => "apic",
            OsKey::XenDisableAcpi => "xen_disable_acpi",
            OsKey::VirtioDisk => "virtiodisk",
            OsKey::VirtioNet => "virtionet",
            OsKey::VirtioMmio => "virtiommio",
            OsKey::ThreeStageInstall => "three_stage_install",
        }
    }
}

impl fmt::Display for OsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A looked-up value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsValue {
    Str(&'static str),
    Bool(bool),
    Unset,
}

impl OsValue {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            OsValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Booleans; unset reads as false.
    pub fn as_bool(&self) -> bool {
        matches!(self, OsValue::Bool(true))
    }
}

/// Guest OS family - groups variants with the same hardware expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Unknown or unspecified - generic defaults
    #[default]
    Generic,
    /// Older Linux without reliable virtio drivers
    LegacyLinux,
    /// Linux with virtio disk and network drivers
    Linux,
    /// Linux with virtio-mmio support (ARM boards)
    ModernLinux,
    /// Windows 2000/XP/2003
    WindowsLegacy,
    /// Windows Vista and later
    Windows,
    FreeBsd,
}

/// Hardware defaults for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OsProfile {
    clock: &'static str,
    diskbus: Option<&'static str>,
    netmodel: Option<&'static str>,
    inputtype: &'static str,
    inputbus: &'static str,
    videomodel: Option<&'static str>,
    acpi: bool,
    apic: bool,
    xen_disable_acpi: bool,
    virtiodisk: bool,
    virtionet: bool,
    virtiommio: bool,
    three_stage_install: bool,
}

const GENERIC: OsProfile = OsProfile {
    clock: "utc",
    diskbus: None,
    netmodel: None,
    inputtype: "mouse",
    inputbus: "ps2",
    videomodel: None,
    acpi: true,
    apic: true,
    xen_disable_acpi: false,
    virtiodisk: false,
    virtionet: false,
    virtiommio: false,
    three_stage_install: false,
};

impl OsFamily {
    fn profile(self) -> OsProfile {
        match self {
            OsFamily::Generic | OsFamily::LegacyLinux => GENERIC,
            OsFamily::Linux => OsProfile {
                virtiodisk: true,
                virtionet: true,
                ..GENERIC
            },
            OsFamily::ModernLinux => OsProfile {
                virtiodisk: true,
                virtionet: true,
                virtiommio: true,
                ..GENERIC
            },
            OsFamily::WindowsLegacy => OsProfile {
                clock: "localtime",
                inputtype: "tablet",
                inputbus: "usb",
                videomodel: Some("vga"),
                xen_disable_acpi: true,
                three_stage_install: true,
                ..GENERIC
            },
            OsFamily::Windows => OsProfile {
                clock: "localtime",
                inputtype: "tablet",
                inputbus: "usb",
                videomodel: Some("vga"),
                ..GENERIC
            },
            OsFamily::FreeBsd => OsProfile {
                netmodel: Some("e1000"),
                ..GENERIC
            },
        }
    }
}

/// A known OS variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsVariant {
    pub name: &'static str,
    pub label: &'static str,
    pub family: OsFamily,
    /// Single-key overrides of the family profile.
    overrides: &'static [(OsKey, OsValue)],
}

const fn variant(name: &'static str, label: &'static str, family: OsFamily) -> OsVariant {
    OsVariant {
        name,
        label,
        family,
        overrides: &[],
    }
}

static VARIANTS: &[OsVariant] = &[
    variant("generic", "Generic", OsFamily::Generic),
    variant("rhel4", "Red Hat Enterprise Linux 4", OsFamily::LegacyLinux),
    variant("rhel5", "Red Hat Enterprise Linux 5", OsFamily::LegacyLinux),
    variant("rhel5.4", "Red Hat Enterprise Linux 5.4 or later", OsFamily::Linux),
    variant("rhel6", "Red Hat Enterprise Linux 6", OsFamily::Linux),
    variant("rhel7", "Red Hat Enterprise Linux 7", OsFamily::Linux),
    variant("fedora18", "Fedora 18", OsFamily::Linux),
    variant("fedora19", "Fedora 19", OsFamily::ModernLinux),
    variant("fedora20", "Fedora 20", OsFamily::ModernLinux),
    variant("debianwheezy", "Debian Wheezy", OsFamily::Linux),
    variant("ubuntuprecise", "Ubuntu 12.04 LTS (Precise Pangolin)", OsFamily::Linux),
    variant("ubuntusaucy", "Ubuntu 13.10 (Saucy Salamander)", OsFamily::Linux),
    variant("sles10", "Suse Linux Enterprise Server", OsFamily::LegacyLinux),
    variant("sles11", "Suse Linux Enterprise Server 11", OsFamily::Linux),
    OsVariant {
        name: "win2k",
        label: "Microsoft Windows 2000",
        family: OsFamily::WindowsLegacy,
        overrides: &[(OsKey::Acpi, OsValue::Bool(false)), (OsKey::Apic, OsValue::Bool(false))],
    },
    variant("winxp", "Microsoft Windows XP", OsFamily::WindowsLegacy),
    OsVariant {
        name: "win2k3",
        label: "Microsoft Windows Server 2003",
        family: OsFamily::WindowsLegacy,
        overrides: &[(OsKey::ThreeStageInstall, OsValue::Bool(false))],
    },
    variant("vista", "Microsoft Windows Vista", OsFamily::Windows),
    variant("win7", "Microsoft Windows 7", OsFamily::Windows),
    variant("win2k8", "Microsoft Windows Server 2008", OsFamily::Windows),
    variant("freebsd8", "FreeBSD 8.x", OsFamily::FreeBsd),
    variant("freebsd9", "FreeBSD 9.x", OsFamily::FreeBsd),
];

impl OsVariant {
    fn value(&self, key: OsKey) -> OsValue {
        if let Some((_, v)) = self.overrides.iter().find(|(k, _)| *k == key) {
            return v.clone();
        }
        let p = self.family.profile();
        let opt = |v: Option<&'static str>| v.map(OsValue::Str).unwrap_or(OsValue::Unset);
        match key {
            OsKey::Clock => OsValue::Str(p.clock),
            OsKey::DiskBus => opt(p.diskbus),
            OsKey::NetModel => opt(p.netmodel),
            OsKey::InputType => OsValue::Str(p.inputtype),
            OsKey::InputBus => OsValue::Str(p.inputbus),
            OsKey::VideoModel => opt(p.videomodel),
            OsKey::Acpi => OsValue::Bool(p.acpi),
            OsKey::Apic => OsValue::Bool(p.apic),
            OsKey::XenDisableAcpi => OsValue::Bool(p.xen_disable_acpi),
            OsKey::VirtioDisk => OsValue::Bool(p.virtiodisk),
            OsKey::VirtioNet => OsValue::Bool(p.virtionet),
            OsKey::VirtioMmio => OsValue::Bool(p.virtiommio),
            OsKey::ThreeStageInstall => OsValue::Bool(p.three_stage_install),
        }
    }
}

/// Built-in variant table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsDictionary;

impl OsDictionary {
    pub fn new() -> Self {
        Self
    }

    pub fn variants(&self) -> &'static [OsVariant] {
        VARIANTS
    }

    pub fn get(&self, name: &str) -> Option<&'static OsVariant> {
        VARIANTS.iter().find(|v| v.name == name)
    }
}

impl OsMetadata for OsDictionary {
    fn is_valid_variant(&self, variant: &str) -> bool {
        self.get(variant).is_some()
    }

    fn lookup(&self, variant: Option<&str>, key: OsKey) -> OsValue {
        let generic = &VARIANTS[0];
        variant
            .and_then(|name| self.get(name))
            .unwrap_or(generic)
            .value(key)
    }
}
