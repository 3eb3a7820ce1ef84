//! # limiquantix Guest
//!
//! Typed model of libvirt domain definitions.
//!
//! This crate reads, edits and writes guest configuration documents while
//! keeping everything it does not understand intact:
//! - **Binding layer** - typed properties mapped onto XML paths
//! - **Devices** - disks, NICs, consoles, controllers and the rest of
//!   `<devices>`, with PCI address bookkeeping
//! - **Guest** - the `<domain>` aggregate, install orchestration and
//!   rollback-safe document generation
//! - **Defaults** - hypervisor, host and OS variant aware default resolution
//! - **Support matrix** - version and API probe driven feature checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Guest                   │
//! │  (sub-objects, devices, installer)      │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         ▼             ▼             ▼
//! ┌──────────────┐ ┌──────────┐ ┌──────────────┐
//! │   Defaults   │ │ Binding  │ │   Support    │
//! │ (osdict,host)│ │  (xml)   │ │ (Connection) │
//! └──────────────┘ └──────────┘ └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use limiquantix_guest::{Guest, MockConnection, VirtualDisk};
//!
//! let conn = Arc::new(MockConnection::new("qemu:///system"));
//! let mut guest = Guest::new(conn);
//! guest.set_guest_type(Some("kvm")).unwrap();
//! guest.set_name(Some("demo")).unwrap();
//! guest.os_mut().set_os_type(Some("hvm")).unwrap();
//! guest.add_device(VirtualDisk::with_path("disk", "/var/lib/images/demo.img").unwrap());
//!
//! let xml = guest.get_config_xml().unwrap();
//! assert!(xml.contains("<name>demo</name>"));
//! assert!(xml.contains("/var/lib/images/demo.img"));
//! ```

pub mod binding;
mod defaults;
pub mod devices;
pub mod domain;
pub mod error;
pub mod guest;
pub mod installer;
pub mod libvirt;
pub mod mock;
pub mod osdict;
pub mod progress;
pub mod support;
pub mod traits;
pub mod types;
pub mod validate;
pub mod xml;

pub use binding::{PropValue, XmlBuilder, XmlProperty};
pub use devices::{
    CharDevice, CharKind, Device, DeviceFilter, DeviceId, DeviceKind, VirtualController,
    VirtualDevice, VirtualDisk, VirtualFilesystem, VirtualGraphics, VirtualHostDevice,
    VirtualInput, VirtualInterface, VirtualMemballoon, VirtualRedirDevice, VirtualSmartCard,
    VirtualSound, VirtualTpm, VirtualVideo, VirtualWatchdog,
};
pub use domain::{
    DomainClock, DomainCpu, DomainFeatures, DomainNumatune, DomainOs, DomainSeclabel,
};
pub use error::{GuestError, Result};
pub use guest::Guest;
pub use installer::{CdromInstaller, ImportInstaller, PxeInstaller};
pub use mock::MockConnection;
pub use osdict::{OsDictionary, OsKey, OsValue};
pub use progress::{NullMeter, TracingMeter};
pub use support::{
    check_conn_hv_support, check_conn_support, check_object_support, check_support,
    require_support, CompatMode, SupportData, SupportFeature,
};
pub use traits::{Connection, Installer, OsMetadata, ProgressMeter};
pub use types::*;

// Re-export the libvirt connection when available
#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtConnection;
