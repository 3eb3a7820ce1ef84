//! Disks, CD-ROMs and floppies.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::{device_builder, DeviceContext, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlBuilder, XmlProperty};
use crate::error::{GuestError, Result};
use crate::traits::{Connection, ProgressMeter};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./@device",
    "./driver/@name",
    "./driver/@type",
    "./driver/@cache",
    "./driver/@io",
    "./driver/@error_policy",
    "./source/@file",
    "./source/@dev",
    "./source/@dir",
    "./target/@dev",
    "./target/@bus",
    "./iotune/read_bytes_sec",
    "./iotune/read_iops_sec",
    "./iotune/total_bytes_sec",
    "./iotune/total_iops_sec",
    "./iotune/write_bytes_sec",
    "./iotune/write_iops_sec",
    "./boot/@order",
    "./readonly",
    "./shareable",
    "./serial",
    "./alias",
    "./address",
];

/// qcow2 image header.
const QCOW2_MAGIC: &[u8; 4] = b"QFI\xfb";

const TYPE: XmlProperty<VirtualDisk> =
    XmlProperty::new("type", "./@type").with_default(|_| Some(VirtualDisk::TYPE_FILE.into()));
const DEVICE: XmlProperty<VirtualDisk> = XmlProperty::new("device", "./@device")
    .with_default(|_| Some(VirtualDisk::DEVICE_DISK.into()));
const DRIVER_NAME: XmlProperty<VirtualDisk> = XmlProperty::new("driver_name", "./driver/@name");
const DRIVER_TYPE: XmlProperty<VirtualDisk> = XmlProperty::new("driver_type", "./driver/@type");
const DRIVER_CACHE: XmlProperty<VirtualDisk> = XmlProperty::new("driver_cache", "./driver/@cache");
const DRIVER_IO: XmlProperty<VirtualDisk> = XmlProperty::new("driver_io", "./driver/@io");
const ERROR_POLICY: XmlProperty<VirtualDisk> =
    XmlProperty::new("error_policy", "./driver/@error_policy");
const SOURCE_FILE: XmlProperty<VirtualDisk> = XmlProperty::new("source_file", "./source/@file");
const SOURCE_DEV: XmlProperty<VirtualDisk> = XmlProperty::new("source_dev", "./source/@dev");
const SOURCE_DIR: XmlProperty<VirtualDisk> = XmlProperty::new("source_dir", "./source/@dir");
const TARGET: XmlProperty<VirtualDisk> = XmlProperty::new("target", "./target/@dev");
const BUS: XmlProperty<VirtualDisk> = XmlProperty::new("bus", "./target/@bus");
const READ_BYTES_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("read_bytes_sec", "./iotune/read_bytes_sec").int();
const READ_IOPS_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("read_iops_sec", "./iotune/read_iops_sec").int();
const TOTAL_BYTES_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("total_bytes_sec", "./iotune/total_bytes_sec").int();
const TOTAL_IOPS_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("total_iops_sec", "./iotune/total_iops_sec").int();
const WRITE_BYTES_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("write_bytes_sec", "./iotune/write_bytes_sec").int();
const WRITE_IOPS_SEC: XmlProperty<VirtualDisk> =
    XmlProperty::new("write_iops_sec", "./iotune/write_iops_sec").int();
const BOOT_ORDER: XmlProperty<VirtualDisk> = XmlProperty::new("boot_order", "./boot/@order").int();
const READONLY: XmlProperty<VirtualDisk> = XmlProperty::new("readonly", "./readonly").boolean();
const SHAREABLE: XmlProperty<VirtualDisk> = XmlProperty::new("shareable", "./shareable").boolean();
const SERIAL: XmlProperty<VirtualDisk> = XmlProperty::new("serial", "./serial");

/// `<disk>` device.
#[derive(Debug, Clone)]
pub struct VirtualDisk {
    core: DeviceCore,
    /// Only attached for the install phase
    transient: bool,
    /// Bytes to allocate for a missing backing file
    size: Option<u64>,
}

device_builder!(
    VirtualDisk,
    [
        TYPE,
        DEVICE,
        DRIVER_NAME,
        DRIVER_TYPE,
        DRIVER_CACHE,
        DRIVER_IO,
        ERROR_POLICY,
        SOURCE_FILE,
        SOURCE_DEV,
        SOURCE_DIR,
        TARGET,
        BUS,
        READ_BYTES_SEC,
        READ_IOPS_SEC,
        TOTAL_BYTES_SEC,
        TOTAL_IOPS_SEC,
        WRITE_BYTES_SEC,
        WRITE_IOPS_SEC,
        BOOT_ORDER,
        READONLY,
        SHAREABLE,
        SERIAL
    ]
);

impl Default for VirtualDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDisk {
    pub const DEVICE_DISK: &'static str = "disk";
    pub const DEVICE_CDROM: &'static str = "cdrom";
    pub const DEVICE_FLOPPY: &'static str = "floppy";
    pub const DEVICE_LUN: &'static str = "lun";

    pub const TYPE_FILE: &'static str = "file";
    pub const TYPE_BLOCK: &'static str = "block";
    pub const TYPE_DIR: &'static str = "dir";

    pub const CACHE_MODES: &'static [&'static str] =
        &["none", "writethrough", "writeback", "directsync", "unsafe"];
    pub const IO_MODES: &'static [&'static str] = &["native", "threads"];
    pub const ERROR_POLICIES: &'static [&'static str] = &["ignore", "stop", "enospace"];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("disk", ORDER),
            transient: false,
            size: None,
        }
    }

    /// A disk of the given device kind backed by `path`.
    pub fn with_path(device: &str, path: &str) -> Result<Self> {
        let mut disk = Self::new();
        disk.set_device(Some(device))?;
        disk.set_path(Some(path))?;
        Ok(disk)
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
            transient: false,
            size: None,
        }
    }

    xml_accessors! {
        str disk_type, set_disk_type => TYPE;
        str device, set_device => DEVICE;
        str driver_name, set_driver_name => DRIVER_NAME;
        str driver_type, set_driver_type => DRIVER_TYPE;
        str driver_cache, set_driver_cache => DRIVER_CACHE;
        str driver_io, set_driver_io => DRIVER_IO;
        str error_policy, set_error_policy => ERROR_POLICY;
        /// Guest device name, e.g. "vda".
        str target, set_target => TARGET;
        str bus, set_bus => BUS;
        int read_bytes_sec, set_read_bytes_sec => READ_BYTES_SEC;
        int read_iops_sec, set_read_iops_sec => READ_IOPS_SEC;
        int total_bytes_sec, set_total_bytes_sec => TOTAL_BYTES_SEC;
        int total_iops_sec, set_total_iops_sec => TOTAL_IOPS_SEC;
        int write_bytes_sec, set_write_bytes_sec => WRITE_BYTES_SEC;
        int write_iops_sec, set_write_iops_sec => WRITE_IOPS_SEC;
        int boot_order, set_boot_order => BOOT_ORDER;
        bool readonly, set_readonly => READONLY;
        bool shareable, set_shareable => SHAREABLE;
        str serial, set_serial => SERIAL;
    }

    pub fn is_cdrom(&self) -> bool {
        self.device().as_deref() == Some(Self::DEVICE_CDROM)
    }

    pub fn is_floppy(&self) -> bool {
        self.device().as_deref() == Some(Self::DEVICE_FLOPPY)
    }

    pub fn is_disk(&self) -> bool {
        self.device().as_deref() == Some(Self::DEVICE_DISK)
    }

    pub fn transient(&self) -> bool {
        self.transient
    }

    pub fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Request allocation of `bytes` when the backing file does not exist.
    pub fn set_size(&mut self, bytes: Option<u64>) {
        self.size = bytes;
    }

    fn path_prop(&self) -> &'static XmlProperty<Self> {
        match self.disk_type().as_deref() {
            Some(Self::TYPE_BLOCK) => &SOURCE_DEV,
            Some(Self::TYPE_DIR) => &SOURCE_DIR,
            _ => &SOURCE_FILE,
        }
    }

    /// Backing path, read from the source attribute matching the type.
    pub fn path(&self) -> Option<String> {
        self.get_str(self.path_prop())
    }

    /// Set the backing path. A disk whose type was never set picks it from
    /// what `path` is on the local host.
    pub fn set_path(&mut self, path: Option<&str>) -> Result<()> {
        for prop in [&SOURCE_FILE, &SOURCE_DEV, &SOURCE_DIR] {
            if self.is_set(prop) {
                self.set_str(prop, None)?;
            }
        }
        let Some(path) = path else {
            return Ok(());
        };

        if !self.is_set(&TYPE) {
            let detected = detect_path_type(Path::new(path));
            if detected != Self::TYPE_FILE {
                self.set_disk_type(Some(detected))?;
            }
        }
        let prop = self.path_prop();
        self.set_str(prop, Some(path))
    }

    /// Name prefix and device count limit for the disk's bus.
    pub fn target_prefix(&self) -> (&'static str, usize) {
        let bus = self.bus();
        match bus.as_deref() {
            Some("virtio") => ("vd", 1024),
            Some("sata") | Some("scsi") | Some("usb") | Some("sd") => ("sd", 1024),
            Some("xen") => ("xvd", 1024),
            Some("fdc") => ("fd", 2),
            _ if self.is_floppy() => ("fd", 2),
            Some("ide") => ("hd", 4),
            _ => ("sd", 1024),
        }
    }

    /// Pick the first target name for the bus that is not in `used`, and set
    /// it.
    pub fn generate_target(&mut self, used: &[String]) -> Result<String> {
        let (prefix, max) = self.target_prefix();
        for i in 0..max {
            let candidate = format!("{}{}", prefix, target_suffix(i));
            if !used.iter().any(|u| *u == candidate) {
                self.set_target(Some(&candidate))?;
                return Ok(candidate);
            }
        }
        Err(GuestError::Validation(format!(
            "No more space for disks of type '{}'",
            prefix
        )))
    }

    fn detect_driver_type(&self, path: &str) -> &'static str {
        if self.disk_type().as_deref() != Some(Self::TYPE_FILE) {
            return "raw";
        }
        let mut magic = [0u8; 4];
        let is_qcow2 = File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map(|_| &magic == QCOW2_MAGIC)
            .unwrap_or(false);
        if is_qcow2 {
            "qcow2"
        } else {
            "raw"
        }
    }
}

/// Bijective base-26 suffix: 0 is "a", 25 is "z", 26 is "aa".
fn target_suffix(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn detect_path_type(path: &Path) -> &'static str {
    let Ok(meta) = std::fs::metadata(path) else {
        return VirtualDisk::TYPE_FILE;
    };
    if meta.is_dir() {
        return VirtualDisk::TYPE_DIR;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if meta.file_type().is_block_device() {
            return VirtualDisk::TYPE_BLOCK;
        }
    }
    VirtualDisk::TYPE_FILE
}

impl VirtualDevice for VirtualDisk {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Disk
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn set_defaults(&mut self, ctx: &DeviceContext<'_>) -> Result<()> {
        if self.is_cdrom() && !self.readonly() {
            self.set_readonly(true)?;
        }

        let Some(path) = self.path() else {
            return Ok(());
        };
        if !ctx.conn.is_qemu() {
            return Ok(());
        }
        if self.driver_name().is_none() {
            self.set_driver_name(Some("qemu"))?;
        }
        if self.driver_type().is_none() {
            let driver_type = self.detect_driver_type(&path);
            debug!(path = %path, driver_type, "Detected disk format");
            self.set_driver_type(Some(driver_type))?;
        }
        Ok(())
    }

    #[instrument(skip(self, _conn, meter), fields(path = ?self.path()))]
    fn setup(&mut self, _conn: &dyn Connection, meter: &mut dyn ProgressMeter) -> Result<()> {
        let (Some(size), Some(path)) = (self.size, self.path()) else {
            return Ok(());
        };
        if self.disk_type().as_deref() != Some(Self::TYPE_FILE) || Path::new(&path).exists() {
            return Ok(());
        }

        info!(path = %path, size, "Allocating sparse disk image");
        meter.start(&format!("Creating storage file {}", path), Some(size));
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.set_len(size)?;
        meter.end(size);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.size.is_some() && self.path().is_none() {
            return Err(GuestError::Validation(
                "A disk path must be specified to allocate storage".to_string(),
            ));
        }
        if let Some(cache) = self.driver_cache() {
            if !Self::CACHE_MODES.contains(&cache.as_str()) {
                return Err(GuestError::Validation(format!("Unknown disk cache mode '{}'", cache)));
            }
        }
        Ok(())
    }
}
