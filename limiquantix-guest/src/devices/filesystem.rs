//! Host filesystem passthrough.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./@accessmode",
    "./driver/@type",
    "./driver/@wrpolicy",
    "./source/@dir",
    "./source/@name",
    "./source/@file",
    "./source/@dev",
    "./target/@dir",
    "./readonly",
    "./alias",
    "./address",
];

const TYPE: XmlProperty<VirtualFilesystem> =
    XmlProperty::new("type", "./@type").with_default_name(VirtualFilesystem::TYPE_DEFAULT);
const MODE: XmlProperty<VirtualFilesystem> = XmlProperty::new("accessmode", "./@accessmode")
    .with_default_name(VirtualFilesystem::MODE_DEFAULT);
const DRIVER_TYPE: XmlProperty<VirtualFilesystem> = XmlProperty::new("driver_type", "./driver/@type")
    .with_default_name(VirtualFilesystem::DRIVER_DEFAULT);
const WRPOLICY: XmlProperty<VirtualFilesystem> =
    XmlProperty::new("wrpolicy", "./driver/@wrpolicy").with_default_name("default");
const SOURCE_DIR: XmlProperty<VirtualFilesystem> = XmlProperty::new("source_dir", "./source/@dir");
const SOURCE_NAME: XmlProperty<VirtualFilesystem> =
    XmlProperty::new("source_name", "./source/@name");
const SOURCE_FILE: XmlProperty<VirtualFilesystem> =
    XmlProperty::new("source_file", "./source/@file");
const SOURCE_DEV: XmlProperty<VirtualFilesystem> = XmlProperty::new("source_dev", "./source/@dev");
const TARGET: XmlProperty<VirtualFilesystem> = XmlProperty::new("target", "./target/@dir");
const READONLY: XmlProperty<VirtualFilesystem> = XmlProperty::new("readonly", "./readonly").boolean();

/// `<filesystem>` device.
#[derive(Debug, Clone)]
pub struct VirtualFilesystem {
    core: DeviceCore,
}

device_builder!(
    VirtualFilesystem,
    [
        TYPE,
        MODE,
        DRIVER_TYPE,
        WRPOLICY,
        SOURCE_DIR,
        SOURCE_NAME,
        SOURCE_FILE,
        SOURCE_DEV,
        TARGET,
        READONLY
    ]
);

impl Default for VirtualFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFilesystem {
    pub const TYPE_MOUNT: &'static str = "mount";
    pub const TYPE_TEMPLATE: &'static str = "template";
    pub const TYPE_FILE: &'static str = "file";
    pub const TYPE_BLOCK: &'static str = "block";
    pub const TYPE_DEFAULT: &'static str = "default";

    pub const MODE_PASSTHROUGH: &'static str = "passthrough";
    pub const MODE_MAPPED: &'static str = "mapped";
    pub const MODE_SQUASH: &'static str = "squash";
    pub const MODE_DEFAULT: &'static str = "default";

    pub const DRIVER_PATH: &'static str = "path";
    pub const DRIVER_HANDLE: &'static str = "handle";
    pub const DRIVER_DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("filesystem", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str fs_type, set_fs_type => TYPE;
        str accessmode, set_accessmode => MODE;
        str driver_type, set_driver_type => DRIVER_TYPE;
        str wrpolicy, set_wrpolicy => WRPOLICY;
        /// Guest mount tag or directory.
        str target_dir, set_target_dir => TARGET;
        bool readonly, set_readonly => READONLY;
    }

    fn source_prop(&self) -> &'static XmlProperty<Self> {
        match self.fs_type().as_deref() {
            Some(Self::TYPE_TEMPLATE) => &SOURCE_NAME,
            Some(Self::TYPE_FILE) => &SOURCE_FILE,
            Some(Self::TYPE_BLOCK) => &SOURCE_DEV,
            _ => &SOURCE_DIR,
        }
    }

    /// Host side of the share, located according to the type.
    pub fn source(&self) -> Option<String> {
        crate::binding::XmlBuilder::get_str(self, self.source_prop())
    }

    pub fn set_source(&mut self, value: Option<&str>) -> Result<()> {
        let prop = self.source_prop();
        crate::binding::XmlBuilder::set_str(self, prop, value)
    }
}

impl VirtualDevice for VirtualFilesystem {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Filesystem
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn validate(&self) -> Result<()> {
        if self.source().is_none() || self.target_dir().is_none() {
            return Err(GuestError::Validation(
                "Filesystem needs both a source and a target".to_string(),
            ));
        }
        Ok(())
    }
}
