//! Host device passthrough (PCI and USB).

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@mode",
    "./@type",
    "./@managed",
    "./source/vendor/@id",
    "./source/product/@id",
    "./source/address/@domain",
    "./source/address/@bus",
    "./source/address/@slot",
    "./source/address/@function",
    "./source/address/@device",
    "./alias",
    "./address",
];

const MODE: XmlProperty<VirtualHostDevice> =
    XmlProperty::new("mode", "./@mode").with_default(|_| Some("subsystem".into()));
const TYPE: XmlProperty<VirtualHostDevice> = XmlProperty::new("type", "./@type");
const MANAGED: XmlProperty<VirtualHostDevice> = XmlProperty::new("managed", "./@managed")
    .yesno()
    .with_default(|_| Some(true.into()));
const VENDOR: XmlProperty<VirtualHostDevice> = XmlProperty::new("vendor", "./source/vendor/@id");
const PRODUCT: XmlProperty<VirtualHostDevice> =
    XmlProperty::new("product", "./source/product/@id");
const DOMAIN: XmlProperty<VirtualHostDevice> =
    XmlProperty::new("domain", "./source/address/@domain");
const BUS: XmlProperty<VirtualHostDevice> = XmlProperty::new("bus", "./source/address/@bus");
const SLOT: XmlProperty<VirtualHostDevice> = XmlProperty::new("slot", "./source/address/@slot");
const FUNCTION: XmlProperty<VirtualHostDevice> =
    XmlProperty::new("function", "./source/address/@function");
const DEVICE: XmlProperty<VirtualHostDevice> =
    XmlProperty::new("device", "./source/address/@device");

/// `<hostdev>` device.
#[derive(Debug, Clone)]
pub struct VirtualHostDevice {
    core: DeviceCore,
}

device_builder!(
    VirtualHostDevice,
    [MODE, TYPE, MANAGED, VENDOR, PRODUCT, DOMAIN, BUS, SLOT, FUNCTION, DEVICE]
);

impl Default for VirtualHostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualHostDevice {
    pub const TYPE_PCI: &'static str = "pci";
    pub const TYPE_USB: &'static str = "usb";

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("hostdev", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str mode, set_mode => MODE;
        str host_type, set_host_type => TYPE;
        flag managed, set_managed => MANAGED;
        str vendor, set_vendor => VENDOR;
        str product, set_product => PRODUCT;
        str domain, set_domain => DOMAIN;
        str bus, set_bus => BUS;
        str slot, set_slot => SLOT;
        str function, set_function => FUNCTION;
        str device, set_device => DEVICE;
    }

    /// PCI passthrough of the host device at `DDDD:BB:SS.F`.
    pub fn pci(addr: &str) -> Result<Self> {
        let bad = || GuestError::Validation(format!("Invalid PCI address '{}'", addr));
        let (domain, rest) = addr.split_once(':').ok_or_else(bad)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(bad)?;
        let (slot, function) = rest.split_once('.').ok_or_else(bad)?;
        for part in [domain, bus, slot, function] {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(bad());
            }
        }

        let mut dev = Self::new();
        dev.set_host_type(Some(Self::TYPE_PCI))?;
        dev.set_domain(Some(&format!("0x{}", domain)))?;
        dev.set_bus(Some(&format!("0x{}", bus)))?;
        dev.set_slot(Some(&format!("0x{}", slot)))?;
        dev.set_function(Some(&format!("0x{}", function)))?;
        Ok(dev)
    }

    /// USB passthrough by `vendor:product` id.
    pub fn usb(vendor: &str, product: &str) -> Result<Self> {
        let mut dev = Self::new();
        dev.set_host_type(Some(Self::TYPE_USB))?;
        dev.set_vendor(Some(vendor))?;
        dev.set_product(Some(product))?;
        Ok(dev)
    }
}

impl VirtualDevice for VirtualHostDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Hostdev
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn validate(&self) -> Result<()> {
        match self.host_type().as_deref() {
            Some(Self::TYPE_PCI) | Some(Self::TYPE_USB) => Ok(()),
            Some(other) => Err(GuestError::Validation(format!(
                "Unknown host device type '{}'",
                other
            ))),
            None => Err(GuestError::Validation("Host device type must be set".to_string())),
        }
    }
}
