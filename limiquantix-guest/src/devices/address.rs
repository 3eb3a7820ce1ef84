//! Device `<address>` sub-element.

use crate::binding::{xml_accessors, XmlBuilder, XmlProperty, XmlState};
use crate::error::{GuestError, Result};
use crate::xml::Element;

pub const ADDRESS_TYPE_PCI: &str = "pci";
pub const ADDRESS_TYPE_DRIVE: &str = "drive";
pub const ADDRESS_TYPE_VIRTIO_SERIAL: &str = "virtio-serial";
pub const ADDRESS_TYPE_CCID: &str = "ccid";
pub const ADDRESS_TYPE_SPAPR_VIO: &str = "spapr-vio";

/// Devices sit at `/domain/devices/<dev>`, so their address is 3 deep.
const ADDRESS_DEPTH: usize = 3;

const ORDER: &[&str] = &[
    "./@type",
    "./@domain",
    "./@controller",
    "./@bus",
    "./@target",
    "./@slot",
    "./@unit",
    "./@port",
    "./@function",
    "./@multifunction",
    "./@reg",
];

const TYPE: XmlProperty<DeviceAddress> = XmlProperty::new("type", "./@type");
const DOMAIN: XmlProperty<DeviceAddress> = XmlProperty::new("domain", "./@domain").int();
const CONTROLLER: XmlProperty<DeviceAddress> = XmlProperty::new("controller", "./@controller").int();
const BUS: XmlProperty<DeviceAddress> = XmlProperty::new("bus", "./@bus").int();
const TARGET: XmlProperty<DeviceAddress> = XmlProperty::new("target", "./@target").int();
const SLOT: XmlProperty<DeviceAddress> = XmlProperty::new("slot", "./@slot").int();
const UNIT: XmlProperty<DeviceAddress> = XmlProperty::new("unit", "./@unit").int();
const PORT: XmlProperty<DeviceAddress> = XmlProperty::new("port", "./@port").int();
const FUNCTION: XmlProperty<DeviceAddress> = XmlProperty::new("function", "./@function").int();
const MULTIFUNCTION: XmlProperty<DeviceAddress> =
    XmlProperty::new("multifunction", "./@multifunction").onoff();
const REG: XmlProperty<DeviceAddress> = XmlProperty::new("reg", "./@reg");

/// Where a device sits on its bus.
#[derive(Debug, Clone)]
pub struct DeviceAddress {
    state: XmlState,
}

impl XmlBuilder for DeviceAddress {
    const PROPERTIES: &'static [&'static XmlProperty<Self>] = &[
        &TYPE,
        &DOMAIN,
        &CONTROLLER,
        &BUS,
        &TARGET,
        &SLOT,
        &UNIT,
        &PORT,
        &FUNCTION,
        &MULTIFUNCTION,
        &REG,
    ];

    fn xml_state(&self) -> &XmlState {
        &self.state
    }

    fn xml_state_mut(&mut self) -> &mut XmlState {
        &mut self.state
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAddress {
    pub fn new() -> Self {
        Self {
            state: XmlState::new("address", ADDRESS_DEPTH, ORDER),
        }
    }

    /// Wrap the `<address>` child of a parsed device element, if any.
    pub fn from_device_element(device: &Element) -> Self {
        match device.find_child("address") {
            Some(el) => Self {
                state: XmlState::parsed(el.clone(), ADDRESS_DEPTH, ORDER),
            },
            None => Self::new(),
        }
    }

    xml_accessors! {
        str address_type, set_address_type => TYPE;
        int domain, set_domain => DOMAIN;
        int controller, set_controller => CONTROLLER;
        int bus, set_bus => BUS;
        int target, set_target => TARGET;
        int slot, set_slot => SLOT;
        int unit, set_unit => UNIT;
        int port, set_port => PORT;
        int function, set_function => FUNCTION;
        flag multifunction, set_multifunction => MULTIFUNCTION;
        str reg, set_reg => REG;
    }

    /// True when no addressing is set.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Drop all addressing.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Set the address from a short token.
    ///
    /// Accepts `spapr-vio` and PCI addresses in hex as `BB:SS.F` or
    /// `DDDD:BB:SS.F`.
    pub fn set_addrstr(&mut self, addrstr: &str) -> Result<()> {
        if addrstr == ADDRESS_TYPE_SPAPR_VIO {
            self.clear();
            return self.set_address_type(Some(ADDRESS_TYPE_SPAPR_VIO));
        }

        let unsupported = || {
            GuestError::Validation(format!(
                "Could not determine or unsupported format of '{}'",
                addrstr
            ))
        };
        let colons = addrstr.matches(':').count();
        if !(colons == 1 || colons == 2) || !addrstr.contains('.') {
            return Err(unsupported());
        }

        let parts: Vec<&str> = addrstr.split(':').collect();
        let (domain, bus, slotfunc) = match parts.as_slice() {
            [bus, slotfunc] => ("0", *bus, *slotfunc),
            [domain, bus, slotfunc] => (*domain, *bus, *slotfunc),
            _ => return Err(unsupported()),
        };
        let (slot, function) = slotfunc.split_once('.').ok_or_else(unsupported)?;
        let hex = |s: &str| i64::from_str_radix(s, 16).map_err(|_| unsupported());
        let (domain, bus, slot, function) = (hex(domain)?, hex(bus)?, hex(slot)?, hex(function)?);

        self.clear();
        self.set_address_type(Some(ADDRESS_TYPE_PCI))?;
        self.set_domain(Some(domain))?;
        self.set_bus(Some(bus))?;
        self.set_slot(Some(slot))?;
        self.set_function(Some(function))?;
        Ok(())
    }

    /// `(domain, bus, slot)` of a PCI address.
    pub fn pci_slot(&self) -> Option<(i64, i64, i64)> {
        if self.address_type().as_deref() != Some(ADDRESS_TYPE_PCI) {
            return None;
        }
        Some((
            self.domain().unwrap_or(0),
            self.bus().unwrap_or(0),
            self.slot().unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_values() {
        let dev = Element::parse(
            "<disk><address type='pci' domain='0x0010' bus='0x00' slot='0x07' function='0x0'/></disk>",
        )
        .unwrap();
        let addr = DeviceAddress::from_device_element(&dev);
        assert_eq!(addr.domain(), Some(16));
        assert_eq!(addr.slot(), Some(7));
        assert_eq!(addr.function(), Some(0));
        assert_eq!(addr.pci_slot(), Some((16, 0, 7)));
    }

    #[test]
    fn test_set_addrstr_pci() {
        let mut addr = DeviceAddress::new();
        addr.set_addrstr("00:0a.2").unwrap();
        assert_eq!(addr.address_type().as_deref(), Some("pci"));
        assert_eq!(addr.domain(), Some(0));
        assert_eq!(addr.slot(), Some(10));
        assert_eq!(addr.function(), Some(2));

        addr.set_addrstr("0001:02:03.4").unwrap();
        assert_eq!(addr.pci_slot(), Some((1, 2, 3)));
        assert_eq!(
            addr.to_xml(),
            "<address type=\"pci\" domain=\"1\" bus=\"2\" slot=\"3\" function=\"4\"/>"
        );
    }

    #[test]
    fn test_set_addrstr_spapr_vio() {
        let mut addr = DeviceAddress::new();
        addr.set_addrstr("01:02.0").unwrap();
        addr.set_addrstr("spapr-vio").unwrap();
        assert_eq!(addr.address_type().as_deref(), Some("spapr-vio"));
        assert_eq!(addr.slot(), None, "previous addressing must be cleared");
    }

    #[test]
    fn test_set_addrstr_rejects_junk() {
        let mut addr = DeviceAddress::new();
        for bad in ["junk", "1:2:3:4.5", "00:zz.1", "0a.1", "01:02"] {
            assert!(addr.set_addrstr(bad).is_err(), "{} should be rejected", bad);
        }
        assert!(addr.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut addr = DeviceAddress::new();
        addr.set_addrstr("00:03.0").unwrap();
        addr.set_multifunction(Some(true)).unwrap();
        assert_eq!(addr.multifunction(), Some(true));
        addr.clear();
        assert!(addr.is_empty());
        assert_eq!(addr.to_xml(), "");
    }
}
