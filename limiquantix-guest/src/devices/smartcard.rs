//! Smartcard device.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &["./@mode", "./@type", "./alias", "./address"];

const MODE: XmlProperty<VirtualSmartCard> = XmlProperty::new("mode", "./@mode")
    .with_default_name(VirtualSmartCard::MODE_DEFAULT)
    .with_default(|_| Some("passthrough".into()));

const TYPE: XmlProperty<VirtualSmartCard> = XmlProperty::new("type", "./@type")
    .with_default_name(VirtualSmartCard::TYPE_DEFAULT)
    .with_default(|card| {
        let mode = card.mode();
        match mode.as_deref() {
            Some(VirtualSmartCard::MODE_DEFAULT) | Some("passthrough") => Some("spicevmc".into()),
            _ => Some("tcp".into()),
        }
    });

/// `<smartcard>` device.
#[derive(Debug, Clone)]
pub struct VirtualSmartCard {
    core: DeviceCore,
}

device_builder!(VirtualSmartCard, [MODE, TYPE]);

impl Default for VirtualSmartCard {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSmartCard {
    pub const MODE_DEFAULT: &'static str = "default";
    pub const MODES: &'static [&'static str] = &["passthrough", "host-certificates", "host"];

    pub const TYPE_DEFAULT: &'static str = "default";
    pub const TYPES: &'static [&'static str] = &["tcp", "spicevmc", Self::TYPE_DEFAULT];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("smartcard", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str mode, set_mode => MODE;
        str card_type, set_card_type => TYPE;
    }
}

impl VirtualDevice for VirtualSmartCard {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Smartcard
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{XmlBuilder, PropValue};

    #[test]
    fn test_defaults_follow_mode() {
        let mut card = VirtualSmartCard::new();
        assert_eq!(card.mode().as_deref(), Some("default"));
        assert_eq!(card.card_type().as_deref(), Some("default"));
        assert_eq!(card.to_xml(), "<smartcard mode=\"passthrough\" type=\"spicevmc\"/>");

        card.set_mode(Some("host")).unwrap();
        let resolved = TYPE.default.and_then(|f| f(&card));
        assert_eq!(resolved, Some(PropValue::from("tcp")));
        assert_eq!(card.to_xml(), "<smartcard mode=\"host\" type=\"tcp\"/>");
    }

    #[test]
    fn test_explicit_passthrough_uses_spicevmc() {
        let mut card = VirtualSmartCard::new();
        card.set_mode(Some("passthrough")).unwrap();
        assert_eq!(card.to_xml(), "<smartcard mode=\"passthrough\" type=\"spicevmc\"/>");
    }
}
