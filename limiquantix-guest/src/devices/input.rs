//! Input devices (mouse, tablet, keyboard).

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlBuilder, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &["./@type", "./@bus", "./alias", "./address"];

const TYPE: XmlProperty<VirtualInput> = XmlProperty::new("type", "./@type")
    .with_default_name(VirtualInput::TYPE_DEFAULT)
    .with_default(|_| Some(VirtualInput::TYPE_MOUSE.into()));
const BUS: XmlProperty<VirtualInput> = XmlProperty::new("bus", "./@bus")
    .with_default_name(VirtualInput::BUS_DEFAULT)
    .with_default(|_| Some(VirtualInput::BUS_PS2.into()));

/// `<input>` device.
#[derive(Debug, Clone)]
pub struct VirtualInput {
    core: DeviceCore,
}

device_builder!(VirtualInput, [TYPE, BUS]);

impl Default for VirtualInput {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualInput {
    pub const TYPE_MOUSE: &'static str = "mouse";
    pub const TYPE_TABLET: &'static str = "tablet";
    pub const TYPE_KEYBOARD: &'static str = "keyboard";
    pub const TYPE_DEFAULT: &'static str = "default";

    pub const BUS_PS2: &'static str = "ps2";
    pub const BUS_USB: &'static str = "usb";
    pub const BUS_XEN: &'static str = "xen";
    pub const BUS_DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("input", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str input_type, set_input_type => TYPE;
        str bus, set_bus => BUS;
    }

    /// True when both type and bus still read as placeholders.
    pub fn is_unresolved(&self) -> bool {
        self.is_default(&TYPE) && self.is_default(&BUS)
    }
}

impl VirtualDevice for VirtualInput {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Input
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}
