//! Memory balloon device.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &["./@model", "./alias", "./address"];

const MODEL: XmlProperty<VirtualMemballoon> =
    XmlProperty::new("model", "./@model").with_default(|_| Some("virtio".into()));

/// `<memballoon>` device.
#[derive(Debug, Clone)]
pub struct VirtualMemballoon {
    core: DeviceCore,
}

device_builder!(VirtualMemballoon, [MODEL]);

impl Default for VirtualMemballoon {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemballoon {
    pub const MODELS: &'static [&'static str] = &["virtio", "xen", "none"];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("memballoon", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str model, set_model => MODEL;
    }
}

impl VirtualDevice for VirtualMemballoon {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Memballoon
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}
