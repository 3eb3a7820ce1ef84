//! TPM device.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@model",
    "./backend/@type",
    "./backend/device/@path",
    "./alias",
    "./address",
];

const MODEL: XmlProperty<VirtualTpm> =
    XmlProperty::new("model", "./@model").with_default(|_| Some("tpm-tis".into()));
const BACKEND_TYPE: XmlProperty<VirtualTpm> = XmlProperty::new("backend_type", "./backend/@type")
    .with_default(|_| Some(VirtualTpm::TYPE_PASSTHROUGH.into()));
const DEVICE_PATH: XmlProperty<VirtualTpm> =
    XmlProperty::new("device_path", "./backend/device/@path").with_default(|tpm| {
        match tpm.backend_type().as_deref() {
            Some(VirtualTpm::TYPE_PASSTHROUGH) => Some("/dev/tpm0".into()),
            _ => None,
        }
    });

/// `<tpm>` device.
#[derive(Debug, Clone)]
pub struct VirtualTpm {
    core: DeviceCore,
}

device_builder!(VirtualTpm, [MODEL, BACKEND_TYPE, DEVICE_PATH]);

impl Default for VirtualTpm {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTpm {
    pub const TYPE_PASSTHROUGH: &'static str = "passthrough";

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("tpm", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str model, set_model => MODEL;
        str backend_type, set_backend_type => BACKEND_TYPE;
        /// Host TPM character device.
        str device_path, set_device_path => DEVICE_PATH;
    }
}

impl VirtualDevice for VirtualTpm {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Tpm
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}
