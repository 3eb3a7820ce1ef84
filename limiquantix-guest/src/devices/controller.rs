//! Bus controllers.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./@index",
    "./@model",
    "./@ports",
    "./@vectors",
    "./master/@startport",
    "./alias",
    "./address",
];

const TYPE: XmlProperty<VirtualController> = XmlProperty::new("type", "./@type");
const INDEX: XmlProperty<VirtualController> = XmlProperty::new("index", "./@index")
    .int()
    .with_default(|_| Some(0i64.into()));
const MODEL: XmlProperty<VirtualController> = XmlProperty::new("model", "./@model");
const PORTS: XmlProperty<VirtualController> = XmlProperty::new("ports", "./@ports").int();
const VECTORS: XmlProperty<VirtualController> = XmlProperty::new("vectors", "./@vectors").int();
const MASTER_STARTPORT: XmlProperty<VirtualController> =
    XmlProperty::new("master_startport", "./master/@startport").int();

/// `<controller>` device.
#[derive(Debug, Clone)]
pub struct VirtualController {
    core: DeviceCore,
}

device_builder!(VirtualController, [TYPE, INDEX, MODEL, PORTS, VECTORS, MASTER_STARTPORT]);

impl Default for VirtualController {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualController {
    pub const TYPE_IDE: &'static str = "ide";
    pub const TYPE_FDC: &'static str = "fdc";
    pub const TYPE_SCSI: &'static str = "scsi";
    pub const TYPE_SATA: &'static str = "sata";
    pub const TYPE_VIRTIOSERIAL: &'static str = "virtio-serial";
    pub const TYPE_USB: &'static str = "usb";
    pub const TYPE_PCI: &'static str = "pci";
    pub const TYPE_CCID: &'static str = "ccid";
    pub const TYPES: &'static [&'static str] = &[
        Self::TYPE_IDE,
        Self::TYPE_FDC,
        Self::TYPE_SCSI,
        Self::TYPE_SATA,
        Self::TYPE_VIRTIOSERIAL,
        Self::TYPE_USB,
        Self::TYPE_PCI,
        Self::TYPE_CCID,
    ];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("controller", ORDER),
        }
    }

    /// A controller of the given type.
    pub fn with_type(ctype: &str) -> Self {
        let mut ctrl = Self::new();
        // A plain string property without a validator cannot fail.
        let _ = ctrl.set_controller_type(Some(ctype));
        ctrl
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str controller_type, set_controller_type => TYPE;
        int index, set_index => INDEX;
        str model, set_model => MODEL;
        int ports, set_ports => PORTS;
        int vectors, set_vectors => VECTORS;
        int master_startport, set_master_startport => MASTER_STARTPORT;
    }

    /// Human readable controller type.
    pub fn pretty_type(ctype: &str) -> String {
        match ctype {
            Self::TYPE_IDE => "IDE",
            Self::TYPE_FDC => "Floppy",
            Self::TYPE_SCSI => "SCSI",
            Self::TYPE_SATA => "SATA",
            Self::TYPE_VIRTIOSERIAL => "Virtio Serial",
            Self::TYPE_USB => "USB",
            Self::TYPE_PCI => "PCI",
            Self::TYPE_CCID => "CCID",
            other => other,
        }
        .to_string()
    }

    /// The ICH9 EHCI controller with its three UHCI companions.
    pub fn get_usb2_controllers() -> Vec<VirtualController> {
        [
            ("ich9-ehci1", None),
            ("ich9-uhci1", Some(0)),
            ("ich9-uhci2", Some(2)),
            ("ich9-uhci3", Some(4)),
        ]
        .into_iter()
        .map(|(model, startport)| {
            let mut ctrl = Self::with_type(Self::TYPE_USB);
            // Neither property has a validator, so the writes cannot fail.
            let _ = ctrl.set_model(Some(model));
            if startport.is_some() {
                let _ = ctrl.set_master_startport(startport);
            }
            ctrl
        })
        .collect()
    }
}

impl VirtualDevice for VirtualController {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
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
    use crate::binding::XmlBuilder;

    #[test]
    fn test_pretty_type() {
        assert_eq!(VirtualController::pretty_type("virtio-serial"), "Virtio Serial");
        assert_eq!(VirtualController::pretty_type("fdc"), "Floppy");
        assert_eq!(VirtualController::pretty_type("xenbus"), "xenbus");
    }

    #[test]
    fn test_usb2_controllers() {
        let ctrls = VirtualController::get_usb2_controllers();
        assert_eq!(ctrls.len(), 4);
        let shape: Vec<(Option<String>, Option<String>, Option<i64>)> = ctrls
            .iter()
            .map(|c| (c.controller_type(), c.model(), c.master_startport()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (Some("usb".into()), Some("ich9-ehci1".into()), None),
                (Some("usb".into()), Some("ich9-uhci1".into()), Some(0)),
                (Some("usb".into()), Some("ich9-uhci2".into()), Some(2)),
                (Some("usb".into()), Some("ich9-uhci3".into()), Some(4)),
            ]
        );
        assert_eq!(
            ctrls[1].to_xml(),
            "<controller type=\"usb\" index=\"0\" model=\"ich9-uhci1\">\n      <master startport=\"0\"/>\n    </controller>"
        );
    }

    #[test]
    fn test_index_defaults_to_zero() {
        let ctrl = VirtualController::with_type("scsi");
        assert_eq!(ctrl.index(), Some(0));
        assert_eq!(ctrl.to_xml(), "<controller type=\"scsi\" index=\"0\"/>");
    }
}
