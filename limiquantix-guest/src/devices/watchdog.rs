//! Watchdog timer device.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &["./@model", "./@action", "./alias", "./address"];

const MODEL: XmlProperty<VirtualWatchdog> =
    XmlProperty::new("model", "./@model").with_default(|_| Some("i6300esb".into()));
const ACTION: XmlProperty<VirtualWatchdog> =
    XmlProperty::new("action", "./@action").with_default(|_| Some("reset".into()));

/// `<watchdog>` device.
#[derive(Debug, Clone)]
pub struct VirtualWatchdog {
    core: DeviceCore,
}

device_builder!(VirtualWatchdog, [MODEL, ACTION]);

impl Default for VirtualWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualWatchdog {
    pub const MODELS: &'static [&'static str] = &["i6300esb", "ib700"];
    pub const ACTIONS: &'static [&'static str] =
        &["reset", "shutdown", "poweroff", "pause", "none", "dump"];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("watchdog", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str model, set_model => MODEL;
        str action, set_action => ACTION;
    }
}

impl VirtualDevice for VirtualWatchdog {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Watchdog
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
    fn test_defaults() {
        let mut wd = VirtualWatchdog::new();
        assert_eq!(wd.to_xml(), "<watchdog model=\"i6300esb\" action=\"reset\"/>");
        wd.set_action(Some("poweroff")).unwrap();
        assert_eq!(wd.to_xml(), "<watchdog model=\"i6300esb\" action=\"poweroff\"/>");
    }
}
