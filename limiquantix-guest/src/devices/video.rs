//! Video adapter.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./model/@type",
    "./model/@ram",
    "./model/@vram",
    "./model/@heads",
    "./alias",
    "./address",
];

const MODEL: XmlProperty<VirtualVideo> = XmlProperty::new("model", "./model/@type")
    .with_default_name(VirtualVideo::MODEL_DEFAULT)
    .with_default(|_| Some("cirrus".into()));
const RAM: XmlProperty<VirtualVideo> = XmlProperty::new("ram", "./model/@ram").int();
const VRAM: XmlProperty<VirtualVideo> = XmlProperty::new("vram", "./model/@vram").int();
const HEADS: XmlProperty<VirtualVideo> = XmlProperty::new("heads", "./model/@heads").int();

/// `<video>` device.
#[derive(Debug, Clone)]
pub struct VirtualVideo {
    core: DeviceCore,
}

device_builder!(VirtualVideo, [MODEL, RAM, VRAM, HEADS]);

impl Default for VirtualVideo {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualVideo {
    pub const MODEL_DEFAULT: &'static str = "default";
    pub const MODELS: &'static [&'static str] =
        &["cirrus", "vga", "qxl", "xen", "vmvga", "vbox", Self::MODEL_DEFAULT];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("video", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str model, set_model => MODEL;
        int ram, set_ram => RAM;
        int vram, set_vram => VRAM;
        int heads, set_heads => HEADS;
    }

    pub fn is_default_model(&self) -> bool {
        crate::binding::XmlBuilder::is_default(self, &MODEL)
    }

    /// Human readable model name.
    pub fn pretty_model(model: &str) -> String {
        match model {
            "vga" | "qxl" => model.to_ascii_uppercase(),
            _ => {
                let mut chars = model.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

impl VirtualDevice for VirtualVideo {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Video
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
    fn test_build_default_model() {
        let mut video = VirtualVideo::new();
        assert!(video.is_default_model());
        assert_eq!(video.to_xml(), "<video>\n      <model type=\"cirrus\"/>\n    </video>");

        video.set_model(Some("qxl")).unwrap();
        video.set_heads(Some(1)).unwrap();
        video.set_vram(Some(65536)).unwrap();
        assert_eq!(
            video.to_xml(),
            "<video>\n      <model type=\"qxl\" vram=\"65536\" heads=\"1\"/>\n    </video>"
        );
    }

    #[test]
    fn test_pretty_model() {
        assert_eq!(VirtualVideo::pretty_model("qxl"), "QXL");
        assert_eq!(VirtualVideo::pretty_model("cirrus"), "Cirrus");
    }
}
