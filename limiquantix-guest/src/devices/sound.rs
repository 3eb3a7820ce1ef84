//! Emulated sound cards and audio backends.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::xml::Element;

const SOUND_ORDER: &[&str] = &["./@model", "./alias", "./address"];

const MODEL: XmlProperty<VirtualSound> = XmlProperty::new("model", "./@model")
    .with_default_name(VirtualSound::MODEL_DEFAULT)
    .with_default(|_| Some("es1370".into()));

/// `<sound>` device.
#[derive(Debug, Clone)]
pub struct VirtualSound {
    core: DeviceCore,
}

device_builder!(VirtualSound, [MODEL]);

impl Default for VirtualSound {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSound {
    pub const MODEL_DEFAULT: &'static str = "default";
    pub const MODELS: &'static [&'static str] =
        &["es1370", "sb16", "pcspk", "ac97", "ich6", Self::MODEL_DEFAULT];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("sound", SOUND_ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, SOUND_ORDER),
        }
    }

    xml_accessors! {
        /// Card model; reads `"default"` until resolved.
        str model, set_model => MODEL;
    }

    pub fn is_default_model(&self) -> bool {
        crate::binding::XmlBuilder::is_default(self, &MODEL)
    }
}

impl VirtualDevice for VirtualSound {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Sound
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}

const AUDIO_ORDER: &[&str] = &["./@id", "./@type", "./alias", "./address"];

const AUDIO_ID: XmlProperty<VirtualAudio> = XmlProperty::new("id", "./@id").int();
const AUDIO_TYPE: XmlProperty<VirtualAudio> = XmlProperty::new("type", "./@type");

/// `<audio>` backend definition.
#[derive(Debug, Clone)]
pub struct VirtualAudio {
    core: DeviceCore,
}

device_builder!(VirtualAudio, [AUDIO_ID, AUDIO_TYPE]);

impl Default for VirtualAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualAudio {
    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("audio", AUDIO_ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, AUDIO_ORDER),
        }
    }

    xml_accessors! {
        int id, set_id => AUDIO_ID;
        /// Backend type ("none", "spice", "pulseaudio", ...)
        str backend_type, set_backend_type => AUDIO_TYPE;
    }
}

impl VirtualDevice for VirtualAudio {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Audio
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
    fn test_sound_model_placeholder() {
        let mut snd = VirtualSound::new();
        assert_eq!(snd.model().as_deref(), Some("default"));
        assert!(snd.is_default_model());
        assert_eq!(snd.to_xml(), "<sound model=\"es1370\"/>");

        snd.set_model(Some("ich6")).unwrap();
        assert!(!snd.is_default_model());
        assert_eq!(snd.to_xml(), "<sound model=\"ich6\"/>");

        snd.set_model(Some("default")).unwrap();
        assert!(snd.is_default_model(), "placeholder must reset the model");
    }

    #[test]
    fn test_audio_backend() {
        let mut audio = VirtualAudio::new();
        audio.set_id(Some(1)).unwrap();
        audio.set_backend_type(Some("spice")).unwrap();
        assert_eq!(audio.to_xml(), "<audio id=\"1\" type=\"spice\"/>");
    }
}
