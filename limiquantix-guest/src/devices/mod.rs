//! Guest device model.
//!
//! Every device kind libvirt understands is a typed struct built on the
//! binding layer. They share a [`DeviceCore`] (element state plus the
//! `<address>` sub-object) and the [`VirtualDevice`] contract, and are
//! collected in the closed [`Device`] enum owned by the guest.

mod address;
mod chardev;
mod controller;
mod disk;
mod filesystem;
mod graphics;
mod hostdev;
mod input;
mod interface;
mod memballoon;
mod redirdev;
mod smartcard;
mod sound;
mod tpm;
mod video;
mod watchdog;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::XmlState;
use crate::domain::DomainOs;
use crate::error::Result;
use crate::support::CompatMode;
use crate::traits::{Connection, ProgressMeter};
use crate::xml::{Element, XmlPath};

pub use address::{
    DeviceAddress, ADDRESS_TYPE_CCID, ADDRESS_TYPE_DRIVE, ADDRESS_TYPE_PCI, ADDRESS_TYPE_SPAPR_VIO,
    ADDRESS_TYPE_VIRTIO_SERIAL,
};
pub use chardev::{CharDevice, CharKind};
pub use controller::VirtualController;
pub use disk::VirtualDisk;
pub use filesystem::VirtualFilesystem;
pub use graphics::VirtualGraphics;
pub use hostdev::VirtualHostDevice;
pub use input::VirtualInput;
pub use interface::VirtualInterface;
pub use memballoon::VirtualMemballoon;
pub use redirdev::VirtualRedirDevice;
pub use smartcard::VirtualSmartCard;
pub use sound::{VirtualAudio, VirtualSound};
pub use tpm::VirtualTpm;
pub use video::VirtualVideo;
pub use watchdog::VirtualWatchdog;

/// Devices live at `/domain/devices/<dev>`.
pub(crate) const DEVICE_DEPTH: usize = 2;

// =============================================================================
// KINDS
// =============================================================================

/// Device kinds, in the order libvirt writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Disk,
    Controller,
    Filesystem,
    Interface,
    Smartcard,
    Serial,
    Parallel,
    Console,
    Channel,
    Input,
    Tpm,
    Graphics,
    Sound,
    Audio,
    Video,
    Hostdev,
    Redirdev,
    Watchdog,
    Memballoon,
}

impl DeviceKind {
    pub const ALL: &'static [DeviceKind] = &[
        DeviceKind::Disk,
        DeviceKind::Controller,
        DeviceKind::Filesystem,
        DeviceKind::Interface,
        DeviceKind::Smartcard,
        DeviceKind::Serial,
        DeviceKind::Parallel,
        DeviceKind::Console,
        DeviceKind::Channel,
        DeviceKind::Input,
        DeviceKind::Tpm,
        DeviceKind::Graphics,
        DeviceKind::Sound,
        DeviceKind::Audio,
        DeviceKind::Video,
        DeviceKind::Hostdev,
        DeviceKind::Redirdev,
        DeviceKind::Watchdog,
        DeviceKind::Memballoon,
    ];

    /// Element name.
    pub fn tag(self) -> &'static str {
        match self {
            DeviceKind::Disk => "disk",
            DeviceKind::Controller => "controller",
            DeviceKind::Filesystem => "filesystem",
            DeviceKind::Interface => "interface",
            DeviceKind::Smartcard => "smartcard",
            DeviceKind::Serial => "serial",
            DeviceKind::Parallel => "parallel",
            DeviceKind::Console => "console",
            DeviceKind::Channel => "channel",
            DeviceKind::Input => "input",
            DeviceKind::Tpm => "tpm",
            DeviceKind::Graphics => "graphics",
            DeviceKind::Sound => "sound",
            DeviceKind::Audio => "audio",
            DeviceKind::Video => "video",
            DeviceKind::Hostdev => "hostdev",
            DeviceKind::Redirdev => "redirdev",
            DeviceKind::Watchdog => "watchdog",
            DeviceKind::Memballoon => "memballoon",
        }
    }

    pub fn from_tag(tag: &str) -> Option<DeviceKind> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Selects devices by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFilter {
    All,
    Kind(DeviceKind),
}

impl DeviceFilter {
    pub fn matches(self, kind: DeviceKind) -> bool {
        match self {
            DeviceFilter::All => true,
            DeviceFilter::Kind(k) => k == kind,
        }
    }
}

impl From<DeviceKind> for DeviceFilter {
    fn from(kind: DeviceKind) -> Self {
        DeviceFilter::Kind(kind)
    }
}

/// Handle to a device owned by a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub(crate) u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// SHARED CONTRACT
// =============================================================================

/// Guest context handed to device default passes.
pub struct DeviceContext<'a> {
    pub conn: &'a dyn Connection,
    pub os: &'a DomainOs,
    /// `<domain type=...>` of the guest
    pub hv_type: &'a str,
    pub compat: CompatMode,
}

/// State every device carries.
#[derive(Debug, Clone)]
pub struct DeviceCore {
    pub(crate) state: XmlState,
    pub(crate) address: DeviceAddress,
}

impl DeviceCore {
    pub(crate) fn new(tag: &str, order: &'static [&'static str]) -> Self {
        Self {
            state: XmlState::new(tag, DEVICE_DEPTH, order),
            address: DeviceAddress::new(),
        }
    }

    pub(crate) fn parsed(el: Element, order: &'static [&'static str]) -> Self {
        let address = DeviceAddress::from_device_element(&el);
        Self {
            state: XmlState::parsed(el, DEVICE_DEPTH, order),
            address,
        }
    }

    /// Put the rendered address into a rendered device element.
    pub(crate) fn attach_address(&self, el: &mut Element) {
        use crate::binding::XmlBuilder;
        self.state.attach_child(el, "address", self.address.render());
    }

    fn alias(&self) -> Option<String> {
        self.state.element().value(&XmlPath::parse("./alias/@name"))
    }
}

/// Behaviour shared by all devices.
pub trait VirtualDevice: crate::binding::XmlBuilder {
    fn kind(&self) -> DeviceKind;
    fn core(&self) -> &DeviceCore;
    fn core_mut(&mut self) -> &mut DeviceCore;

    /// Fill unset fields from guest context. Never overwrites explicit
    /// values.
    fn set_defaults(&mut self, _ctx: &DeviceContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Install-time preparation (storage allocation, conflict checks).
    fn setup(&mut self, _conn: &dyn Connection, _meter: &mut dyn ProgressMeter) -> Result<()> {
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn address(&self) -> &DeviceAddress {
        &self.core().address
    }

    fn address_mut(&mut self) -> &mut DeviceAddress {
        &mut self.core_mut().address
    }

    /// Runtime alias assigned by the hypervisor.
    fn alias(&self) -> Option<String> {
        self.core().alias()
    }
}

/// Implements [`XmlBuilder`](crate::binding::XmlBuilder) for a device struct
/// with a `core: DeviceCore` field, rendering its address with it.
macro_rules! device_builder {
    ($ty:ty, [$($prop:ident),* $(,)?]) => {
        impl $crate::binding::XmlBuilder for $ty {
            const PROPERTIES: &'static [&'static $crate::binding::XmlProperty<Self>] = &[$(&$prop),*];

            fn xml_state(&self) -> &$crate::binding::XmlState {
                &self.core.state
            }

            fn xml_state_mut(&mut self) -> &mut $crate::binding::XmlState {
                &mut self.core.state
            }

            fn render(&self) -> $crate::xml::Element {
                let mut el = $crate::binding::render_state(self);
                self.core.attach_address(&mut el);
                el
            }
        }
    };
}
pub(crate) use device_builder;

// =============================================================================
// DEVICE ENUM
// =============================================================================

/// Any guest device.
#[derive(Debug, Clone)]
pub enum Device {
    Disk(VirtualDisk),
    Controller(VirtualController),
    Filesystem(VirtualFilesystem),
    Interface(VirtualInterface),
    Smartcard(VirtualSmartCard),
    Char(CharDevice),
    Input(VirtualInput),
    Tpm(VirtualTpm),
    Graphics(VirtualGraphics),
    Sound(VirtualSound),
    Audio(VirtualAudio),
    Video(VirtualVideo),
    Hostdev(VirtualHostDevice),
    Redirdev(VirtualRedirDevice),
    Watchdog(VirtualWatchdog),
    Memballoon(VirtualMemballoon),
}

macro_rules! dispatch {
    ($dev:expr, $d:ident => $body:expr) => {
        match $dev {
            Device::Disk($d) => $body,
            Device::Controller($d) => $body,
            Device::Filesystem($d) => $body,
            Device::Interface($d) => $body,
            Device::Smartcard($d) => $body,
            Device::Char($d) => $body,
            Device::Input($d) => $body,
            Device::Tpm($d) => $body,
            Device::Graphics($d) => $body,
            Device::Sound($d) => $body,
            Device::Audio($d) => $body,
            Device::Video($d) => $body,
            Device::Hostdev($d) => $body,
            Device::Redirdev($d) => $body,
            Device::Watchdog($d) => $body,
            Device::Memballoon($d) => $body,
        }
    };
}

impl Device {
    /// Wrap a parsed device element. Unknown element names give `None`.
    pub fn from_element(el: Element) -> Option<Device> {
        let kind = DeviceKind::from_tag(el.name())?;
        Some(match kind {
            DeviceKind::Disk => Device::Disk(VirtualDisk::parsed(el)),
            DeviceKind::Controller => Device::Controller(VirtualController::parsed(el)),
            DeviceKind::Filesystem => Device::Filesystem(VirtualFilesystem::parsed(el)),
            DeviceKind::Interface => Device::Interface(VirtualInterface::parsed(el)),
            DeviceKind::Smartcard => Device::Smartcard(VirtualSmartCard::parsed(el)),
            DeviceKind::Serial => Device::Char(CharDevice::parsed(CharKind::Serial, el)),
            DeviceKind::Parallel => Device::Char(CharDevice::parsed(CharKind::Parallel, el)),
            DeviceKind::Console => Device::Char(CharDevice::parsed(CharKind::Console, el)),
            DeviceKind::Channel => Device::Char(CharDevice::parsed(CharKind::Channel, el)),
            DeviceKind::Input => Device::Input(VirtualInput::parsed(el)),
            DeviceKind::Tpm => Device::Tpm(VirtualTpm::parsed(el)),
            DeviceKind::Graphics => Device::Graphics(VirtualGraphics::parsed(el)),
            DeviceKind::Sound => Device::Sound(VirtualSound::parsed(el)),
            DeviceKind::Audio => Device::Audio(VirtualAudio::parsed(el)),
            DeviceKind::Video => Device::Video(VirtualVideo::parsed(el)),
            DeviceKind::Hostdev => Device::Hostdev(VirtualHostDevice::parsed(el)),
            DeviceKind::Redirdev => Device::Redirdev(VirtualRedirDevice::parsed(el)),
            DeviceKind::Watchdog => Device::Watchdog(VirtualWatchdog::parsed(el)),
            DeviceKind::Memballoon => Device::Memballoon(VirtualMemballoon::parsed(el)),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        dispatch!(self, d => d.kind())
    }

    pub fn render(&self) -> Element {
        use crate::binding::XmlBuilder;
        dispatch!(self, d => d.render())
    }

    pub fn to_xml(&self) -> String {
        use crate::binding::XmlBuilder;
        dispatch!(self, d => d.to_xml())
    }

    pub fn set_defaults(&mut self, ctx: &DeviceContext<'_>) -> Result<()> {
        dispatch!(self, d => d.set_defaults(ctx))
    }

    pub fn setup(&mut self, conn: &dyn Connection, meter: &mut dyn ProgressMeter) -> Result<()> {
        dispatch!(self, d => d.setup(conn, meter))
    }

    pub fn validate(&self) -> Result<()> {
        dispatch!(self, d => d.validate())
    }

    pub fn address(&self) -> &DeviceAddress {
        dispatch!(self, d => d.address())
    }

    pub fn address_mut(&mut self) -> &mut DeviceAddress {
        dispatch!(self, d => d.address_mut())
    }

    pub fn alias(&self) -> Option<String> {
        dispatch!(self, d => d.alias())
    }

    pub fn as_disk(&self) -> Option<&VirtualDisk> {
        match self {
            Device::Disk(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_disk_mut(&mut self) -> Option<&mut VirtualDisk> {
        match self {
            Device::Disk(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&VirtualInterface> {
        match self {
            Device::Interface(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_interface_mut(&mut self) -> Option<&mut VirtualInterface> {
        match self {
            Device::Interface(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_controller(&self) -> Option<&VirtualController> {
        match self {
            Device::Controller(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<&CharDevice> {
        match self {
            Device::Char(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_graphics(&self) -> Option<&VirtualGraphics> {
        match self {
            Device::Graphics(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&VirtualFilesystem> {
        match self {
            Device::Filesystem(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&VirtualInput> {
        match self {
            Device::Input(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_sound(&self) -> Option<&VirtualSound> {
        match self {
            Device::Sound(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VirtualVideo> {
        match self {
            Device::Video(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_input_mut(&mut self) -> Option<&mut VirtualInput> {
        match self {
            Device::Input(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_sound_mut(&mut self) -> Option<&mut VirtualSound> {
        match self {
            Device::Sound(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_video_mut(&mut self) -> Option<&mut VirtualVideo> {
        match self {
            Device::Video(d) => Some(d),
            _ => None,
        }
    }

    /// Short description used in error messages, e.g. `disk vda`.
    pub fn describe(&self) -> String {
        let name = match self {
            Device::Disk(d) => d.target().or_else(|| d.path()),
            Device::Interface(d) => d.macaddr(),
            Device::Controller(d) => d.controller_type(),
            _ => None,
        };
        match name {
            Some(name) => format!("{} {}", self.kind(), name),
            None => self.kind().to_string(),
        }
    }
}

macro_rules! device_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Device {
                fn from(dev: $ty) -> Self {
                    Device::$variant(dev)
                }
            }
        )*
    };
}

device_from! {
    Disk(VirtualDisk),
    Controller(VirtualController),
    Filesystem(VirtualFilesystem),
    Interface(VirtualInterface),
    Smartcard(VirtualSmartCard),
    Char(CharDevice),
    Input(VirtualInput),
    Tpm(VirtualTpm),
    Graphics(VirtualGraphics),
    Sound(VirtualSound),
    Audio(VirtualAudio),
    Video(VirtualVideo),
    Hostdev(VirtualHostDevice),
    Redirdev(VirtualRedirDevice),
    Watchdog(VirtualWatchdog),
    Memballoon(VirtualMemballoon),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in DeviceKind::ALL {
            assert_eq!(DeviceKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(DeviceKind::from_tag("emulator"), None);
    }

    #[test]
    fn test_kind_order_follows_libvirt() {
        assert!(DeviceKind::Disk < DeviceKind::Controller);
        assert!(DeviceKind::Interface < DeviceKind::Input);
        assert!(DeviceKind::Graphics < DeviceKind::Sound);
        assert!(DeviceKind::Watchdog < DeviceKind::Memballoon);
        let mut sorted = DeviceKind::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, DeviceKind::ALL);
    }

    #[test]
    fn test_from_element_dispatch() {
        let el = Element::parse("<console type='pty'><target type='serial'/></console>").unwrap();
        let dev = Device::from_element(el).unwrap();
        assert_eq!(dev.kind(), DeviceKind::Console);

        let el = Element::parse("<rng model='virtio'/>").unwrap();
        assert!(Device::from_element(el).is_none());
    }

    #[test]
    fn test_parsed_device_roundtrip_keeps_address() {
        let xml = "<interface type=\"network\">\n        <source network=\"default\"/>\n        <address type=\"pci\" domain=\"0x0000\" bus=\"0x00\" slot=\"0x03\" function=\"0x0\"/>\n      </interface>";
        let dev = Device::from_element(Element::parse(xml).unwrap()).unwrap();
        assert_eq!(dev.to_xml(), xml);
        assert_eq!(dev.address().slot(), Some(3));
    }

    #[test]
    fn test_filter() {
        assert!(DeviceFilter::All.matches(DeviceKind::Disk));
        assert!(DeviceFilter::from(DeviceKind::Disk).matches(DeviceKind::Disk));
        assert!(!DeviceFilter::Kind(DeviceKind::Disk).matches(DeviceKind::Video));
    }
}
