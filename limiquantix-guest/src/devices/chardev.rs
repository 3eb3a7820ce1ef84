//! Character devices: serial, parallel, console and channel.
//!
//! All four share one element layout and differ only in their tag, so they
//! are one struct carrying a [`CharKind`].

use super::{device_builder, DeviceContext, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./source",
    "./source/@path",
    "./source/@mode",
    "./source[@mode='bind']/@host",
    "./source[@mode='bind']/@service",
    "./source[@mode='connect']/@host",
    "./source[@mode='connect']/@service",
    "./protocol/@type",
    "./target/@type",
    "./target/@name",
    "./target/@address",
    "./target/@port",
    "./alias",
    "./address",
];

const TYPE: XmlProperty<CharDevice> =
    XmlProperty::new("type", "./@type").with_default(|_| Some(CharDevice::TYPE_PTY.into()));
const SOURCE_PATH: XmlProperty<CharDevice> = XmlProperty::new("source_path", "./source/@path");
const SOURCE_MODE: XmlProperty<CharDevice> = XmlProperty::new("source_mode", "./source/@mode");
const BIND_HOST: XmlProperty<CharDevice> =
    XmlProperty::new("bind_host", "./source[@mode='bind']/@host");
const BIND_PORT: XmlProperty<CharDevice> =
    XmlProperty::new("bind_port", "./source[@mode='bind']/@service").int();
const SOURCE_HOST: XmlProperty<CharDevice> =
    XmlProperty::new("source_host", "./source[@mode='connect']/@host");
const SOURCE_PORT: XmlProperty<CharDevice> =
    XmlProperty::new("source_port", "./source[@mode='connect']/@service").int();
const PROTOCOL: XmlProperty<CharDevice> = XmlProperty::new("protocol", "./protocol/@type");
const TARGET_TYPE: XmlProperty<CharDevice> = XmlProperty::new("target_type", "./target/@type");
const TARGET_NAME: XmlProperty<CharDevice> = XmlProperty::new("target_name", "./target/@name");
const TARGET_ADDRESS: XmlProperty<CharDevice> =
    XmlProperty::new("target_address", "./target/@address");
const TARGET_PORT: XmlProperty<CharDevice> =
    XmlProperty::new("target_port", "./target/@port").int();

/// Which character device element this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharKind {
    Serial,
    Parallel,
    Console,
    Channel,
}

impl CharKind {
    pub fn device_kind(self) -> DeviceKind {
        match self {
            CharKind::Serial => DeviceKind::Serial,
            CharKind::Parallel => DeviceKind::Parallel,
            CharKind::Console => DeviceKind::Console,
            CharKind::Channel => DeviceKind::Channel,
        }
    }
}

/// A `<serial>`, `<parallel>`, `<console>` or `<channel>` device.
#[derive(Debug, Clone)]
pub struct CharDevice {
    char_kind: CharKind,
    core: DeviceCore,
}

device_builder!(
    CharDevice,
    [
        TYPE,
        SOURCE_PATH,
        SOURCE_MODE,
        BIND_HOST,
        BIND_PORT,
        SOURCE_HOST,
        SOURCE_PORT,
        PROTOCOL,
        TARGET_TYPE,
        TARGET_NAME,
        TARGET_ADDRESS,
        TARGET_PORT
    ]
);

impl CharDevice {
    pub const TYPE_PTY: &'static str = "pty";
    pub const TYPE_DEV: &'static str = "dev";
    pub const TYPE_STDIO: &'static str = "stdio";
    pub const TYPE_PIPE: &'static str = "pipe";
    pub const TYPE_FILE: &'static str = "file";
    pub const TYPE_VC: &'static str = "vc";
    pub const TYPE_NULL: &'static str = "null";
    pub const TYPE_TCP: &'static str = "tcp";
    pub const TYPE_UDP: &'static str = "udp";
    pub const TYPE_UNIX: &'static str = "unix";
    pub const TYPE_SPICEVMC: &'static str = "spicevmc";

    pub const CHANNEL_TARGET_GUESTFWD: &'static str = "guestfwd";
    pub const CHANNEL_TARGET_VIRTIO: &'static str = "virtio";
    pub const CHANNEL_NAME_SPICE: &'static str = "com.redhat.spice.0";

    pub fn new(kind: CharKind) -> Self {
        Self {
            char_kind: kind,
            core: DeviceCore::new(kind.device_kind().tag(), ORDER),
        }
    }

    pub(crate) fn parsed(kind: CharKind, el: Element) -> Self {
        Self {
            char_kind: kind,
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    /// The spice agent channel.
    pub fn spicevmc_channel() -> Self {
        let mut chan = Self::new(CharKind::Channel);
        // No validator on the type property.
        let _ = chan.set_char_type(Some(Self::TYPE_SPICEVMC));
        chan
    }

    pub fn char_kind(&self) -> CharKind {
        self.char_kind
    }

    xml_accessors! {
        str char_type, set_char_type => TYPE;
        str source_path, set_source_path => SOURCE_PATH;
        str source_mode, set_source_mode => SOURCE_MODE;
        str bind_host, set_bind_host => BIND_HOST;
        int bind_port, set_bind_port => BIND_PORT;
        /// Remote host for connect-mode sockets.
        str source_host, set_source_host => SOURCE_HOST;
        int source_port, set_source_port => SOURCE_PORT;
        str protocol, set_protocol => PROTOCOL;
        str target_type, set_target_type => TARGET_TYPE;
        str target_name, set_target_name => TARGET_NAME;
        str target_address, set_target_address => TARGET_ADDRESS;
        int target_port, set_target_port => TARGET_PORT;
    }

    pub fn is_spicevmc_channel(&self) -> bool {
        self.char_kind == CharKind::Channel
            && self.char_type().as_deref() == Some(Self::TYPE_SPICEVMC)
    }

    fn needs_path(ctype: &str) -> bool {
        matches!(
            ctype,
            Self::TYPE_DEV | Self::TYPE_FILE | Self::TYPE_PIPE | Self::TYPE_UNIX
        )
    }
}

impl VirtualDevice for CharDevice {
    fn kind(&self) -> DeviceKind {
        self.char_kind.device_kind()
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn set_defaults(&mut self, _ctx: &DeviceContext<'_>) -> Result<()> {
        if !self.is_spicevmc_channel() {
            return Ok(());
        }
        if self.target_type().is_none() {
            self.set_target_type(Some(Self::CHANNEL_TARGET_VIRTIO))?;
        }
        if self.target_type().as_deref() == Some(Self::CHANNEL_TARGET_VIRTIO)
            && self.target_name().is_none()
        {
            self.set_target_name(Some(Self::CHANNEL_NAME_SPICE))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let ctype = self.char_type().unwrap_or_default();
        if Self::needs_path(&ctype) && self.source_path().is_none() {
            return Err(GuestError::Validation(format!(
                "{} device of type '{}' needs a source path",
                self.kind(),
                ctype
            )));
        }
        if ctype == Self::TYPE_TCP && self.source_host().is_none() && self.bind_host().is_none() {
            return Err(GuestError::Validation(format!(
                "{} device of type 'tcp' needs a host",
                self.kind()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::XmlBuilder;
    use crate::domain::DomainOs;
    use crate::mock::MockConnection;
    use crate::support::CompatMode;

    #[test]
    fn test_pty_serial_default() {
        let serial = CharDevice::new(CharKind::Serial);
        assert_eq!(serial.kind(), DeviceKind::Serial);
        assert_eq!(serial.to_xml(), "<serial type=\"pty\"/>");
    }

    #[test]
    fn test_tcp_source_modes() {
        let mut serial = CharDevice::new(CharKind::Serial);
        serial.set_char_type(Some("tcp")).unwrap();
        assert!(serial.validate().is_err());

        serial.set_source_host(Some("127.0.0.1")).unwrap();
        serial.set_source_port(Some(4555)).unwrap();
        serial.set_protocol(Some("telnet")).unwrap();
        serial.set_target_port(Some(0)).unwrap();
        assert!(serial.validate().is_ok());
        assert_eq!(serial.source_mode().as_deref(), Some("connect"));
        assert_eq!(
            serial.to_xml(),
            "<serial type=\"tcp\">\n      <source mode=\"connect\" host=\"127.0.0.1\" service=\"4555\"/>\n      <protocol type=\"telnet\"/>\n      <target port=\"0\"/>\n    </serial>"
        );
    }

    #[test]
    fn test_spicevmc_channel_defaults() {
        let conn = MockConnection::new("qemu:///system");
        let os = DomainOs::new();
        let ctx = DeviceContext {
            conn: &conn,
            os: &os,
            hv_type: "kvm",
            compat: CompatMode::Upstream,
        };

        let mut chan = CharDevice::spicevmc_channel();
        chan.set_defaults(&ctx).unwrap();
        assert_eq!(chan.target_type().as_deref(), Some("virtio"));
        assert_eq!(chan.target_name().as_deref(), Some("com.redhat.spice.0"));

        chan.set_defaults(&ctx).unwrap();
        assert_eq!(
            chan.to_xml(),
            "<channel type=\"spicevmc\">\n      <target type=\"virtio\" name=\"com.redhat.spice.0\"/>\n    </channel>"
        );
    }

    #[test]
    fn test_file_needs_path() {
        let mut par = CharDevice::new(CharKind::Parallel);
        par.set_char_type(Some("file")).unwrap();
        assert!(par.validate().is_err());
        par.set_source_path(Some("/tmp/par.log")).unwrap();
        assert!(par.validate().is_ok());
    }
}
