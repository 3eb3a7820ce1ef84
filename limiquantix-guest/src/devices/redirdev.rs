//! USB redirection device.

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@bus",
    "./@type",
    "./source/@host",
    "./source/@service",
    "./alias",
    "./address",
];

const BUS: XmlProperty<VirtualRedirDevice> =
    XmlProperty::new("bus", "./@bus").with_default(|_| Some("usb".into()));
const TYPE: XmlProperty<VirtualRedirDevice> = XmlProperty::new("type", "./@type");
const HOST: XmlProperty<VirtualRedirDevice> = XmlProperty::new("host", "./source/@host");
const SERVICE: XmlProperty<VirtualRedirDevice> =
    XmlProperty::new("service", "./source/@service").int();

/// `<redirdev>` device.
#[derive(Debug, Clone)]
pub struct VirtualRedirDevice {
    core: DeviceCore,
}

device_builder!(VirtualRedirDevice, [BUS, TYPE, HOST, SERVICE]);

impl Default for VirtualRedirDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRedirDevice {
    pub const TYPE_SPICEVMC: &'static str = "spicevmc";
    pub const TYPE_TCP: &'static str = "tcp";

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("redirdev", ORDER),
        }
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str bus, set_bus => BUS;
        str redir_type, set_redir_type => TYPE;
        str host, set_host => HOST;
        int service, set_service => SERVICE;
    }

    /// Parse `host:port` for tcp redirection.
    pub fn parse_friendly_server(&mut self, server: &str) -> Result<()> {
        let (host, port) = server.rsplit_once(':').ok_or_else(|| {
            GuestError::Validation(format!("Could not determine host and port from '{}'", server))
        })?;
        let port: i64 = port
            .parse()
            .map_err(|_| GuestError::Validation(format!("Invalid port '{}'", port)))?;
        self.set_host(Some(host))?;
        self.set_service(Some(port))
    }
}

impl VirtualDevice for VirtualRedirDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Redirdev
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn validate(&self) -> Result<()> {
        if self.redir_type().as_deref() == Some(Self::TYPE_TCP) && self.host().is_none() {
            return Err(GuestError::Validation(
                "tcp redirection needs a source host".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::XmlBuilder;

    #[test]
    fn test_tcp_redir() {
        let mut redir = VirtualRedirDevice::new();
        redir.set_redir_type(Some("tcp")).unwrap();
        assert!(redir.validate().is_err());

        redir.parse_friendly_server("example.com:4000").unwrap();
        assert!(redir.validate().is_ok());
        assert_eq!(
            redir.to_xml(),
            "<redirdev bus=\"usb\" type=\"tcp\">\n      <source host=\"example.com\" service=\"4000\"/>\n    </redirdev>"
        );
    }

    #[test]
    fn test_bad_server() {
        let mut redir = VirtualRedirDevice::new();
        assert!(redir.parse_friendly_server("nohost").is_err());
        assert!(redir.parse_friendly_server("host:port").is_err());
    }
}
