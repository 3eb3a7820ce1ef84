//! Graphical framebuffers (VNC, SPICE, SDL).

use tracing::debug;

use super::{device_builder, DeviceContext, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::support::{check_conn_support, SupportFeature};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./@port",
    "./@tlsPort",
    "./@autoport",
    "./@keymap",
    "./@listen",
    "./@passwd",
    "./@passwdValidTo",
    "./@socket",
    "./@display",
    "./@xauth",
    "./alias",
    "./address",
];

/// Keymap used when the hypervisor cannot pick one itself.
const FALLBACK_KEYMAP: &str = "en-us";

fn uses_ports(gfx: &VirtualGraphics) -> bool {
    matches!(
        gfx.graphics_type().as_deref(),
        Some(VirtualGraphics::TYPE_VNC) | Some(VirtualGraphics::TYPE_SPICE)
    )
}

fn validate_port(_: &VirtualGraphics, value: &crate::binding::PropValue) -> Result<()> {
    match value.as_int() {
        Some(port) if port == -1 || (5900..=65535).contains(&port) => Ok(()),
        _ => Err(GuestError::Validation(format!(
            "Graphics port '{}' must be between 5900 and 65535, or -1 for auto allocation",
            value
        ))),
    }
}

const TYPE: XmlProperty<VirtualGraphics> = XmlProperty::new("type", "./@type")
    .with_default(|_| Some(VirtualGraphics::TYPE_VNC.into()));
const PORT: XmlProperty<VirtualGraphics> = XmlProperty::new("port", "./@port")
    .int()
    .with_validator(validate_port)
    .with_default(|gfx| uses_ports(gfx).then(|| (-1i64).into()));
const TLS_PORT: XmlProperty<VirtualGraphics> = XmlProperty::new("tlsPort", "./@tlsPort")
    .int()
    .with_validator(validate_port)
    .with_default(|gfx| {
        (gfx.graphics_type().as_deref() == Some(VirtualGraphics::TYPE_SPICE)).then(|| (-1i64).into())
    });
const AUTOPORT: XmlProperty<VirtualGraphics> = XmlProperty::new("autoport", "./@autoport").yesno();
const KEYMAP: XmlProperty<VirtualGraphics> = XmlProperty::new("keymap", "./@keymap");
const LISTEN: XmlProperty<VirtualGraphics> = XmlProperty::new("listen", "./@listen");
const PASSWD: XmlProperty<VirtualGraphics> = XmlProperty::new("passwd", "./@passwd");
const PASSWD_VALID_TO: XmlProperty<VirtualGraphics> =
    XmlProperty::new("passwdValidTo", "./@passwdValidTo");
const SOCKET: XmlProperty<VirtualGraphics> = XmlProperty::new("socket", "./@socket");
const DISPLAY: XmlProperty<VirtualGraphics> = XmlProperty::new("display", "./@display");
const XAUTH: XmlProperty<VirtualGraphics> = XmlProperty::new("xauth", "./@xauth");

/// `<graphics>` device.
#[derive(Debug, Clone)]
pub struct VirtualGraphics {
    core: DeviceCore,
}

device_builder!(
    VirtualGraphics,
    [
        TYPE,
        PORT,
        TLS_PORT,
        AUTOPORT,
        KEYMAP,
        LISTEN,
        PASSWD,
        PASSWD_VALID_TO,
        SOCKET,
        DISPLAY,
        XAUTH
    ]
);

impl Default for VirtualGraphics {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualGraphics {
    pub const TYPE_SDL: &'static str = "sdl";
    pub const TYPE_VNC: &'static str = "vnc";
    pub const TYPE_RDP: &'static str = "rdp";
    pub const TYPE_SPICE: &'static str = "spice";
    pub const TYPES: &'static [&'static str] =
        &[Self::TYPE_VNC, Self::TYPE_SDL, Self::TYPE_RDP, Self::TYPE_SPICE];

    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("graphics", ORDER),
        }
    }

    /// A framebuffer of the given type.
    pub fn with_type(gtype: &str) -> Self {
        let mut gfx = Self::new();
        // The type property has no validator, so the write cannot fail.
        let _ = gfx.set_graphics_type(Some(gtype));
        gfx
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
        }
    }

    xml_accessors! {
        str graphics_type, set_graphics_type => TYPE;
        int port, set_port => PORT;
        int tls_port, set_tls_port => TLS_PORT;
        flag autoport, set_autoport => AUTOPORT;
        str keymap, set_keymap => KEYMAP;
        str listen, set_listen => LISTEN;
        str passwd, set_passwd => PASSWD;
        str passwd_valid_to, set_passwd_valid_to => PASSWD_VALID_TO;
        /// VNC unix socket path.
        str socket, set_socket => SOCKET;
        str display, set_display => DISPLAY;
        str xauth, set_xauth => XAUTH;
    }

    pub fn is_spice(&self) -> bool {
        self.graphics_type().as_deref() == Some(Self::TYPE_SPICE)
    }

    pub fn pretty_type(gtype: &str) -> String {
        match gtype {
            Self::TYPE_VNC | Self::TYPE_SDL | Self::TYPE_RDP => gtype.to_ascii_uppercase(),
            Self::TYPE_SPICE => "Spice".to_string(),
            other => other.to_string(),
        }
    }
}

impl VirtualDevice for VirtualGraphics {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Graphics
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn set_defaults(&mut self, ctx: &DeviceContext<'_>) -> Result<()> {
        if self.graphics_type().as_deref() != Some(Self::TYPE_VNC) || self.keymap().is_some() {
            return Ok(());
        }
        if !check_conn_support(ctx.conn, SupportFeature::ConnKeymapAutodetect, ctx.compat) {
            debug!(keymap = FALLBACK_KEYMAP, "Hypervisor cannot detect keymap");
            self.set_keymap(Some(FALLBACK_KEYMAP))?;
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
    fn test_port_defaults() {
        let vnc = VirtualGraphics::new();
        assert_eq!(vnc.port(), Some(-1));
        assert_eq!(vnc.tls_port(), None);
        assert_eq!(vnc.to_xml(), "<graphics type=\"vnc\" port=\"-1\"/>");

        let spice = VirtualGraphics::with_type("spice");
        assert!(spice.is_spice());
        assert_eq!(spice.to_xml(), "<graphics type=\"spice\" port=\"-1\" tlsPort=\"-1\"/>");

        let sdl = VirtualGraphics::with_type("sdl");
        assert_eq!(sdl.port(), None);
        assert_eq!(sdl.to_xml(), "<graphics type=\"sdl\"/>");
    }

    #[test]
    fn test_port_range() {
        let mut vnc = VirtualGraphics::new();
        assert!(vnc.set_port(Some(80)).is_err());
        vnc.set_port(Some(5901)).unwrap();
        vnc.set_autoport(Some(false)).unwrap();
        assert_eq!(vnc.to_xml(), "<graphics type=\"vnc\" port=\"5901\" autoport=\"no\"/>");
    }

    #[test]
    fn test_keymap_default_depends_on_autodetect() {
        let os = DomainOs::new();

        let qemu = MockConnection::new("qemu:///system");
        let ctx = DeviceContext { conn: &qemu, os: &os, hv_type: "kvm", compat: CompatMode::Upstream };
        let mut gfx = VirtualGraphics::new();
        gfx.set_defaults(&ctx).unwrap();
        assert_eq!(gfx.keymap(), None, "qemu detects the keymap itself");

        let xen = MockConnection::new("xen:///");
        let ctx = DeviceContext { conn: &xen, os: &os, hv_type: "xen", compat: CompatMode::Upstream };
        gfx.set_defaults(&ctx).unwrap();
        assert_eq!(gfx.keymap().as_deref(), Some("en-us"));

        gfx.set_keymap(Some("de")).unwrap();
        gfx.set_defaults(&ctx).unwrap();
        assert_eq!(gfx.keymap().as_deref(), Some("de"), "explicit keymap is kept");
    }
}
