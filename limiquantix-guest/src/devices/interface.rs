//! Network interfaces.

use std::sync::OnceLock;

use tracing::{debug, warn};

use super::{device_builder, DeviceCore, DeviceKind, VirtualDevice};
use crate::binding::{xml_accessors, XmlBuilder, XmlProperty};
use crate::error::{GuestError, Result};
use crate::traits::{Connection, ProgressMeter};
use crate::validate::{random_mac, validate_macaddr, QEMU_OUI, XEN_OUI};
use crate::xml::Element;

const ORDER: &[&str] = &[
    "./@type",
    "./source/@bridge",
    "./source/@network",
    "./source/@dev",
    "./source/@mode",
    "./mac/@address",
    "./target/@dev",
    "./model/@type",
    "./virtualport/@type",
    "./virtualport/parameters/@managerid",
    "./virtualport/parameters/@typeid",
    "./virtualport/parameters/@typeidversion",
    "./virtualport/parameters/@instanceid",
    "./filterref/@filter",
    "./filterref/parameter/@name",
    "./filterref/parameter/@value",
    "./alias",
    "./address",
];

/// Attempts before [`VirtualInterface::generate_mac`] gives up.
const MAC_ATTEMPTS: usize = 256;

const TYPE: XmlProperty<VirtualInterface> = XmlProperty::new("type", "./@type")
    .with_default(|_| Some(VirtualInterface::TYPE_BRIDGE.into()));
const BRIDGE: XmlProperty<VirtualInterface> = XmlProperty::new("bridge", "./source/@bridge");
const NETWORK: XmlProperty<VirtualInterface> = XmlProperty::new("network", "./source/@network");
const SOURCE_DEV: XmlProperty<VirtualInterface> = XmlProperty::new("source_dev", "./source/@dev");
const SOURCE_MODE: XmlProperty<VirtualInterface> = XmlProperty::new("source_mode", "./source/@mode")
    .with_default(|nic| match nic.net_type().as_deref() {
        Some(VirtualInterface::TYPE_DIRECT) => Some("vepa".into()),
        _ => None,
    });
const MACADDR: XmlProperty<VirtualInterface> = XmlProperty::new("macaddr", "./mac/@address")
    .with_validator(|_, v| match v.as_str() {
        Some(mac) => validate_macaddr(mac),
        None => Ok(()),
    })
    .with_default(|nic| Some(nic.default_mac().into()));
const TARGET_DEV: XmlProperty<VirtualInterface> = XmlProperty::new("target_dev", "./target/@dev");
const MODEL: XmlProperty<VirtualInterface> = XmlProperty::new("model", "./model/@type");
const VPORT_TYPE: XmlProperty<VirtualInterface> =
    XmlProperty::new("virtualport_type", "./virtualport/@type");
const VPORT_MANAGERID: XmlProperty<VirtualInterface> =
    XmlProperty::new("managerid", "./virtualport/parameters/@managerid").int();
const VPORT_TYPEID: XmlProperty<VirtualInterface> =
    XmlProperty::new("typeid", "./virtualport/parameters/@typeid").int();
const VPORT_TYPEIDVERSION: XmlProperty<VirtualInterface> =
    XmlProperty::new("typeidversion", "./virtualport/parameters/@typeidversion").int();
const VPORT_INSTANCEID: XmlProperty<VirtualInterface> =
    XmlProperty::new("instanceid", "./virtualport/parameters/@instanceid");
const FILTERREF: XmlProperty<VirtualInterface> = XmlProperty::new("filterref", "./filterref/@filter");
const FILTERREF_PARAM_NAME: XmlProperty<VirtualInterface> =
    XmlProperty::new("filterref_parameter_name", "./filterref/parameter/@name");
const FILTERREF_PARAM_VALUE: XmlProperty<VirtualInterface> =
    XmlProperty::new("filterref_parameter_value", "./filterref/parameter/@value");

/// `<interface>` device.
#[derive(Debug, Clone)]
pub struct VirtualInterface {
    core: DeviceCore,
    /// OUI for generated MAC addresses
    oui: [u8; 3],
    /// Generated MAC, fixed on first use so repeated reads agree
    random_mac: OnceLock<String>,
}

device_builder!(
    VirtualInterface,
    [
        TYPE,
        BRIDGE,
        NETWORK,
        SOURCE_DEV,
        SOURCE_MODE,
        MACADDR,
        TARGET_DEV,
        MODEL,
        VPORT_TYPE,
        VPORT_MANAGERID,
        VPORT_TYPEID,
        VPORT_TYPEIDVERSION,
        VPORT_INSTANCEID,
        FILTERREF,
        FILTERREF_PARAM_NAME,
        FILTERREF_PARAM_VALUE
    ]
);

impl Default for VirtualInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualInterface {
    pub const TYPE_BRIDGE: &'static str = "bridge";
    pub const TYPE_VIRTUAL: &'static str = "network";
    pub const TYPE_USER: &'static str = "user";
    pub const TYPE_ETHERNET: &'static str = "ethernet";
    pub const TYPE_DIRECT: &'static str = "direct";
    pub const NETWORK_TYPES: &'static [&'static str] = &[
        Self::TYPE_BRIDGE,
        Self::TYPE_VIRTUAL,
        Self::TYPE_USER,
        Self::TYPE_ETHERNET,
        Self::TYPE_DIRECT,
    ];

    /// An interface whose generated MAC uses the qemu OUI.
    pub fn new() -> Self {
        Self {
            core: DeviceCore::new("interface", ORDER),
            oui: QEMU_OUI,
            random_mac: OnceLock::new(),
        }
    }

    /// An interface for `conn`, with a generated MAC that no guest on the
    /// connection uses yet.
    pub fn for_connection(conn: &dyn Connection) -> Result<Self> {
        let mut nic = Self::new();
        nic.oui = oui_for(conn);
        if let Some(mac) = Self::generate_mac(conn)? {
            let _ = nic.random_mac.set(mac);
        }
        Ok(nic)
    }

    pub(crate) fn parsed(el: Element) -> Self {
        Self {
            core: DeviceCore::parsed(el, ORDER),
            oui: QEMU_OUI,
            random_mac: OnceLock::new(),
        }
    }

    xml_accessors! {
        str net_type, set_net_type => TYPE;
        str bridge, set_bridge => BRIDGE;
        str network, set_network => NETWORK;
        str source_dev, set_source_dev => SOURCE_DEV;
        /// macvtap mode; "vepa" for direct interfaces unless set.
        str source_mode, set_source_mode => SOURCE_MODE;
        str macaddr, set_macaddr => MACADDR;
        str target_dev, set_target_dev => TARGET_DEV;
        str model, set_model => MODEL;
        str virtualport_type, set_virtualport_type => VPORT_TYPE;
        int virtualport_managerid, set_virtualport_managerid => VPORT_MANAGERID;
        int virtualport_typeid, set_virtualport_typeid => VPORT_TYPEID;
        int virtualport_typeidversion, set_virtualport_typeidversion => VPORT_TYPEIDVERSION;
        str virtualport_instanceid, set_virtualport_instanceid => VPORT_INSTANCEID;
        str filterref, set_filterref => FILTERREF;
        str filterref_parameter_name, set_filterref_parameter_name => FILTERREF_PARAM_NAME;
        str filterref_parameter_value, set_filterref_parameter_value => FILTERREF_PARAM_VALUE;
    }

    fn default_mac(&self) -> String {
        self.random_mac.get_or_init(|| random_mac(self.oui)).clone()
    }

    /// The `<source>` value relevant for the interface type.
    pub fn source(&self) -> Option<String> {
        match self.net_type().as_deref() {
            Some(Self::TYPE_VIRTUAL) => self.network(),
            Some(Self::TYPE_BRIDGE) => self.bridge(),
            Some(Self::TYPE_ETHERNET) | Some(Self::TYPE_DIRECT) => self.source_dev(),
            Some(Self::TYPE_USER) => None,
            _ => self.network().or_else(|| self.bridge()).or_else(|| self.source_dev()),
        }
    }

    /// Set the `<source>` value relevant for the interface type. User mode
    /// networking has no source and ignores the call.
    pub fn set_source(&mut self, source: Option<&str>) -> Result<()> {
        match self.net_type().as_deref() {
            Some(Self::TYPE_VIRTUAL) => self.set_network(source),
            Some(Self::TYPE_BRIDGE) => self.set_bridge(source),
            Some(Self::TYPE_ETHERNET) | Some(Self::TYPE_DIRECT) => self.set_source_dev(source),
            _ => Ok(()),
        }
    }

    /// Human readable description of a network type.
    pub fn network_type_desc(net_type: &str) -> String {
        match net_type {
            Self::TYPE_BRIDGE => "Shared physical device".to_string(),
            Self::TYPE_VIRTUAL => "Virtual networking".to_string(),
            Self::TYPE_USER => "Usermode networking".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            }
        }
    }

    /// A random MAC for `conn` that no known guest uses.
    pub fn generate_mac(conn: &dyn Connection) -> Result<Option<String>> {
        let oui = oui_for(conn);
        for _ in 0..MAC_ATTEMPTS {
            let mac = random_mac(oui);
            let (_, msg) = Self::is_conflict_net(conn, Some(&mac))?;
            if msg.is_none() {
                return Ok(Some(mac));
            }
        }
        debug!("Failed to generate non-conflicting MAC");
        Ok(None)
    }

    /// Look for `searchmac` among the guests on `conn`.
    ///
    /// Returns `(fatal, message)`: use by a running guest is fatal, use by
    /// an inactive one only deserves a warning.
    pub fn is_conflict_net(
        conn: &dyn Connection,
        searchmac: Option<&str>,
    ) -> Result<(bool, Option<String>)> {
        let Some(searchmac) = searchmac else {
            return Ok((false, None));
        };

        for guest in conn.list_guests()? {
            if guest.macs.iter().any(|mac| mac.eq_ignore_ascii_case(searchmac)) {
                return Ok((
                    guest.active,
                    Some(format!(
                        "The MAC address '{}' is in use by another virtual machine.",
                        searchmac
                    )),
                ));
            }
        }
        Ok((false, None))
    }
}

fn oui_for(conn: &dyn Connection) -> [u8; 3] {
    if conn.is_xen() {
        XEN_OUI
    } else {
        QEMU_OUI
    }
}

impl VirtualDevice for VirtualInterface {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Interface
    }

    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn setup(&mut self, conn: &dyn Connection, _meter: &mut dyn ProgressMeter) -> Result<()> {
        let Some(mac) = self.macaddr() else {
            return Ok(());
        };

        match Self::is_conflict_net(conn, Some(&mac))? {
            (_, None) => Ok(()),
            (false, Some(msg)) => {
                warn!(mac = %mac, "{}", msg);
                Ok(())
            }
            (true, Some(msg)) => Err(GuestError::Validation(msg)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.is_set(&MACADDR) {
            if let Some(mac) = self.macaddr() {
                validate_macaddr(&mac)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use crate::progress::NullMeter;

    #[test]
    fn test_build_defaults() {
        let mut nic = VirtualInterface::new();
        nic.set_macaddr(Some("52:54:00:11:22:33")).unwrap();
        assert_eq!(nic.net_type().as_deref(), Some("bridge"));
        assert_eq!(
            nic.to_xml(),
            "<interface type=\"bridge\">\n      <mac address=\"52:54:00:11:22:33\"/>\n    </interface>"
        );
    }

    #[test]
    fn test_random_mac_is_stable() {
        let nic = VirtualInterface::new();
        let mac = nic.macaddr().unwrap();
        assert!(mac.starts_with("52:54:00:"), "qemu OUI expected, got {}", mac);
        assert_eq!(nic.macaddr().unwrap(), mac, "default MAC must not change between reads");
    }

    #[test]
    fn test_xen_connection_uses_xen_oui() {
        let conn = MockConnection::new("xen:///");
        let nic = VirtualInterface::for_connection(&conn).unwrap();
        assert!(nic.macaddr().unwrap().starts_with("00:16:3e:"));
    }

    #[test]
    fn test_invalid_mac_rejected() {
        let mut nic = VirtualInterface::new();
        assert!(nic.set_macaddr(Some("52:54:00:11:22")).is_err());
        assert!(!nic.is_set(&MACADDR));
    }

    #[test]
    fn test_direct_defaults_to_vepa() {
        let mut nic = VirtualInterface::new();
        nic.set_net_type(Some("direct")).unwrap();
        nic.set_source(Some("eth0")).unwrap();
        nic.set_macaddr(Some("52:54:00:aa:bb:cc")).unwrap();
        assert_eq!(nic.source().as_deref(), Some("eth0"));
        assert_eq!(nic.source_mode().as_deref(), Some("vepa"));
        assert_eq!(
            nic.to_xml(),
            "<interface type=\"direct\">\n      <source dev=\"eth0\" mode=\"vepa\"/>\n      <mac address=\"52:54:00:aa:bb:cc\"/>\n    </interface>"
        );
    }

    #[test]
    fn test_source_dispatch() {
        let mut nic = VirtualInterface::new();
        nic.set_net_type(Some("network")).unwrap();
        nic.set_source(Some("default")).unwrap();
        assert_eq!(nic.network().as_deref(), Some("default"));
        assert_eq!(nic.bridge(), None);

        nic.set_net_type(Some("user")).unwrap();
        assert_eq!(nic.source(), None);
        nic.set_source(Some("ignored")).unwrap();
        assert_eq!(nic.network().as_deref(), Some("default"));
    }

    #[test]
    fn test_virtualport_and_filterref() {
        let mut nic = VirtualInterface::new();
        nic.set_macaddr(Some("52:54:00:00:00:01")).unwrap();
        nic.set_filterref_parameter_name(Some("IP")).unwrap();
        nic.set_filterref_parameter_value(Some("10.0.0.1")).unwrap();
        nic.set_filterref(Some("clean-traffic")).unwrap();
        nic.set_virtualport_type(Some("802.1Qbg")).unwrap();
        nic.set_virtualport_managerid(Some(12)).unwrap();
        nic.set_virtualport_typeid(Some(1193047)).unwrap();
        assert_eq!(nic.virtualport_typeid(), Some(1193047));

        let xml = nic.to_xml();
        let vport = xml.find("<virtualport").unwrap();
        let filter = xml.find("<filterref").unwrap();
        assert!(vport < filter, "virtualport goes before filterref: {}", xml);
        assert!(xml.contains("<filterref filter=\"clean-traffic\">"), "{}", xml);
        assert!(xml.contains("<parameter name=\"IP\" value=\"10.0.0.1\"/>"), "{}", xml);
        assert!(xml.contains("<parameters managerid=\"12\" typeid=\"1193047\"/>"), "{}", xml);
    }

    #[test]
    fn test_network_type_desc() {
        assert_eq!(VirtualInterface::network_type_desc("bridge"), "Shared physical device");
        assert_eq!(VirtualInterface::network_type_desc("network"), "Virtual networking");
        assert_eq!(VirtualInterface::network_type_desc("user"), "Usermode networking");
        assert_eq!(VirtualInterface::network_type_desc("direct"), "Direct");
    }

    #[test]
    fn test_conflict_fatal_only_for_active_guests() {
        let conn = MockConnection::new("qemu:///system")
            .with_guest("running", true, &["52:54:00:00:00:aa"])
            .with_guest("stopped", false, &["52:54:00:00:00:bb"]);

        let (fatal, msg) =
            VirtualInterface::is_conflict_net(&conn, Some("52:54:00:00:00:AA")).unwrap();
        assert!(fatal);
        assert_eq!(
            msg.as_deref(),
            Some("The MAC address '52:54:00:00:00:AA' is in use by another virtual machine.")
        );

        let (fatal, msg) =
            VirtualInterface::is_conflict_net(&conn, Some("52:54:00:00:00:bb")).unwrap();
        assert!(!fatal);
        assert!(msg.is_some());

        assert_eq!(
            VirtualInterface::is_conflict_net(&conn, Some("52:54:00:00:00:cc")).unwrap(),
            (false, None)
        );
        assert_eq!(VirtualInterface::is_conflict_net(&conn, None).unwrap(), (false, None));
    }

    #[test]
    fn test_setup_conflicts() {
        let conn = MockConnection::new("qemu:///system")
            .with_guest("running", true, &["52:54:00:00:00:aa"])
            .with_guest("stopped", false, &["52:54:00:00:00:bb"]);
        let mut meter = NullMeter;

        let mut nic = VirtualInterface::new();
        nic.set_macaddr(Some("52:54:00:00:00:bb")).unwrap();
        assert!(nic.setup(&conn, &mut meter).is_ok(), "inactive owner only warns");

        nic.set_macaddr(Some("52:54:00:00:00:aa")).unwrap();
        let err = nic.setup(&conn, &mut meter).unwrap_err();
        assert!(err.to_string().contains("in use by another virtual machine"));
    }

    #[test]
    fn test_generate_mac_avoids_conflicts() {
        let conn = MockConnection::new("qemu:///system").with_guest("a", true, &["52:54:00:00:00:01"]);
        let mac = VirtualInterface::generate_mac(&conn).unwrap().unwrap();
        assert!(mac.starts_with("52:54:00:"));
        assert_ne!(mac, "52:54:00:00:00:01");
    }
}
