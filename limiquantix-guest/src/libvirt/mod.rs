//! Libvirt connection.
//!
//! [`LibvirtConnection`] requires the `libvirt` feature and a system libvirt
//! installation. The capability and domain XML parsers are always built so
//! they can be exercised without a hypervisor.

#[cfg(feature = "libvirt")]
mod connection;

#[cfg(feature = "libvirt")]
pub use connection::LibvirtConnection;

use crate::error::{GuestError, Result};
use crate::types::{GuestRecord, HostCapabilities};
use crate::xml::{Element, XmlPath};

/// Check if the libvirt connection is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}

/// Host facts from a `<capabilities>` document.
///
/// PAE is reported when any guest type lists the `pae` feature. Blktap
/// support is not part of the document and is left to the caller.
pub fn parse_capabilities(xml: &str) -> Result<HostCapabilities> {
    let root = Element::parse(xml)?;
    if root.name() != "capabilities" {
        return Err(GuestError::Xml(format!(
            "expected <capabilities>, found <{}>",
            root.name()
        )));
    }

    let defaults = HostCapabilities::default();
    let arch = root
        .value(&XmlPath::parse("./host/cpu/arch"))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or(defaults.arch);
    let pae = XmlPath::parse("./features/pae");
    let supports_pae = root
        .child_elements()
        .filter(|el| el.name() == "guest")
        .any(|guest| guest.exists(&pae));

    Ok(HostCapabilities {
        arch,
        supports_pae,
        blktap_capable: false,
    })
}

/// Summary of a defined guest from its domain XML.
pub fn parse_guest_record(xml: &str, active: bool) -> Result<GuestRecord> {
    let root = Element::parse(xml)?;
    let name = root
        .value(&XmlPath::parse("./name"))
        .ok_or_else(|| GuestError::Xml("domain XML has no name".to_string()))?;
    let mac = XmlPath::parse("./mac/@address");
    let macs = root
        .find_child("devices")
        .map(|devices| {
            devices
                .child_elements()
                .filter(|el| el.name() == "interface")
                .filter_map(|el| el.value(&mac))
                .collect()
        })
        .unwrap_or_default();
    Ok(GuestRecord { name, active, macs })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: &str = r#"<capabilities>
  <host>
    <cpu>
      <arch>x86_64</arch>
      <model>Haswell</model>
    </cpu>
  </host>
  <guest>
    <os_type>hvm</os_type>
    <arch name='i686'>
      <emulator>/usr/bin/qemu-kvm</emulator>
    </arch>
    <features>
      <pae/>
      <nonpae/>
    </features>
  </guest>
</capabilities>"#;

    #[test]
    fn test_parse_capabilities() {
        let caps = parse_capabilities(CAPS).unwrap();
        assert_eq!(caps.arch, "x86_64");
        assert!(caps.supports_pae);
        assert!(!caps.blktap_capable);

        let caps = parse_capabilities(
            "<capabilities><host><cpu><arch>ppc64</arch></cpu></host></capabilities>",
        )
        .unwrap();
        assert_eq!(caps.arch, "ppc64");
        assert!(!caps.supports_pae);

        assert!(parse_capabilities("<domain/>").is_err());
    }

    #[test]
    fn test_parse_guest_record() {
        let xml = "<domain type='kvm'><name>web</name><devices>\
            <interface type='network'><mac address='52:54:00:11:22:33'/></interface>\
            <disk type='file' device='disk'/>\
            <interface type='bridge'><source bridge='br0'/></interface>\
            </devices></domain>";
        let record = parse_guest_record(xml, true).unwrap();
        assert_eq!(record.name, "web");
        assert!(record.active);
        assert_eq!(record.macs, vec!["52:54:00:11:22:33"]);

        assert!(parse_guest_record("<domain/>", false).is_err());
    }
}
