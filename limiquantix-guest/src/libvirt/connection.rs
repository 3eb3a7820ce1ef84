//! Libvirt connection implementation.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::error::ErrorNumber;
use virt::sys;

use crate::error::{GuestError, Result};
use crate::traits::Connection;
use crate::types::*;

use super::{parse_capabilities, parse_guest_record};

/// Functions the bindings expose, by object class.
const FUNCTIONS: &[(ProbeObject, &str)] = &[
    (ProbeObject::Connection, "getHostname"),
    (ProbeObject::Connection, "getVersion"),
    (ProbeObject::Connection, "getLibVersion"),
    (ProbeObject::Connection, "listNetworks"),
    (ProbeObject::Connection, "listInterfaces"),
    (ProbeObject::Connection, "listStoragePools"),
    (ProbeObject::Connection, "listAllDomains"),
    (ProbeObject::Connection, "listAllNetworks"),
    (ProbeObject::Connection, "listAllStoragePools"),
    (ProbeObject::Connection, "listAllInterfaces"),
    (ProbeObject::Domain, "XMLDesc"),
    (ProbeObject::Domain, "hasManagedSaveImage"),
];

const FLAGS: &[&str] = &[
    "VIR_DOMAIN_XML_INACTIVE",
    "VIR_DOMAIN_XML_SECURE",
    "VIR_INTERFACE_XML_INACTIVE",
];

/// Probe failures map onto the driver's error code.
fn probe_error(e: virt::error::Error) -> ProbeError {
    if e.code() == ErrorNumber::NoSupport {
        ProbeError::NoSupport(e.to_string())
    } else {
        ProbeError::Hypervisor(e.to_string())
    }
}

fn conn_error(context: &str, e: virt::error::Error) -> GuestError {
    GuestError::Connection(format!("{}: {}", context, e))
}

/// Connection to a libvirt daemon.
pub struct LibvirtConnection {
    uri: String,
    connection: Connect,
    lib_version: u64,
    daemon_version: u64,
    functions: HashSet<(ProbeObject, &'static str)>,
}

impl LibvirtConnection {
    /// Connect to the libvirt daemon at `uri`.
    ///
    /// Common URIs:
    /// - `qemu:///system` - System-wide QEMU/KVM
    /// - `qemu:///session` - User session QEMU
    /// - `xen:///` - Local Xen
    /// - `qemu+ssh://user@host/system` - Remote via SSH
    pub fn open(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection =
            Connect::open(Some(uri)).map_err(|e| conn_error("Failed to connect", e))?;
        let lib_version = Connect::get_version()
            .map(u64::from)
            .map_err(|e| conn_error("Failed to read library version", e))?;
        // Older daemons cannot report their version.
        let daemon_version = connection.get_lib_version().map(u64::from).unwrap_or(0);
        let uri = connection.get_uri().unwrap_or_else(|_| uri.to_string());

        info!(uri = %uri, lib_version, daemon_version, "Connected to libvirt");

        Ok(Self {
            uri,
            connection,
            lib_version,
            daemon_version,
            functions: FUNCTIONS.iter().copied().collect(),
        })
    }

    fn lookup(&self, name: &str) -> Result<Domain> {
        Domain::lookup_by_name(&self.connection, name)
            .map_err(|e| GuestError::NotFound(format!("{}: {}", name, e)))
    }

    /// Blktap is only available on local Xen hosts with the module loaded.
    fn blktap_capable(&self) -> bool {
        if !self.is_xen() {
            return false;
        }
        std::fs::read_to_string("/proc/modules")
            .map(|modules| modules.lines().any(|l| l.starts_with("blktap")))
            .unwrap_or(false)
    }

    fn resolve_flag(flag: &str) -> Option<u32> {
        match flag {
            "VIR_DOMAIN_XML_INACTIVE" => Some(sys::VIR_DOMAIN_XML_INACTIVE),
            "VIR_DOMAIN_XML_SECURE" => Some(sys::VIR_DOMAIN_XML_SECURE),
            "VIR_INTERFACE_XML_INACTIVE" => Some(sys::VIR_INTERFACE_XML_INACTIVE),
            _ => None,
        }
    }

    fn probe_connection(&self, function: &str) -> std::result::Result<(), ProbeError> {
        let conn = &self.connection;
        let outcome = match function {
            "getHostname" => conn.get_hostname().map(|_| ()),
            "getVersion" => conn.get_hyp_version().map(|_| ()),
            "getLibVersion" => conn.get_lib_version().map(|_| ()),
            "listNetworks" => conn.list_networks().map(|_| ()),
            "listInterfaces" => conn.list_interfaces().map(|_| ()),
            "listStoragePools" => conn.list_storage_pools().map(|_| ()),
            "listAllDomains" => conn.list_all_domains(0).map(|_| ()),
            "listAllNetworks" => conn.list_all_networks(0).map(|_| ()),
            "listAllStoragePools" => conn.list_all_storage_pools(0).map(|_| ()),
            "listAllInterfaces" => conn.list_all_interfaces(0).map(|_| ()),
            other => {
                return Err(ProbeError::Binding(format!("{} is not wrapped", other)));
            }
        };
        outcome.map_err(probe_error)
    }

    fn probe_domain(
        &self,
        name: &str,
        function: &str,
        args: &[ProbeArg],
    ) -> std::result::Result<(), ProbeError> {
        let dom = Domain::lookup_by_name(&self.connection, name).map_err(probe_error)?;
        let flags = args
            .iter()
            .filter_map(|arg| match arg {
                ProbeArg::Flag(flag) => Self::resolve_flag(flag),
                ProbeArg::Int(v) => u32::try_from(*v).ok(),
                _ => None,
            })
            .fold(0, |acc, f| acc | f);
        let outcome = match function {
            "XMLDesc" => dom.get_xml_desc(flags).map(|_| ()),
            "hasManagedSaveImage" => dom.has_managed_save(flags).map(|_| ()),
            other => {
                return Err(ProbeError::Binding(format!("{} is not wrapped", other)));
            }
        };
        outcome.map_err(probe_error)
    }
}

impl Connection for LibvirtConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn local_lib_version(&self) -> u64 {
        self.lib_version
    }

    fn daemon_version(&self) -> u64 {
        self.daemon_version
    }

    fn driver_version(&self) -> Result<u64> {
        self.connection
            .get_hyp_version()
            .map(u64::from)
            .map_err(|e| conn_error("Failed to read driver version", e))
    }

    #[instrument(skip(self))]
    fn host_capabilities(&self) -> Result<HostCapabilities> {
        let xml = self
            .connection
            .get_capabilities()
            .map_err(|e| conn_error("Failed to read capabilities", e))?;
        let mut caps = parse_capabilities(&xml)?;
        caps.blktap_capable = self.blktap_capable();
        debug!(arch = %caps.arch, pae = caps.supports_pae, "Host capabilities");
        Ok(caps)
    }

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainRef>> {
        match Domain::lookup_by_name(&self.connection, name) {
            Ok(dom) => Ok(Some(DomainRef {
                name: name.to_string(),
                id: dom.get_id(),
            })),
            Err(e) if e.code() == ErrorNumber::NoDomain => Ok(None),
            Err(e) => Err(conn_error("Domain lookup failed", e)),
        }
    }

    #[instrument(skip(self, xml))]
    fn define_domain(&self, xml: &str) -> Result<DomainRef> {
        let dom = Domain::define_xml(&self.connection, xml)
            .map_err(|e| conn_error("Failed to define domain", e))?;
        let name = dom
            .get_name()
            .map_err(|e| conn_error("Failed to read domain name", e))?;
        info!(name = %name, "Domain defined");
        Ok(DomainRef { name, id: dom.get_id() })
    }

    #[instrument(skip(self, xml))]
    fn create_domain(&self, xml: &str) -> Result<DomainRef> {
        let dom = Domain::create_xml(&self.connection, xml, 0)
            .map_err(|e| conn_error("Failed to create domain", e))?;
        let name = dom
            .get_name()
            .map_err(|e| conn_error("Failed to read domain name", e))?;
        info!(name = %name, "Transient domain created");
        Ok(DomainRef { name, id: dom.get_id() })
    }

    #[instrument(skip(self))]
    fn start_domain(&self, name: &str) -> Result<()> {
        self.lookup(name)?
            .create()
            .map_err(|e| conn_error("Failed to start domain", e))?;
        info!(name = %name, "Domain started");
        Ok(())
    }

    #[instrument(skip(self))]
    fn destroy_domain(&self, name: &str) -> Result<()> {
        self.lookup(name)?
            .destroy()
            .map_err(|e| conn_error("Failed to destroy domain", e))?;
        info!(name = %name, "Domain destroyed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn undefine_domain(&self, name: &str) -> Result<()> {
        self.lookup(name)?
            .undefine()
            .map_err(|e| conn_error("Failed to undefine domain", e))?;
        info!(name = %name, "Domain undefined");
        Ok(())
    }

    fn set_autostart(&self, name: &str, autostart: bool) -> Result<()> {
        match self.lookup(name)?.set_autostart(autostart) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorNumber::NoSupport => {
                Err(GuestError::Unsupported(format!("autostart: {}", e)))
            }
            Err(e) => Err(conn_error("Failed to set autostart", e)),
        }
    }

    fn list_guests(&self) -> Result<Vec<GuestRecord>> {
        let domains = self
            .connection
            .list_all_domains(0)
            .map_err(|e| conn_error("Failed to list domains", e))?;
        let mut records = Vec::with_capacity(domains.len());
        for dom in domains {
            let active = dom.is_active().unwrap_or(false);
            match dom.get_xml_desc(0) {
                Ok(xml) => records.push(parse_guest_record(&xml, active)?),
                // The domain may vanish between listing and lookup.
                Err(e) => warn!(error = %e, "Skipping domain without XML"),
            }
        }
        Ok(records)
    }

    fn has_function(&self, object: ProbeObject, function: &str) -> bool {
        self.functions.iter().any(|(o, f)| *o == object && *f == function)
    }

    fn has_flag(&self, flag: &str) -> bool {
        FLAGS.contains(&flag)
    }

    fn probe(
        &self,
        target: &ProbeTarget,
        function: &str,
        args: &[ProbeArg],
    ) -> std::result::Result<(), ProbeError> {
        debug!(?target, function, "Probing");
        match target {
            ProbeTarget::Connection => self.probe_connection(function),
            ProbeTarget::Domain(name) => self.probe_domain(name, function, args),
            other => Err(ProbeError::Binding(format!(
                "probes against {} are not wrapped",
                other.object().class_name()
            ))),
        }
    }
}
