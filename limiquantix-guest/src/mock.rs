//! Mock hypervisor connection for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use tracing::{debug, info, instrument};

use crate::error::{GuestError, Result};
use crate::traits::Connection;
use crate::types::*;
use crate::xml::{Element, XmlPath};

/// Mock connection for testing.
///
/// Keeps domains in memory without requiring a hypervisor. Versions, host
/// facts and probe outcomes are configurable, and lifecycle calls are
/// recorded so tests can assert on them. Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
/// - Dry runs of the command-line tool
pub struct MockConnection {
    uri: String,
    lib_version: u64,
    daemon_version: u64,
    driver_version: u64,
    host: HostCapabilities,
    /// `None` means every function exists.
    functions: Option<HashSet<(ProbeObject, String)>>,
    missing_flags: HashSet<String>,
    probe_outcomes: HashMap<String, ProbeError>,
    domains: RwLock<HashMap<String, MockDomain>>,
    calls: RwLock<Vec<String>>,
    next_id: AtomicU32,
}

#[derive(Debug, Clone)]
struct MockDomain {
    id: Option<u32>,
    persistent: bool,
    autostart: bool,
    macs: Vec<String>,
}

impl MockConnection {
    /// Create a mock connection for `uri` with recent versions.
    pub fn new(uri: &str) -> Self {
        info!(uri = %uri, "Creating mock connection");
        Self {
            uri: uri.to_string(),
            lib_version: 1_002_000,
            daemon_version: 1_002_000,
            driver_version: 1_006_000,
            host: HostCapabilities::default(),
            functions: None,
            missing_flags: HashSet::new(),
            probe_outcomes: HashMap::new(),
            domains: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Set library, daemon and driver versions.
    pub fn with_versions(mut self, lib: u64, daemon: u64, driver: u64) -> Self {
        self.lib_version = lib;
        self.daemon_version = daemon;
        self.driver_version = driver;
        self
    }

    pub fn with_host(mut self, host: HostCapabilities) -> Self {
        self.host = host;
        self
    }

    /// Restrict the known API functions to those registered this way.
    pub fn with_function(mut self, object: ProbeObject, function: &str) -> Self {
        self.functions
            .get_or_insert_with(HashSet::new)
            .insert((object, function.to_string()));
        self
    }

    pub fn without_flag(mut self, flag: &str) -> Self {
        self.missing_flags.insert(flag.to_string());
        self
    }

    /// Make probes of `function` fail with `error`.
    pub fn with_probe_error(mut self, function: &str, error: ProbeError) -> Self {
        self.probe_outcomes.insert(function.to_string(), error);
        self
    }

    /// Register an existing guest.
    pub fn with_guest(self, name: &str, active: bool, macs: &[&str]) -> Self {
        if let Ok(mut domains) = self.domains.write() {
            let id = active.then(|| self.next_id.fetch_add(1, Ordering::SeqCst));
            domains.insert(
                name.to_string(),
                MockDomain {
                    id,
                    persistent: true,
                    autostart: false,
                    macs: macs.iter().map(|m| m.to_string()).collect(),
                },
            );
        }
        self
    }

    /// Lifecycle calls made so far, e.g. `"define:vm1"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// True when autostart was enabled for `name`.
    pub fn autostart_enabled(&self, name: &str) -> bool {
        self.domains
            .read()
            .map(|d| d.get(name).map(|dom| dom.autostart).unwrap_or(false))
            .unwrap_or(false)
    }

    fn record(&self, call: &str, name: &str) {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(format!("{}:{}", call, name));
        }
    }

    fn write_domains(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MockDomain>>> {
        self.domains
            .write()
            .map_err(|_| GuestError::Internal("Lock poisoned".to_string()))
    }

    /// Name and interface MACs from a domain document.
    fn parse_domain(xml: &str) -> Result<(String, Vec<String>)> {
        let root = Element::parse(xml)?;
        let name = root
            .value(&XmlPath::parse("./name"))
            .ok_or_else(|| GuestError::Xml("domain XML has no name".to_string()))?;
        let macs = root
            .find(&XmlPath::parse("./devices"))
            .map(|devices| {
                devices
                    .child_elements()
                    .filter(|el| el.name() == "interface")
                    .filter_map(|el| el.value(&XmlPath::parse("./mac/@address")))
                    .collect()
            })
            .unwrap_or_default();
        Ok((name, macs))
    }
}

impl Connection for MockConnection {
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
        Ok(self.driver_version)
    }

    fn host_capabilities(&self) -> Result<HostCapabilities> {
        Ok(self.host.clone())
    }

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainRef>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| GuestError::Internal("Lock poisoned".to_string()))?;
        Ok(domains.get(name).map(|dom| DomainRef {
            name: name.to_string(),
            id: dom.id,
        }))
    }

    #[instrument(skip(self, xml))]
    fn define_domain(&self, xml: &str) -> Result<DomainRef> {
        let (name, macs) = Self::parse_domain(xml)?;
        info!(name = %name, "Defining mock domain");

        let mut domains = self.write_domains()?;
        let dom = domains.entry(name.clone()).or_insert(MockDomain {
            id: None,
            persistent: true,
            autostart: false,
            macs: Vec::new(),
        });
        dom.persistent = true;
        dom.macs = macs;
        let id = dom.id;
        drop(domains);

        self.record("define", &name);
        Ok(DomainRef { name, id })
    }

    #[instrument(skip(self, xml))]
    fn create_domain(&self, xml: &str) -> Result<DomainRef> {
        let (name, macs) = Self::parse_domain(xml)?;
        info!(name = %name, "Creating mock domain");

        let mut domains = self.write_domains()?;
        if domains.get(&name).map(|d| d.id.is_some()).unwrap_or(false) {
            return Err(GuestError::Connection(format!("domain {} is already running", name)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let dom = domains.entry(name.clone()).or_insert(MockDomain {
            id: None,
            persistent: false,
            autostart: false,
            macs: Vec::new(),
        });
        dom.id = Some(id);
        dom.macs = macs;
        drop(domains);

        self.record("create", &name);
        Ok(DomainRef { name, id: Some(id) })
    }

    #[instrument(skip(self))]
    fn start_domain(&self, name: &str) -> Result<()> {
        let mut domains = self.write_domains()?;
        let dom = domains
            .get_mut(name)
            .ok_or_else(|| GuestError::NotFound(format!("domain {}", name)))?;
        if dom.id.is_some() {
            return Err(GuestError::Connection(format!("domain {} is already running", name)));
        }
        dom.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        drop(domains);

        self.record("start", name);
        Ok(())
    }

    #[instrument(skip(self))]
    fn destroy_domain(&self, name: &str) -> Result<()> {
        let mut domains = self.write_domains()?;
        let dom = domains
            .get(name)
            .ok_or_else(|| GuestError::NotFound(format!("domain {}", name)))?;
        if dom.id.is_none() {
            return Err(GuestError::Connection(format!("domain {} is not running", name)));
        }
        if dom.persistent {
            if let Some(dom) = domains.get_mut(name) {
                dom.id = None;
            }
        } else {
            domains.remove(name);
        }
        drop(domains);

        debug!("Mock domain destroyed");
        self.record("destroy", name);
        Ok(())
    }

    #[instrument(skip(self))]
    fn undefine_domain(&self, name: &str) -> Result<()> {
        let mut domains = self.write_domains()?;
        let running = domains
            .get(name)
            .map(|d| d.id.is_some())
            .ok_or_else(|| GuestError::NotFound(format!("domain {}", name)))?;
        if running {
            if let Some(dom) = domains.get_mut(name) {
                dom.persistent = false;
            }
        } else {
            domains.remove(name);
        }
        drop(domains);

        self.record("undefine", name);
        Ok(())
    }

    fn set_autostart(&self, name: &str, autostart: bool) -> Result<()> {
        let mut domains = self.write_domains()?;
        let dom = domains
            .get_mut(name)
            .ok_or_else(|| GuestError::NotFound(format!("domain {}", name)))?;
        dom.autostart = autostart;
        drop(domains);

        self.record("autostart", name);
        Ok(())
    }

    fn list_guests(&self) -> Result<Vec<GuestRecord>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| GuestError::Internal("Lock poisoned".to_string()))?;
        let mut guests: Vec<GuestRecord> = domains
            .iter()
            .map(|(name, dom)| GuestRecord {
                name: name.clone(),
                active: dom.id.is_some(),
                macs: dom.macs.clone(),
            })
            .collect();
        guests.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(guests)
    }

    fn has_function(&self, object: ProbeObject, function: &str) -> bool {
        match &self.functions {
            Some(known) => known.contains(&(object, function.to_string())),
            None => true,
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        !self.missing_flags.contains(flag)
    }

    fn probe(
        &self,
        target: &ProbeTarget,
        function: &str,
        _args: &[ProbeArg],
    ) -> std::result::Result<(), ProbeError> {
        debug!(object = target.object().class_name(), function, "Mock probe");
        match self.probe_outcomes.get(function) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "<domain type='kvm'><name>vm1</name><devices>\
        <interface type='network'><mac address='52:54:00:aa:bb:cc'/></interface>\
        </devices></domain>";

    #[test]
    fn test_define_and_lookup() {
        let conn = MockConnection::new("qemu:///system");
        assert!(conn.lookup_domain("vm1").unwrap().is_none());

        let dom = conn.define_domain(DOMAIN).unwrap();
        assert_eq!(dom.name, "vm1");
        assert!(!dom.is_running());

        let found = conn.lookup_domain("vm1").unwrap().unwrap();
        assert_eq!(found.id, None);
        assert_eq!(conn.calls(), vec!["define:vm1"]);
    }

    #[test]
    fn test_domain_lifecycle() {
        let conn = MockConnection::new("qemu:///system");

        // Transient create then persistent define
        let dom = conn.create_domain(DOMAIN).unwrap();
        assert!(dom.is_running());
        conn.define_domain(DOMAIN).unwrap();

        conn.destroy_domain("vm1").unwrap();
        let dom = conn.lookup_domain("vm1").unwrap().unwrap();
        assert!(!dom.is_running(), "persistent domain survives destroy");

        conn.start_domain("vm1").unwrap();
        assert!(conn.lookup_domain("vm1").unwrap().unwrap().is_running());
        assert!(conn.start_domain("vm1").is_err());

        conn.destroy_domain("vm1").unwrap();
        conn.undefine_domain("vm1").unwrap();
        assert!(conn.lookup_domain("vm1").unwrap().is_none());
    }

    #[test]
    fn test_list_guests_reports_macs() {
        let conn = MockConnection::new("qemu:///system").with_guest("other", false, &["52:54:00:00:00:01"]);
        conn.create_domain(DOMAIN).unwrap();

        let guests = conn.list_guests().unwrap();
        assert_eq!(guests.len(), 2);
        assert_eq!(guests[0].name, "other");
        assert!(!guests[0].active);
        assert_eq!(guests[1].macs, vec!["52:54:00:aa:bb:cc"]);
        assert!(guests[1].active);
    }

    #[test]
    fn test_probe_configuration() {
        let conn = MockConnection::new("xen:///")
            .with_function(ProbeObject::Connection, "listNetworks")
            .without_flag("VIR_DOMAIN_XML_SECURE")
            .with_probe_error("listNetworks", ProbeError::NoSupport("nope".into()));

        assert!(conn.is_xen());
        assert!(conn.has_function(ProbeObject::Connection, "listNetworks"));
        assert!(!conn.has_function(ProbeObject::Domain, "XMLDesc"));
        assert!(!conn.has_flag("VIR_DOMAIN_XML_SECURE"));
        assert!(conn
            .probe(&ProbeTarget::Connection, "listNetworks", &[])
            .is_err());
    }
}
