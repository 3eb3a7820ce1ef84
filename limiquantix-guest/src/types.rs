//! Type definitions exchanged with the hypervisor connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// HOST & DOMAINS
// =============================================================================

/// Host facts consulted by the default passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Host CPU architecture (e.g. "x86_64", "ppc64", "armv7l")
    pub arch: String,
    /// Host guests can use PAE
    pub supports_pae: bool,
    /// Xen blktap driver is available
    pub blktap_capable: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            arch: "x86_64".to_string(),
            supports_pae: true,
            blktap_capable: false,
        }
    }
}

/// A domain known to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRef {
    pub name: String,
    /// Runtime ID; only running domains have one.
    pub id: Option<u32>,
}

impl DomainRef {
    pub fn is_running(&self) -> bool {
        self.id.is_some()
    }
}

/// Summary of an existing guest, used for MAC conflict checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub name: String,
    pub active: bool,
    /// MAC addresses of the guest's interfaces, as written in its XML
    pub macs: Vec<String>,
}

// =============================================================================
// CAPABILITY PROBES
// =============================================================================

/// The API object class a probe function belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeObject {
    Connection,
    Domain,
    StoragePool,
    NodeDevice,
    Interface,
    Network,
    Stream,
}

impl ProbeObject {
    /// Class name as used by the libvirt bindings.
    pub fn class_name(&self) -> &'static str {
        match self {
            ProbeObject::Connection => "virConnect",
            ProbeObject::Domain => "virDomain",
            ProbeObject::StoragePool => "virStoragePool",
            ProbeObject::NodeDevice => "virNodeDevice",
            ProbeObject::Interface => "virInterface",
            ProbeObject::Network => "virNetwork",
            ProbeObject::Stream => "virStream",
        }
    }
}

/// The concrete object a probe runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeTarget {
    Connection,
    Domain(String),
    StoragePool(String),
    NodeDevice(String),
    Interface(String),
    Network(String),
    Stream,
}

impl ProbeTarget {
    pub fn object(&self) -> ProbeObject {
        match self {
            ProbeTarget::Connection => ProbeObject::Connection,
            ProbeTarget::Domain(_) => ProbeObject::Domain,
            ProbeTarget::StoragePool(_) => ProbeObject::StoragePool,
            ProbeTarget::NodeDevice(_) => ProbeObject::NodeDevice,
            ProbeTarget::Interface(_) => ProbeObject::Interface,
            ProbeTarget::Network(_) => ProbeObject::Network,
            ProbeTarget::Stream => ProbeObject::Stream,
        }
    }
}

/// An argument passed to a probe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeArg {
    Null,
    Int(i64),
    Str(String),
    /// A named API flag, resolved by the connection.
    Flag(String),
}

/// How a probe call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The driver reported the call as unsupported.
    #[error("operation not supported: {0}")]
    NoSupport(String),

    /// The driver failed for another reason.
    #[error("hypervisor error: {0}")]
    Hypervisor(String),

    /// The call could not be made with the given arguments.
    #[error("binding error: {0}")]
    Binding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&ProbeObject::StoragePool).unwrap();
        assert_eq!(json, "\"storage_pool\"");

        let caps: HostCapabilities =
            serde_json::from_str(r#"{"arch":"ppc64","supports_pae":false,"blktap_capable":false}"#)
                .unwrap();
        assert_eq!(caps.arch, "ppc64");
        assert_eq!(ProbeTarget::Domain("vm".into()).object().class_name(), "virDomain");
    }

    #[test]
    fn test_running_needs_an_id() {
        let dom = DomainRef { name: "vm".into(), id: None };
        assert!(!dom.is_running());
        assert!(DomainRef { id: Some(3), ..dom }.is_running());
    }
}
