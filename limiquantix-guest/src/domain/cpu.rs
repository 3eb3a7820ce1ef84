//! `<cpu>`: guest CPU model, topology and feature flags.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::{xml_accessors, XmlProperty};
use crate::error::{GuestError, Result};
use crate::xml::Element;

use super::subobject_builder;

const ORDER: &[&str] = &[
    "./@match",
    "./model",
    "./vendor",
    "./topology/@sockets",
    "./topology/@cores",
    "./topology/@threads",
    "./feature",
];

const MATCH: XmlProperty<DomainCpu> = XmlProperty::new("match", "./@match");
const MODEL: XmlProperty<DomainCpu> = XmlProperty::new("model", "./model");
const VENDOR: XmlProperty<DomainCpu> = XmlProperty::new("vendor", "./vendor");
const SOCKETS: XmlProperty<DomainCpu> = XmlProperty::new("sockets", "./topology/@sockets").int();
const CORES: XmlProperty<DomainCpu> = XmlProperty::new("cores", "./topology/@cores").int();
const THREADS: XmlProperty<DomainCpu> = XmlProperty::new("threads", "./topology/@threads").int();

/// A `<feature>` entry of the CPU definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuFeature {
    pub name: String,
    /// force, require, optional, disable or forbid
    pub policy: String,
}

#[derive(Debug, Clone)]
pub struct DomainCpu {
    state: crate::binding::XmlState,
}

subobject_builder!(DomainCpu, "cpu", ORDER, [MATCH, MODEL, VENDOR, SOCKETS, CORES, THREADS]);

impl DomainCpu {
    pub const MATCH_MINIMUM: &'static str = "minimum";
    pub const MATCH_EXACT: &'static str = "exact";
    pub const MATCH_STRICT: &'static str = "strict";

    pub const POLICIES: &'static [&'static str] =
        &["force", "require", "optional", "disable", "forbid"];

    xml_accessors! {
        str match_mode, set_match_mode => MATCH;
        str model, set_model => MODEL;
        str vendor, set_vendor => VENDOR;
        int sockets, set_sockets => SOCKETS;
        int cores, set_cores => CORES;
        int threads, set_threads => THREADS;
    }

    pub fn features(&self) -> Vec<CpuFeature> {
        self.state
            .element()
            .child_elements()
            .filter(|el| el.name() == "feature")
            .filter_map(|el| {
                Some(CpuFeature {
                    name: el.attribute("name")?.to_string(),
                    policy: el.attribute("policy").unwrap_or("require").to_string(),
                })
            })
            .collect()
    }

    /// Add a feature flag, replacing the policy of an existing entry.
    pub fn add_feature(&mut self, name: &str, policy: &str) -> Result<()> {
        if !Self::POLICIES.contains(&policy) {
            return Err(GuestError::Validation(format!(
                "Unknown CPU feature policy '{}'",
                policy
            )));
        }
        let hint = self.state.hint("./feature");
        let el = self.state.element_mut();
        let existing = el.take_children_where(|f| f.name() == "feature");
        let mut replaced = false;
        for mut feature in existing {
            if feature.attribute("name") == Some(name) {
                feature.set_attribute("policy", policy);
                replaced = true;
            }
            el.append_child(feature, &hint);
        }
        if !replaced {
            let mut feature = Element::new("feature");
            feature.set_attribute("policy", policy);
            feature.set_attribute("name", name);
            el.append_child(feature, &hint);
        }
        Ok(())
    }

    pub fn remove_feature(&mut self, name: &str) {
        self.state
            .element_mut()
            .take_children_where(|f| f.name() == "feature" && f.attribute("name") == Some(name));
    }

    /// vCPU count implied by the topology, when any of it is set.
    pub fn vcpus_from_topology(&self) -> Option<i64> {
        if self.sockets().is_none() && self.cores().is_none() && self.threads().is_none() {
            return None;
        }
        Some(self.sockets().unwrap_or(1) * self.cores().unwrap_or(1) * self.threads().unwrap_or(1))
    }

    /// Complete a partial topology so it covers `vcpus`. A CPU without any
    /// topology is left alone.
    pub fn set_topology_defaults(&mut self, vcpus: i64) -> Result<()> {
        if self.vcpus_from_topology().is_none() {
            return Ok(());
        }

        let threads = self.threads().unwrap_or(1).max(1);
        if self.threads().is_none() {
            self.set_threads(Some(threads))?;
        }

        match (self.sockets(), self.cores()) {
            (None, cores) => {
                let cores = cores.unwrap_or(1).max(1);
                if self.cores().is_none() {
                    self.set_cores(Some(cores))?;
                }
                let sockets = (vcpus / (cores * threads)).max(1);
                self.set_sockets(Some(sockets))?;
            }
            (Some(sockets), None) => {
                let cores = (vcpus / (sockets.max(1) * threads)).max(1);
                self.set_cores(Some(cores))?;
            }
            (Some(_), Some(_)) => {}
        }
        debug!(
            sockets = ?self.sockets(),
            cores = ?self.cores(),
            threads = ?self.threads(),
            "CPU topology defaults applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::XmlBuilder;

    #[test]
    fn test_topology_untouched_when_unset() {
        let mut cpu = DomainCpu::new();
        cpu.set_topology_defaults(4).unwrap();
        assert_eq!(cpu.to_xml(), "");
    }

    #[test]
    fn test_topology_fill_in() {
        let mut cpu = DomainCpu::new();
        cpu.set_cores(Some(2)).unwrap();
        cpu.set_topology_defaults(8).unwrap();
        assert_eq!((cpu.sockets(), cpu.cores(), cpu.threads()), (Some(4), Some(2), Some(1)));

        let mut cpu = DomainCpu::new();
        cpu.set_sockets(Some(2)).unwrap();
        cpu.set_topology_defaults(8).unwrap();
        assert_eq!((cpu.sockets(), cpu.cores(), cpu.threads()), (Some(2), Some(4), Some(1)));
        assert_eq!(cpu.vcpus_from_topology(), Some(8));
    }

    #[test]
    fn test_features() {
        let mut cpu = DomainCpu::new();
        cpu.set_model(Some("core2duo")).unwrap();
        cpu.set_match_mode(Some("exact")).unwrap();
        cpu.add_feature("pbe", "require").unwrap();
        cpu.add_feature("x2apic", "disable").unwrap();
        cpu.add_feature("pbe", "forbid").unwrap();
        assert!(cpu.add_feature("sse", "maybe").is_err());

        assert_eq!(
            cpu.features(),
            vec![
                CpuFeature { name: "pbe".into(), policy: "forbid".into() },
                CpuFeature { name: "x2apic".into(), policy: "disable".into() },
            ]
        );

        cpu.remove_feature("pbe");
        cpu.set_vendor(Some("Intel")).unwrap();
        assert_eq!(
            cpu.to_xml(),
            "<cpu match=\"exact\">\n    <model>core2duo</model>\n    <vendor>Intel</vendor>\n    <feature policy=\"disable\" name=\"x2apic\"/>\n  </cpu>"
        );
    }
}
