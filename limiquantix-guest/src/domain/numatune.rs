//! `<numatune>`: host NUMA memory placement.

use crate::binding::{xml_accessors, PropValue, XmlProperty};
use crate::error::Result;
use crate::validate::validate_cpuset;

use super::subobject_builder;

const ORDER: &[&str] = &["./memory/@mode", "./memory/@nodeset"];

fn validate_nodeset(_: &DomainNumatune, value: &PropValue) -> Result<()> {
    validate_cpuset(&value.to_string())
}

const MEMORY_MODE: XmlProperty<DomainNumatune> = XmlProperty::new("memory_mode", "./memory/@mode");
const MEMORY_NODESET: XmlProperty<DomainNumatune> =
    XmlProperty::new("memory_nodeset", "./memory/@nodeset").with_validator(validate_nodeset);

#[derive(Debug, Clone)]
pub struct DomainNumatune {
    state: crate::binding::XmlState,
}

subobject_builder!(DomainNumatune, "numatune", ORDER, [MEMORY_MODE, MEMORY_NODESET]);

impl DomainNumatune {
    pub const MODES: &'static [&'static str] = &["interleave", "strict", "preferred"];

    xml_accessors! {
        str memory_mode, set_memory_mode => MEMORY_MODE;
        /// Host NUMA nodes, in cpuset syntax.
        str memory_nodeset, set_memory_nodeset => MEMORY_NODESET;
    }
}
