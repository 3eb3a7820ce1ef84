//! Hypervisor features: `<acpi/>`, `<apic/>`, `<pae/>`.
//!
//! Each flag is tri-state. `None` means "default" and is resolved by the
//! default passes; `Some(false)` keeps the flag off for good.

use crate::binding::{xml_accessors, XmlProperty};

use super::subobject_builder;

const ORDER: &[&str] = &["./acpi", "./apic", "./pae"];

const ACPI: XmlProperty<DomainFeatures> = XmlProperty::new("acpi", "./acpi")
    .boolean()
    .with_default_name("default");
const APIC: XmlProperty<DomainFeatures> = XmlProperty::new("apic", "./apic")
    .boolean()
    .with_default_name("default");
const PAE: XmlProperty<DomainFeatures> = XmlProperty::new("pae", "./pae")
    .boolean()
    .with_default_name("default");

/// `<features>` element of a domain.
#[derive(Debug, Clone)]
pub struct DomainFeatures {
    state: crate::binding::XmlState,
}

subobject_builder!(DomainFeatures, "features", ORDER, [ACPI, APIC, PAE]);

impl DomainFeatures {
    xml_accessors! {
        tristate acpi, set_acpi => ACPI;
        tristate apic, set_apic => APIC;
        tristate pae, set_pae => PAE;
    }
}
