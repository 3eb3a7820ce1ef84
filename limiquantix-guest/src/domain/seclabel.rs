//! `<seclabel>`: security driver labelling.

use crate::binding::{xml_accessors, XmlProperty};

use super::subobject_builder;

const ORDER: &[&str] = &["./@type", "./@model", "./@relabel", "./label", "./imagelabel"];

const TYPE: XmlProperty<DomainSeclabel> = XmlProperty::new("type", "./@type");
const MODEL: XmlProperty<DomainSeclabel> = XmlProperty::new("model", "./@model");
const RELABEL: XmlProperty<DomainSeclabel> = XmlProperty::new("relabel", "./@relabel").yesno();
const LABEL: XmlProperty<DomainSeclabel> = XmlProperty::new("label", "./label");
const IMAGELABEL: XmlProperty<DomainSeclabel> = XmlProperty::new("imagelabel", "./imagelabel");

#[derive(Debug, Clone)]
pub struct DomainSeclabel {
    state: crate::binding::XmlState,
}

subobject_builder!(DomainSeclabel, "seclabel", ORDER, [TYPE, MODEL, RELABEL, LABEL, IMAGELABEL]);

impl DomainSeclabel {
    pub const TYPE_DYNAMIC: &'static str = "dynamic";
    pub const TYPE_STATIC: &'static str = "static";

    pub const MODEL_SELINUX: &'static str = "selinux";
    pub const MODEL_APPARMOR: &'static str = "apparmor";

    xml_accessors! {
        str seclabel_type, set_seclabel_type => TYPE;
        str model, set_model => MODEL;
        flag relabel, set_relabel => RELABEL;
        str label, set_label => LABEL;
        /// Label applied to disk images.
        str imagelabel, set_imagelabel => IMAGELABEL;
    }
}
