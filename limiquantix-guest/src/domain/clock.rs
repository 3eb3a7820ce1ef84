//! `<clock>`: how the guest clock relates to the host.

use crate::binding::{xml_accessors, XmlProperty};

use super::subobject_builder;

const ORDER: &[&str] = &["./@offset"];

const OFFSET: XmlProperty<DomainClock> = XmlProperty::new("offset", "./@offset");

#[derive(Debug, Clone)]
pub struct DomainClock {
    state: crate::binding::XmlState,
}

subobject_builder!(DomainClock, "clock", ORDER, [OFFSET]);

impl DomainClock {
    pub const OFFSET_UTC: &'static str = "utc";
    pub const OFFSET_LOCALTIME: &'static str = "localtime";

    xml_accessors! {
        str offset, set_offset => OFFSET;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::XmlBuilder;

    #[test]
    fn test_offset() {
        let mut clock = DomainClock::new();
        assert_eq!(clock.offset(), None);
        assert_eq!(clock.to_xml(), "");
        clock.set_offset(Some("localtime")).unwrap();
        assert_eq!(clock.to_xml(), "<clock offset=\"localtime\"/>");
    }
}
