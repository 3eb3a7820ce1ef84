//! Single-instance sub-objects of a domain: `<os>`, `<features>`,
//! `<clock>`, `<cpu>`, `<seclabel>` and `<numatune>`.
//!
//! Each owns its element and is placed back into the domain document by the
//! guest on serialization. A sub-object with nothing set is left out.

mod clock;
mod cpu;
mod features;
mod numatune;
mod os;
mod seclabel;

pub use clock::DomainClock;
pub use cpu::{CpuFeature, DomainCpu};
pub use features::DomainFeatures;
pub use numatune::DomainNumatune;
pub use os::DomainOs;
pub use seclabel::DomainSeclabel;

/// Sub-objects live at `/domain/<name>`.
pub(crate) const SUBOBJECT_DEPTH: usize = 1;

/// Implements [`XmlBuilder`](crate::binding::XmlBuilder) plus the `new` and
/// `parsed` constructors for a struct with a `state: XmlState` field.
macro_rules! subobject_builder {
    ($ty:ident, $tag:literal, $order:ident, [$($prop:ident),* $(,)?]) => {
        impl $crate::binding::XmlBuilder for $ty {
            const PROPERTIES: &'static [&'static $crate::binding::XmlProperty<Self>] = &[$(&$prop),*];

            fn xml_state(&self) -> &$crate::binding::XmlState {
                &self.state
            }

            fn xml_state_mut(&mut self) -> &mut $crate::binding::XmlState {
                &mut self.state
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $ty {
            pub const TAG: &'static str = $tag;

            pub fn new() -> Self {
                Self {
                    state: $crate::binding::XmlState::new(
                        $tag,
                        $crate::domain::SUBOBJECT_DEPTH,
                        $order,
                    ),
                }
            }

            pub(crate) fn parsed(el: $crate::xml::Element) -> Self {
                Self {
                    state: $crate::binding::XmlState::parsed(
                        el,
                        $crate::domain::SUBOBJECT_DEPTH,
                        $order,
                    ),
                }
            }
        }
    };
}
pub(crate) use subobject_builder;
