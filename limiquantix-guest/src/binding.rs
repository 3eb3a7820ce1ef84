//! Typed property bindings over the element tree.
//!
//! Every configurable object (guest, OS block, device, address, ...) owns an
//! [`XmlState`]: the element its properties live in plus a little
//! bookkeeping. Each object type declares its properties once, as `const`
//! [`XmlProperty`] items, and reaches them through the [`XmlBuilder`] trait.
//!
//! ## Read rules
//!
//! 1. A value present in the document is decoded and returned.
//! 2. A property explicitly cleared with `None` reads as unset.
//! 3. A property with a placeholder name (usually `"default"`) reads as the
//!    placeholder, so default passes can recognise it.
//! 4. Otherwise the default function runs. Its result is not written back.
//!
//! ## Write rules
//!
//! Validation runs first and a failure leaves the object untouched. The set
//! hook may then adjust the value or update coupled properties. Missing
//! elements are created in the owning type's declared order, so the output
//! does not depend on the order properties were set in.
//!
//! Objects built from scratch get their defaults written out on
//! serialization; parsed objects never do, which keeps round-trips exact.

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

use crate::error::Result;
use crate::xml::{Element, OrderHint, XmlPath};

/// How a property's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    /// Plain text.
    Str,
    /// Integer; `0x` prefixed hex is accepted on read.
    Int,
    /// Presence of the node means `true`.
    Bool,
    /// `yes` / `no` text.
    YesNo,
    /// `on` / `off` text.
    OnOff,
}

impl PropKind {
    fn decode(self, raw: &str) -> PropValue {
        match self {
            PropKind::Int => parse_int(raw)
                .map(PropValue::Int)
                .unwrap_or_else(|| PropValue::Str(raw.to_string())),
            PropKind::YesNo => match raw {
                "yes" => PropValue::Bool(true),
                "no" => PropValue::Bool(false),
                other => PropValue::Str(other.to_string()),
            },
            PropKind::OnOff => match raw {
                "on" => PropValue::Bool(true),
                "off" => PropValue::Bool(false),
                other => PropValue::Str(other.to_string()),
            },
            PropKind::Str | PropKind::Bool => PropValue::Str(raw.to_string()),
        }
    }

    fn encode(self, value: &PropValue) -> String {
        match (self, value) {
            (PropKind::YesNo, PropValue::Bool(b)) => if *b { "yes" } else { "no" }.to_string(),
            (PropKind::OnOff, PropValue::Bool(b)) => if *b { "on" } else { "off" }.to_string(),
            (_, value) => value.to_string(),
        }
    }
}

/// Parse an integer the way libvirt writes them (decimal or `0x` hex).
pub fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => f.write_str(s),
            PropValue::Int(i) => write!(f, "{}", i),
            PropValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<i64> for PropValue {
    fn from(i: i64) -> Self {
        PropValue::Int(i)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

pub type DefaultFn<T> = fn(&T) -> Option<PropValue>;
pub type ValidateFn<T> = fn(&T, &PropValue) -> Result<()>;
pub type SetHookFn<T> = fn(&mut T, Option<PropValue>) -> Result<Option<PropValue>>;

/// Declaration of one property of `T`.
pub struct XmlProperty<T: 'static> {
    pub name: &'static str,
    pub xpath: &'static str,
    pub kind: PropKind,
    pub default: Option<DefaultFn<T>>,
    pub default_name: Option<&'static str>,
    pub validate: Option<ValidateFn<T>>,
    pub set_hook: Option<SetHookFn<T>>,
}

impl<T: 'static> XmlProperty<T> {
    pub const fn new(name: &'static str, xpath: &'static str) -> Self {
        Self {
            name,
            xpath,
            kind: PropKind::Str,
            default: None,
            default_name: None,
            validate: None,
            set_hook: None,
        }
    }

    pub const fn int(self) -> Self {
        Self { kind: PropKind::Int, ..self }
    }

    pub const fn boolean(self) -> Self {
        Self { kind: PropKind::Bool, ..self }
    }

    pub const fn yesno(self) -> Self {
        Self { kind: PropKind::YesNo, ..self }
    }

    pub const fn onoff(self) -> Self {
        Self { kind: PropKind::OnOff, ..self }
    }

    pub const fn with_default(self, f: DefaultFn<T>) -> Self {
        Self { default: Some(f), ..self }
    }

    pub const fn with_default_name(self, name: &'static str) -> Self {
        Self { default_name: Some(name), ..self }
    }

    pub const fn with_validator(self, f: ValidateFn<T>) -> Self {
        Self { validate: Some(f), ..self }
    }

    pub const fn with_set_hook(self, f: SetHookFn<T>) -> Self {
        Self { set_hook: Some(f), ..self }
    }
}

/// The element an object's properties live in.
#[derive(Debug, Clone)]
pub struct XmlState {
    element: Element,
    depth: usize,
    is_build: bool,
    order: &'static [&'static str],
    unset: BTreeSet<&'static str>,
}

impl XmlState {
    /// State for an object built from scratch, rooted at a `<root/>` element
    /// `depth` levels below the document root.
    pub fn new(root: &str, depth: usize, order: &'static [&'static str]) -> Self {
        Self {
            element: Element::new(root),
            depth,
            is_build: true,
            order,
            unset: BTreeSet::new(),
        }
    }

    /// State wrapping an element taken from a parsed document.
    pub fn parsed(element: Element, depth: usize, order: &'static [&'static str]) -> Self {
        Self {
            element,
            depth,
            is_build: false,
            order,
            unset: BTreeSet::new(),
        }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub(crate) fn element_mut(&mut self) -> &mut Element {
        &mut self.element
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_build(&self) -> bool {
        self.is_build
    }

    /// True when nothing has been set.
    pub fn is_empty(&self) -> bool {
        self.element.is_blank()
    }

    /// Placement hint for writing `xpath` inside this object.
    pub fn hint(&self, xpath: &str) -> OrderHint<'static> {
        OrderHint::new(self.order, xpath, self.depth)
    }

    /// Remove everything and forget explicit unsets.
    pub fn clear(&mut self) {
        self.element.clear();
        self.unset.clear();
    }

    /// Place a rendered child object into `rendered` (a render of this
    /// object's element), omitting it when blank.
    pub fn attach_child(&self, rendered: &mut Element, name: &str, child: Element) {
        let hint = self.hint(&format!("./{}", name));
        let child = if child.is_blank() { None } else { Some(child) };
        rendered.place_child(name, child, &hint);
    }
}

/// Generic property access for every configurable object.
pub trait XmlBuilder: Sized + 'static {
    /// Properties in declaration order.
    const PROPERTIES: &'static [&'static XmlProperty<Self>];

    fn xml_state(&self) -> &XmlState;
    fn xml_state_mut(&mut self) -> &mut XmlState;

    fn get_value(&self, prop: &XmlProperty<Self>) -> Option<PropValue> {
        let state = self.xml_state();
        let path = XmlPath::parse(prop.xpath);
        match prop.kind {
            PropKind::Bool => {
                if state.element.exists(&path) {
                    return Some(PropValue::Bool(true));
                }
            }
            kind => {
                if let Some(raw) = state.element.value(&path) {
                    return Some(kind.decode(&raw));
                }
            }
        }

        if state.unset.contains(prop.name) {
            return match prop.kind {
                PropKind::Bool => Some(PropValue::Bool(false)),
                _ => None,
            };
        }
        if let Some(name) = prop.default_name {
            return Some(PropValue::Str(name.to_string()));
        }
        prop.default.and_then(|f| f(self))
    }

    fn set_value(&mut self, prop: &XmlProperty<Self>, value: Option<PropValue>) -> Result<()> {
        if let (Some(name), Some(PropValue::Str(s))) = (prop.default_name, value.as_ref()) {
            if s == name {
                let state = self.xml_state_mut();
                state.element.remove_path(&XmlPath::parse(prop.xpath));
                state.unset.remove(prop.name);
                return Ok(());
            }
        }

        if let (Some(validate), Some(v)) = (prop.validate, value.as_ref()) {
            validate(self, v)?;
        }
        let value = match prop.set_hook {
            Some(hook) => hook(self, value)?,
            None => value,
        };

        let state = self.xml_state_mut();
        let path = XmlPath::parse(prop.xpath);
        let hint = state.hint(prop.xpath);
        match (prop.kind, value) {
            (_, None) | (PropKind::Bool, Some(PropValue::Bool(false))) => {
                state.element.remove_path(&path);
                state.unset.insert(prop.name);
            }
            (PropKind::Bool, Some(_)) => {
                state.unset.remove(prop.name);
                state.element.set_value(&path, None, &hint)?;
            }
            (kind, Some(v)) => {
                state.unset.remove(prop.name);
                state.element.set_value(&path, Some(&kind.encode(&v)), &hint)?;
            }
        }
        Ok(())
    }

    /// True when the document holds a value for `prop`.
    fn is_set(&self, prop: &XmlProperty<Self>) -> bool {
        self.xml_state().element.exists(&XmlPath::parse(prop.xpath))
    }

    /// True when `prop` reads as its placeholder name.
    fn is_default(&self, prop: &XmlProperty<Self>) -> bool {
        match (prop.default_name, self.get_value(prop)) {
            (Some(name), Some(PropValue::Str(s))) => s == name,
            _ => false,
        }
    }

    fn get_str(&self, prop: &XmlProperty<Self>) -> Option<String> {
        self.get_value(prop).map(|v| v.to_string())
    }

    fn get_int(&self, prop: &XmlProperty<Self>) -> Option<i64> {
        self.get_value(prop).and_then(|v| v.as_int())
    }

    fn get_bool(&self, prop: &XmlProperty<Self>) -> Option<bool> {
        self.get_value(prop).and_then(|v| v.as_bool())
    }

    fn set_str(&mut self, prop: &XmlProperty<Self>, value: Option<&str>) -> Result<()> {
        self.set_value(prop, value.map(PropValue::from))
    }

    fn set_int(&mut self, prop: &XmlProperty<Self>, value: Option<i64>) -> Result<()> {
        self.set_value(prop, value.map(PropValue::Int))
    }

    fn set_bool(&mut self, prop: &XmlProperty<Self>, value: Option<bool>) -> Result<()> {
        self.set_value(prop, value.map(PropValue::Bool))
    }

    /// The element as it should appear in a document.
    fn render(&self) -> Element {
        render_state(self)
    }

    /// Serialized element, or an empty string when nothing is set.
    fn to_xml(&self) -> String {
        let el = self.render();
        if el.is_blank() {
            String::new()
        } else {
            el.to_xml_string()
        }
    }
}

/// Clone the object's element, filling in defaults for built objects.
pub fn render_state<T: XmlBuilder>(obj: &T) -> Element {
    let state = obj.xml_state();
    let mut el = state.element.clone();
    if !state.is_build {
        return el;
    }

    for prop in T::PROPERTIES {
        let path = XmlPath::parse(prop.xpath);
        if state.unset.contains(prop.name) || el.exists(&path) {
            continue;
        }
        let Some(value) = prop.default.and_then(|f| f(obj)) else {
            continue;
        };
        let hint = state.hint(prop.xpath);
        let written = match (prop.kind, &value) {
            (PropKind::Bool, PropValue::Bool(false)) => Ok(()),
            (PropKind::Bool, _) => el.set_value(&path, None, &hint),
            (kind, v) => el.set_value(&path, Some(&kind.encode(v)), &hint),
        };
        if let Err(e) = written {
            warn!(property = prop.name, error = %e, "Failed to write default value");
        }
    }
    el
}

/// Generates typed getter/setter pairs for properties.
///
/// Arms: `str`, `int`, `bool` (presence), `flag` (yes/no or on/off, `None`
/// when unset) and `tristate` (placeholder-backed boolean, `None` meaning
/// "default").
macro_rules! xml_accessors {
    () => {};
    ($(#[$meta:meta])* str $get:ident, $set:ident => $prop:path; $($rest:tt)*) => {
        $(#[$meta])*
        pub fn $get(&self) -> Option<String> {
            $crate::binding::XmlBuilder::get_str(self, &$prop)
        }
        pub fn $set(&mut self, value: Option<&str>) -> $crate::error::Result<()> {
            $crate::binding::XmlBuilder::set_str(self, &$prop, value)
        }
        $crate::binding::xml_accessors!($($rest)*);
    };
    ($(#[$meta:meta])* int $get:ident, $set:ident => $prop:path; $($rest:tt)*) => {
        $(#[$meta])*
        pub fn $get(&self) -> Option<i64> {
            $crate::binding::XmlBuilder::get_int(self, &$prop)
        }
        pub fn $set(&mut self, value: Option<i64>) -> $crate::error::Result<()> {
            $crate::binding::XmlBuilder::set_int(self, &$prop, value)
        }
        $crate::binding::xml_accessors!($($rest)*);
    };
    ($(#[$meta:meta])* bool $get:ident, $set:ident => $prop:path; $($rest:tt)*) => {
        $(#[$meta])*
        pub fn $get(&self) -> bool {
            $crate::binding::XmlBuilder::get_bool(self, &$prop).unwrap_or(false)
        }
        pub fn $set(&mut self, value: bool) -> $crate::error::Result<()> {
            $crate::binding::XmlBuilder::set_bool(self, &$prop, Some(value))
        }
        $crate::binding::xml_accessors!($($rest)*);
    };
    ($(#[$meta:meta])* flag $get:ident, $set:ident => $prop:path; $($rest:tt)*) => {
        $(#[$meta])*
        pub fn $get(&self) -> Option<bool> {
            $crate::binding::XmlBuilder::get_bool(self, &$prop)
        }
        pub fn $set(&mut self, value: Option<bool>) -> $crate::error::Result<()> {
            $crate::binding::XmlBuilder::set_bool(self, &$prop, value)
        }
        $crate::binding::xml_accessors!($($rest)*);
    };
    ($(#[$meta:meta])* tristate $get:ident, $set:ident => $prop:path; $($rest:tt)*) => {
        $(#[$meta])*
        pub fn $get(&self) -> Option<bool> {
            $crate::binding::XmlBuilder::get_bool(self, &$prop)
        }
        pub fn $set(&mut self, value: Option<bool>) -> $crate::error::Result<()> {
            let value = match value {
                Some(b) => $crate::binding::PropValue::Bool(b),
                None => $crate::binding::PropValue::Str(
                    $prop.default_name.unwrap_or("default").to_string(),
                ),
            };
            $crate::binding::XmlBuilder::set_value(self, &$prop, Some(value))
        }
        $crate::binding::xml_accessors!($($rest)*);
    };
}
pub(crate) use xml_accessors;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuestError;

    #[derive(Debug, Clone)]
    struct Widget {
        state: XmlState,
    }

    const ORDER: &[&str] = &["./@type", "./@model", "./size", "./size/@unit", "./enabled", "./alias"];

    const TYPE: XmlProperty<Widget> = XmlProperty::new("type", "./@type").with_default(|_| Some("basic".into()));
    const MODEL: XmlProperty<Widget> = XmlProperty::new("model", "./@model")
        .with_default_name("default")
        .with_default(|_| Some("m1".into()));
    const SIZE: XmlProperty<Widget> = XmlProperty::new("size", "./size")
        .int()
        .with_validator(|_, v| match v.as_int() {
            Some(n) if n < 0 => Err(GuestError::Validation(format!("size {} is negative", n))),
            _ => Ok(()),
        });
    const UNIT: XmlProperty<Widget> = XmlProperty::new("unit", "./size/@unit");
    const ENABLED: XmlProperty<Widget> = XmlProperty::new("enabled", "./enabled").boolean();

    impl XmlBuilder for Widget {
        const PROPERTIES: &'static [&'static XmlProperty<Self>] = &[&TYPE, &MODEL, &SIZE, &UNIT, &ENABLED];

        fn xml_state(&self) -> &XmlState {
            &self.state
        }

        fn xml_state_mut(&mut self) -> &mut XmlState {
            &mut self.state
        }
    }

    impl Widget {
        fn new() -> Self {
            Self { state: XmlState::new("widget", 0, ORDER) }
        }

        xml_accessors! {
            str kind, set_kind => TYPE;
            str model, set_model => MODEL;
            int size, set_size => SIZE;
            str unit, set_unit => UNIT;
            bool enabled, set_enabled => ENABLED;
        }
    }

    #[test]
    fn test_defaults_are_computed_not_stored() {
        let w = Widget::new();
        assert_eq!(w.kind().as_deref(), Some("basic"));
        assert_eq!(w.model().as_deref(), Some("default"));
        assert!(w.xml_state().element().is_blank(), "reading must not write");
        assert_eq!(w.to_xml(), "<widget type=\"basic\" model=\"m1\"/>");
    }

    #[test]
    fn test_placeholder_resets_to_default() {
        let mut w = Widget::new();
        w.set_model(Some("m7")).unwrap();
        assert_eq!(w.model().as_deref(), Some("m7"));
        w.set_model(Some("default")).unwrap();
        assert_eq!(w.model().as_deref(), Some("default"));
        assert!(w.is_default(&MODEL));
    }

    #[test]
    fn test_explicit_unset_suppresses_default() {
        let mut w = Widget::new();
        w.set_kind(None).unwrap();
        assert_eq!(w.kind(), None);
        assert_eq!(w.to_xml(), "<widget model=\"m1\"/>");
    }

    #[test]
    fn test_int_roundtrip_and_hex() {
        let mut w = Widget::new();
        w.set_size(Some(512)).unwrap();
        assert_eq!(w.size(), Some(512));
        w.set_value(&SIZE, Some("0x10".into())).unwrap();
        assert_eq!(w.size(), Some(16));
    }

    #[test]
    fn test_validation_leaves_state_unchanged() {
        let mut w = Widget::new();
        w.set_size(Some(4)).unwrap();
        assert!(w.set_size(Some(-1)).is_err());
        assert_eq!(w.size(), Some(4));
    }

    #[test]
    fn test_order_independent_of_set_order() {
        let mut a = Widget::new();
        a.set_enabled(true).unwrap();
        a.set_unit(Some("KiB")).unwrap();
        a.set_size(Some(1)).unwrap();
        a.set_model(Some("x")).unwrap();

        let mut b = Widget::new();
        b.set_model(Some("x")).unwrap();
        b.set_size(Some(1)).unwrap();
        b.set_unit(Some("KiB")).unwrap();
        b.set_enabled(true).unwrap();

        assert_eq!(a.to_xml(), b.to_xml());
        assert_eq!(
            a.to_xml(),
            "<widget type=\"basic\" model=\"x\">\n  <size unit=\"KiB\">1</size>\n  <enabled/>\n</widget>"
        );
    }

    #[test]
    fn test_bool_presence() {
        let mut w = Widget::new();
        assert!(!w.enabled());
        w.set_enabled(true).unwrap();
        assert!(w.enabled());
        w.set_enabled(false).unwrap();
        assert!(!w.enabled());
        assert_eq!(w.get_bool(&ENABLED), Some(false));
    }

    #[test]
    fn test_parsed_objects_do_not_gain_defaults() {
        let el = Element::parse("<widget/>").unwrap();
        let w = Widget { state: XmlState::parsed(el, 0, ORDER) };
        assert_eq!(w.to_xml(), "");
        assert_eq!(w.kind().as_deref(), Some("basic"));
    }
}
