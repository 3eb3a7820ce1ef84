//! Ordered XML element tree backing every domain document.
//!
//! Libvirt documents are edited in place rather than regenerated, so the tree
//! keeps whitespace text, comments and attribute order exactly as parsed. An
//! unmodified document serializes back to the same bytes, except that every
//! attribute is written with double quotes.
//!
//! Locations inside the tree are addressed with a small XPath subset:
//!
//! ```text
//! ./vcpu/@current                  attribute of a child element
//! ./devices/disk[2]                second <disk> child (1-based)
//! ./source[@mode='bind']/@host     child selected by an attribute value
//! ```

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{GuestError, Result};

// =============================================================================
// TREE
// =============================================================================

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
    ProcessingInstruction(String),
}

impl Node {
    fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.trim().is_empty())
    }
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a document and return its root element.
    ///
    /// The XML declaration, doctype and anything outside the root element are
    /// discarded.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                GuestError::Xml(format!(
                    "parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let el = element_from_start(&start)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| GuestError::Xml("unexpected closing tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| GuestError::Xml(format!("bad text content: {}", e)))?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        let comment = String::from_utf8_lossy(&comment).into_owned();
                        parent.children.push(Node::Comment(comment));
                    }
                }
                Event::PI(pi) => {
                    if let Some(parent) = stack.last_mut() {
                        let pi = String::from_utf8_lossy(&pi).into_owned();
                        parent.children.push(Node::ProcessingInstruction(pi));
                    }
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(GuestError::Xml(format!("element <{}> is never closed", open.name)));
        }
        root.ok_or_else(|| GuestError::Xml("document has no root element".to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing it in place or appending it.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.set_attribute_ordered(name, value, &[]);
    }

    /// Set an attribute; a new attribute is placed before the first existing
    /// attribute named in `later`.
    pub fn set_attribute_ordered(&mut self, name: &str, value: &str, later: &[String]) {
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value.to_string();
            return;
        }
        let pos = self
            .attributes
            .iter()
            .position(|(k, _)| later.iter().any(|l| l == k))
            .unwrap_or(self.attributes.len());
        self.attributes.insert(pos, (name.to_string(), value.to_string()));
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First child element with the given name.
    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    /// Concatenated text content of the element's direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// True when the element carries no attributes and no content other than
    /// whitespace.
    pub fn is_blank(&self) -> bool {
        self.attributes.is_empty() && self.children.iter().all(Node::is_whitespace)
    }

    fn has_element_children(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Element(_)))
    }

    // =========================================================================
    // Child placement
    // =========================================================================

    /// Insert a child element, keeping the surrounding indentation intact.
    ///
    /// The child goes before the first existing element whose name is in
    /// `later`, or after the last element otherwise. `depth` is the nesting
    /// depth of `self` within the document and drives the indentation of a
    /// first child. Returns the index of the inserted node.
    pub fn insert_child(&mut self, child: Element, later: &[String], depth: usize) -> usize {
        let child_indent = format!("\n{}", "  ".repeat(depth + 1));

        if !self.has_element_children() && self.children.iter().all(Node::is_whitespace) {
            let closing = format!("\n{}", "  ".repeat(depth));
            self.children = vec![
                Node::Text(child_indent),
                Node::Element(child),
                Node::Text(closing),
            ];
            return 1;
        }

        let before = self.children.iter().position(|node| {
            node.as_element()
                .map(|el| later.iter().any(|l| *l == el.name))
                .unwrap_or(false)
        });

        match before {
            Some(idx) => {
                let indent = match idx.checked_sub(1).map(|i| &self.children[i]) {
                    Some(Node::Text(t)) if t.trim().is_empty() => t.clone(),
                    _ => child_indent,
                };
                self.children.insert(idx, Node::Element(child));
                self.children.insert(idx + 1, Node::Text(indent));
                idx
            }
            None => {
                let indent = self.sibling_indent().unwrap_or(child_indent);
                let end = match self.children.last() {
                    Some(node) if node.is_whitespace() => self.children.len() - 1,
                    _ => self.children.len(),
                };
                self.children.insert(end, Node::Text(indent));
                self.children.insert(end + 1, Node::Element(child));
                end + 1
            }
        }
    }

    /// Whitespace preceding the last child element, if any.
    fn sibling_indent(&self) -> Option<String> {
        let last = self.children.iter().rposition(|n| matches!(n, Node::Element(_)))?;
        match last.checked_sub(1).map(|i| &self.children[i]) {
            Some(Node::Text(t)) if t.trim().is_empty() => Some(t.clone()),
            _ => None,
        }
    }

    /// Remove the child node at `index` together with its leading whitespace.
    pub fn remove_child_at(&mut self, index: usize) -> Option<Node> {
        if index >= self.children.len() {
            return None;
        }
        let node = self.children.remove(index);
        if index > 0 && self.children[index - 1].is_whitespace() {
            self.children.remove(index - 1);
        }
        if !self.has_element_children() && self.children.iter().all(Node::is_whitespace) {
            self.children.clear();
        }
        Some(node)
    }

    /// Replace, insert or remove the first child element called `name`.
    ///
    /// An existing child keeps its position. A new child is placed according
    /// to `hint`. Passing `None` removes the existing child.
    pub fn place_child(&mut self, name: &str, child: Option<Element>, hint: &OrderHint<'_>) {
        let existing = self
            .children
            .iter()
            .position(|n| n.as_element().map(|el| el.name == name).unwrap_or(false));

        match (existing, child) {
            (Some(idx), Some(child)) => self.children[idx] = Node::Element(child),
            (Some(idx), None) => {
                self.remove_child_at(idx);
            }
            (None, Some(child)) => {
                let later = hint.later_names(&[], false);
                self.insert_child(child, &later, hint.depth);
            }
            (None, None) => {}
        }
    }

    /// Add a child element placed according to `hint`, after any existing
    /// siblings of the same rank.
    pub fn append_child(&mut self, child: Element, hint: &OrderHint<'_>) {
        let later = hint.later_names(&[], false);
        self.insert_child(child, &later, hint.depth);
    }

    /// Remove every child element whose name satisfies `pred`, returning them
    /// in document order.
    pub fn take_children_where<F>(&mut self, mut pred: F) -> Vec<Element>
    where
        F: FnMut(&Element) -> bool,
    {
        let mut taken = Vec::new();
        while let Some(pos) = self
            .children
            .iter()
            .position(|n| n.as_element().map(|el| pred(el)).unwrap_or(false))
        {
            if let Some(Node::Element(el)) = self.remove_child_at(pos) {
                taken.push(el);
            }
        }
        taken
    }

    /// Append child elements after the first child named `after`, or at the
    /// start when there is no such child.
    pub fn insert_children_after(&mut self, after: &str, children: Vec<Element>, depth: usize) {
        if children.is_empty() {
            return;
        }
        let child_indent = format!("\n{}", "  ".repeat(depth + 1));

        if !self.has_element_children() && self.children.iter().all(Node::is_whitespace) {
            self.children.clear();
            for child in children {
                self.children.push(Node::Text(child_indent.clone()));
                self.children.push(Node::Element(child));
            }
            self.children.push(Node::Text(format!("\n{}", "  ".repeat(depth))));
            return;
        }

        let anchor = self
            .children
            .iter()
            .position(|n| n.as_element().map(|el| el.name == after).unwrap_or(false));
        let indent = self.sibling_indent().unwrap_or(child_indent);

        let mut nodes = Vec::with_capacity(children.len() * 2);
        let mut pos = match anchor {
            Some(idx) => idx + 1,
            None => {
                // Before the first element, reusing its leading whitespace.
                match self.children.iter().position(|n| matches!(n, Node::Element(_))) {
                    Some(first) if first > 0 && self.children[first - 1].is_whitespace() => {
                        first - 1
                    }
                    Some(first) => first,
                    None => self.children.len(),
                }
            }
        };
        for child in children {
            nodes.push(Node::Text(indent.clone()));
            nodes.push(Node::Element(child));
        }
        for node in nodes {
            self.children.insert(pos, node);
            pos += 1;
        }
    }

    // =========================================================================
    // Path access
    // =========================================================================

    fn child_position(&self, step: &ChildStep) -> Option<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_element().map(|el| step.matches(el)).unwrap_or(false))
            .nth(step.index.saturating_sub(1))
            .map(|(i, _)| i)
    }

    /// Find the element addressed by the element steps of `path`.
    pub fn find(&self, path: &XmlPath) -> Option<&Element> {
        let mut cur = self;
        for step in &path.steps {
            let pos = cur.child_position(step)?;
            cur = cur.children[pos].as_element()?;
        }
        Some(cur)
    }

    fn find_mut(&mut self, path: &XmlPath) -> Option<&mut Element> {
        let mut cur = self;
        for step in &path.steps {
            let pos = cur.child_position(step)?;
            cur = cur.children[pos].as_element_mut()?;
        }
        Some(cur)
    }

    /// Read the value at `path`: an attribute value, or element text.
    pub fn value(&self, path: &XmlPath) -> Option<String> {
        let el = self.find(path)?;
        match &path.attribute {
            Some(attr) => el.attribute(attr).map(str::to_string),
            None => Some(el.text()),
        }
    }

    /// True when the node addressed by `path` is present.
    pub fn exists(&self, path: &XmlPath) -> bool {
        match (self.find(path), &path.attribute) {
            (Some(el), Some(attr)) => el.attribute(attr).is_some(),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Write `value` at `path`, creating missing elements.
    ///
    /// With `value` of `None` only the addressed element is created, which is
    /// how presence-style booleans are stored.
    pub fn set_value(&mut self, path: &XmlPath, value: Option<&str>, hint: &OrderHint<'_>) -> Result<()> {
        let mut cur = self;
        for (depth, step) in path.steps.iter().enumerate() {
            let pos = match cur.child_position(step) {
                Some(pos) => pos,
                None => {
                    let mut child = Element::new(step.name.clone());
                    if let Some((attr, val)) = &step.predicate {
                        child.set_attribute(attr, val);
                    }
                    let later = hint.later_names(&path.steps[..depth], false);
                    cur.insert_child(child, &later, hint.depth + depth)
                }
            };
            cur = cur.children[pos].as_element_mut().ok_or_else(|| {
                GuestError::Internal(format!("path step {} is not an element", step.name))
            })?;
        }

        match (&path.attribute, value) {
            (Some(attr), Some(value)) => {
                let later = hint.later_names(&path.steps, true);
                cur.set_attribute_ordered(attr, value, &later);
            }
            (Some(attr), None) => {
                return Err(GuestError::Internal(format!("no value given for attribute {}", attr)));
            }
            (None, Some(value)) => cur.set_text(value),
            (None, None) => {}
        }
        Ok(())
    }

    /// Remove the node at `path`, pruning parent elements left blank.
    ///
    /// `self` is never removed. Returns whether anything was removed.
    pub fn remove_path(&mut self, path: &XmlPath) -> bool {
        remove_steps(self, &path.steps, path.attribute.as_deref())
    }

    /// Remove every attribute and child.
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.children.clear();
    }

    /// Mutable access to a descendant element.
    pub fn element_mut(&mut self, path: &XmlPath) -> Option<&mut Element> {
        self.find_mut(path)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the element and its subtree.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }
}

fn remove_steps(el: &mut Element, steps: &[ChildStep], attribute: Option<&str>) -> bool {
    let Some((step, rest)) = steps.split_first() else {
        return attribute.map(|a| el.remove_attribute(a).is_some()).unwrap_or(false);
    };
    let Some(pos) = el.child_position(step) else {
        return false;
    };
    if rest.is_empty() && attribute.is_none() {
        el.remove_child_at(pos);
        return true;
    }

    let (removed, blank) = match el.children[pos].as_element_mut() {
        Some(child) => {
            let removed = remove_steps(child, rest, attribute);
            (removed, child.is_blank())
        }
        None => (false, false),
    };
    if removed && blank {
        el.remove_child_at(pos);
    }
    removed
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| GuestError::Xml(format!("bad attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| GuestError::Xml(format!("bad attribute value for {}: {}", key, e)))?;
        el.attributes.push((key, value.into_owned()));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(GuestError::Xml(format!(
            "unexpected second root element <{}>",
            el.name
        )));
    }
    *root = Some(el);
    Ok(())
}

fn escape_attribute(value: &str) -> String {
    partial_escape(value)
        .replace('"', "&quot;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

fn write_element(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(out, e),
            Node::Text(t) => out.push_str(&partial_escape(t)),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::CData(c) => {
                out.push_str("<![CDATA[");
                out.push_str(c);
                out.push_str("]]>");
            }
            Node::ProcessingInstruction(p) => {
                out.push_str("<?");
                out.push_str(p);
                out.push_str("?>");
            }
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

// =============================================================================
// PATHS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChildStep {
    name: String,
    index: usize,
    predicate: Option<(String, String)>,
}

impl ChildStep {
    fn matches(&self, el: &Element) -> bool {
        if el.name != self.name {
            return false;
        }
        match &self.predicate {
            Some((attr, value)) => el.attribute(attr) == Some(value.as_str()),
            None => true,
        }
    }
}

/// A parsed location such as `./target/@bus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPath {
    steps: Vec<ChildStep>,
    attribute: Option<String>,
}

impl XmlPath {
    /// Parse a path. Unparseable indexes fall back to the first match.
    pub fn parse(path: &str) -> Self {
        let mut steps = Vec::new();
        let mut attribute = None;

        for part in path.split('/') {
            if part.is_empty() || part == "." {
                continue;
            }
            if let Some(attr) = part.strip_prefix('@') {
                attribute = Some(attr.to_string());
                continue;
            }

            let (name, filter) = match part.find('[') {
                Some(i) => (&part[..i], part[i + 1..].strip_suffix(']')),
                None => (part, None),
            };
            let mut step = ChildStep {
                name: name.to_string(),
                index: 1,
                predicate: None,
            };
            match filter {
                Some(f) if f.starts_with('@') => {
                    if let Some((attr, value)) = f[1..].split_once('=') {
                        let value = value.trim_matches(|c| c == '\'' || c == '"');
                        step.predicate = Some((attr.to_string(), value.to_string()));
                    }
                }
                Some(f) => step.index = f.parse().unwrap_or(1),
                None => {}
            }
            steps.push(step);
        }

        Self { steps, attribute }
    }

    /// The trailing attribute name, if the path addresses an attribute.
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }
}

/// Where new nodes go when a path is created.
///
/// `order` lists the paths an owning type declares, in document order; `rank`
/// is the position of the path currently being written. New siblings are
/// placed before anything declared after that rank.
#[derive(Debug, Clone, Copy)]
pub struct OrderHint<'a> {
    order: &'a [&'a str],
    rank: Option<usize>,
    depth: usize,
}

impl<'a> OrderHint<'a> {
    /// Hint for writing `xpath` within an object rooted at `depth`.
    pub fn new(order: &'a [&'a str], xpath: &str, depth: usize) -> Self {
        Self {
            order,
            rank: rank_of(order, xpath),
            depth,
        }
    }

    /// Hint that always appends.
    pub fn append(depth: usize) -> Self {
        Self {
            order: &[],
            rank: None,
            depth,
        }
    }

    fn later_names(&self, prefix: &[ChildStep], attributes: bool) -> Vec<String> {
        let Some(rank) = self.rank else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for entry in self.order.iter().skip(rank + 1) {
            let path = XmlPath::parse(entry);
            if path.steps.len() < prefix.len()
                || !path.step_names().zip(prefix.iter()).all(|(a, b)| a == b.name)
            {
                continue;
            }
            let name = if attributes {
                if path.steps.len() != prefix.len() {
                    continue;
                }
                path.attribute.clone()
            } else {
                path.steps.get(prefix.len()).map(|s| s.name.clone())
            };
            if let Some(name) = name {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Position of `xpath` in `order`: an exact entry, or the entry for the
/// element that contains it.
fn rank_of(order: &[&str], xpath: &str) -> Option<usize> {
    order.iter().position(|e| *e == xpath).or_else(|| {
        order.iter().position(|e| {
            xpath
                .strip_prefix(e)
                .map(|rest| rest.starts_with('/') || rest.starts_with('['))
                .unwrap_or(false)
        })
    })
}
