//! Owned, order-preserving XML tree for editing package parts.
//!
//! Qualified names are kept verbatim (`w:p`, `w:t`, `r:id`) so a part
//! serialises back with the same prefixes and namespace declarations it was
//! read with. Text and attribute values are held unescaped. Comments,
//! processing instructions, CDATA sections and the XML declaration are kept
//! as raw markup and written back untouched.

use std::borrow::Cow;
use std::io::{self, Write};

use quick_xml::escape::{partial_escape, unescape};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{FillError, Result};

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Markup written back verbatim (comments, PIs, CDATA, declaration).
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A parsed part: whatever precedes the root, the root, whatever follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    pub epilog: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    /// Child elements, skipping text and raw nodes.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is(name))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(el) => el.collect_text(out),
                XmlNode::Raw(_) => {}
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Visit this element and every descendant element, depth first.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut XmlElement)) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    pub fn walk(&self, f: &mut dyn FnMut(&XmlElement)) {
        f(self);
        for child in self.elements() {
            child.walk(f);
        }
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }
        writer.write_event(Event::Start(start))?;
        for node in &self.children {
            node.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

impl XmlNode {
    fn write<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        match self {
            XmlNode::Element(el) => el.write(writer),
            // Only `<`, `>` and `&` are escaped in text, as Word writes it.
            XmlNode::Text(t) => {
                writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(t.as_str()))))
            }
            XmlNode::Raw(raw) => writer.get_mut().write_all(raw.as_bytes()),
        }
    }
}

impl XmlDocument {
    /// Parse a part. `part` is only used to label errors.
    pub fn parse(part: &str, xml: &str) -> Result<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        // Escaped text collected across Text/GeneralRef events.
        let mut pending = String::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader
                .read_event()
                .map_err(|e| FillError::xml(part, e))?;
            let after = reader.buffer_position() as usize;

            match &event {
                Event::Text(e) => {
                    let raw = std::str::from_utf8(e).map_err(|e| FillError::xml(part, e))?;
                    pending.push_str(raw);
                    continue;
                }
                Event::GeneralRef(e) => {
                    let name = std::str::from_utf8(e).map_err(|e| FillError::xml(part, e))?;
                    pending.push('&');
                    pending.push_str(name);
                    pending.push(';');
                    continue;
                }
                _ => {}
            }

            if !pending.is_empty() {
                let text = unescape(&pending)
                    .map_err(|e| FillError::xml(part, e))?
                    .into_owned();
                pending.clear();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Text(text)),
                    // Whitespace around the root is kept so prolog layout survives.
                    None if root.is_none() => prolog.push(XmlNode::Raw(text)),
                    None => {}
                }
            }

            match event {
                Event::Start(e) => stack.push(element_from_start(part, &e)?),
                Event::Empty(e) => {
                    let el = element_from_start(part, &e)?;
                    attach(part, el, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| FillError::xml(part, "unexpected closing tag"))?;
                    attach(part, el, &mut stack, &mut root)?;
                }
                Event::Eof => break,
                Event::Text(_) | Event::GeneralRef(_) => {}
                // Comments, CDATA, PIs, doctype and the declaration keep their source text.
                _ => {
                    let raw = xml.get(before..after).unwrap_or_default().to_string();
                    let node = XmlNode::Raw(raw);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => epilog.push(node),
                    }
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(FillError::xml(
                part,
                format!("element <{}> is never closed", open.name),
            ));
        }
        let root = root.ok_or_else(|| FillError::xml(part, "document has no root element"))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    pub fn parse_bytes(part: &str, bytes: &[u8]) -> Result<Self> {
        let xml = std::str::from_utf8(bytes).map_err(|e| FillError::xml(part, e))?;
        Self::parse(part, xml)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            node.write_verbatim(&mut writer)?;
        }
        self.root.write(&mut writer)?;
        for node in &self.epilog {
            node.write_verbatim(&mut writer)?;
        }
        Ok(writer.into_inner())
    }

    pub fn to_xml(&self) -> Result<String> {
        let bytes = self.to_bytes()?;
        String::from_utf8(bytes).map_err(|e| FillError::xml(&self.root.name, e))
    }
}

impl XmlNode {
    fn write_verbatim<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        match self {
            XmlNode::Raw(raw) | XmlNode::Text(raw) => writer.get_mut().write_all(raw.as_bytes()),
            XmlNode::Element(el) => el.write(writer),
        }
    }
}

fn element_from_start(part: &str, start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| FillError::xml(part, e))?
        .to_string();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FillError::xml(part, e))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| FillError::xml(part, e))?;
        let raw = std::str::from_utf8(&attr.value).map_err(|e| FillError::xml(part, e))?;
        let value: Cow<'_, str> = unescape(raw).map_err(|e| FillError::xml(part, e))?;
        el.attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(el)
}

fn attach(
    part: &str,
    el: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(FillError::xml(part, "more than one root element")),
    }
    Ok(())
}
