//! Typed lookup over dissected capture fields.
//!
//! The reconstruction engine never touches packet bytes. It walks a tree of
//! named protocols and fields produced by an external dissector and reads
//! their textual values through [`FieldTree`]. Implementors only provide
//! navigation; the typed accessors (`integer`, `boolean`, ...) and their
//! `MissingField` failures come for free.
//!
//! [`FieldNode`] is an owned implementation with a small builder API, used to
//! materialize dissector output (and by the test suite).

use crate::error::{Error, Result};

/// Read access to one node of a dissector field tree.
pub trait FieldTree: Sized {
    /// Name of this protocol or field (e.g. `"http2.stream"`).
    fn name(&self) -> &str;

    /// Displayed value of this node, if it carries one.
    fn show(&self) -> Option<&str>;

    /// Size attribute of this node in bytes, if it carries one.
    fn size(&self) -> Option<u64>;

    /// All direct sub-nodes in document order.
    fn entries(&self) -> Vec<&Self>;

    /// First direct field child with the given name.
    fn find_field(&self, name: &str) -> Option<&Self>;

    /// All direct field children with the given name, in order.
    fn find_fields(&self, name: &str) -> Vec<&Self>;

    /// First direct protocol child with the given name.
    fn find_proto(&self, name: &str) -> Option<&Self>;

    fn exists(&self, name: &str) -> bool {
        self.find_field(name).is_some()
    }

    fn nested(&self, name: &str) -> Result<&Self> {
        self.find_field(name)
            .ok_or_else(|| Error::missing(name, self.name()))
    }

    fn proto(&self, name: &str) -> Result<&Self> {
        self.find_proto(name)
            .ok_or_else(|| Error::missing(name, self.name()))
    }

    fn children(&self, name: &str) -> Vec<&Self> {
        self.find_fields(name)
    }

    /// Displayed value of a mandatory field.
    fn value(&self, name: &str) -> Result<&str> {
        self.nested(name)?
            .show()
            .ok_or_else(|| Error::missing(name, self.name()))
    }

    fn integer(&self, name: &str) -> Result<i64> {
        parse_integer(name, self.value(name)?)
    }

    fn boolean(&self, name: &str) -> Result<bool> {
        parse_boolean(name, self.value(name)?)
    }

    fn real(&self, name: &str) -> Result<f64> {
        let raw = self.value(name)?;
        raw.trim()
            .parse::<f64>()
            .map_err(|_| Error::invalid(name, raw))
    }

    fn string(&self, name: &str) -> Result<String> {
        Ok(self.value(name)?.to_string())
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
pub fn parse_integer(name: &str, raw: &str) -> Result<i64> {
    let text = raw.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse::<i64>(),
    };
    parsed.map_err(|_| Error::invalid(name, raw))
}

fn parse_boolean(name: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        _ => Err(Error::invalid(name, raw)),
    }
}

/// Whether a [`FieldNode`] is a protocol layer or a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Proto,
    Field,
}

/// An owned dissector tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub kind: NodeKind,
    pub name: String,
    pub show: Option<String>,
    pub size: Option<u64>,
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    /// A protocol layer node, e.g. `FieldNode::layer("tcp")`.
    pub fn layer(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Proto,
            name: name.into(),
            show: None,
            size: None,
            children: Vec::new(),
        }
    }

    /// A field node without a displayed value (a container).
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Field,
            ..Self::layer(name)
        }
    }

    /// A leaf field with a displayed value.
    pub fn leaf(name: impl Into<String>, show: impl ToString) -> Self {
        Self::field(name).with_show(show)
    }

    pub fn with_show(mut self, show: impl ToString) -> Self {
        self.show = Some(show.to_string());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Append a child and return self (builder style).
    pub fn with(mut self, child: FieldNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: FieldNode) {
        self.children.push(child);
    }
}

impl FieldTree for FieldNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn show(&self) -> Option<&str> {
        self.show.as_deref()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn entries(&self) -> Vec<&Self> {
        self.children.iter().collect()
    }

    fn find_field(&self, name: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|c| c.kind == NodeKind::Field && c.name == name)
    }

    fn find_fields(&self, name: &str) -> Vec<&Self> {
        self.children
            .iter()
            .filter(|c| c.kind == NodeKind::Field && c.name == name)
            .collect()
    }

    fn find_proto(&self, name: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|c| c.kind == NodeKind::Proto && c.name == name)
    }
}
