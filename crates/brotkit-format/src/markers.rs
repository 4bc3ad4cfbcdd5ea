//! Provenance markers: which bits of a stream produced which model element
//!
//! Markers are recorded by [`BitReader`](crate::bit::BitReader) when it is
//! created with marker collection enabled. Each marker covers a half-open bit
//! range, carries a label and optionally the decoded value, and nests the
//! markers recorded while it was open.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

/// One labelled bit range of a decoded stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerNode {
    /// First bit covered by the marker
    pub start_bit: usize,
    /// One past the last bit covered by the marker
    pub end_bit: usize,
    /// Label of the element
    pub title: Cow<'static, str>,
    /// Decoded value, when the element is a scalar
    pub value: Option<String>,
    /// Markers recorded inside this one
    pub children: Vec<MarkerNode>,
}

impl MarkerNode {
    /// Bit range covered by the marker
    pub fn bit_range(&self) -> Range<usize> {
        self.start_bit..self.end_bit
    }

    /// Bytes touched by the marker's bit range
    pub fn byte_range(&self) -> Range<usize> {
        self.start_bit / 8..self.end_bit.div_ceil(8)
    }

    /// Number of bits covered
    pub fn bit_len(&self) -> usize {
        self.end_bit.saturating_sub(self.start_bit)
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(
            f,
            "{:indent$}[{}..{}) {}",
            "",
            self.start_bit,
            self.end_bit,
            self.title,
            indent = depth * 2
        )?;
        if let Some(value) = &self.value {
            write!(f, " = {value}")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Forest of markers collected over a whole stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerRoot {
    /// Top-level markers in stream order
    pub nodes: Vec<MarkerNode>,
}

impl MarkerRoot {
    /// Depth-first iteration yielding `(depth, node)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MarkerNode)> {
        let mut stack: Vec<(usize, &MarkerNode)> =
            self.nodes.iter().rev().map(|node| (0, node)).collect();
        std::iter::from_fn(move || {
            let (depth, node) = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
            Some((depth, node))
        })
    }

    /// Total number of markers
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no markers were recorded
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Path of markers (outermost first) that cover `bit`
    pub fn covering(&self, bit: usize) -> Vec<&MarkerNode> {
        let mut path = Vec::new();
        let mut level = &self.nodes;
        while let Some(node) = level.iter().find(|node| node.bit_range().contains(&bit)) {
            path.push(node);
            level = &node.children;
        }
        path
    }

    /// Find the first marker with the given title
    pub fn find(&self, title: &str) -> Option<&MarkerNode> {
        self.iter().map(|(_, node)| node).find(|node| node.title == title)
    }
}

impl fmt::Display for MarkerRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            node.write_indented(f, 0)?;
        }
        Ok(())
    }
}

/// Incremental builder kept by the bit reader
#[derive(Debug, Default)]
pub(crate) struct MarkerBuilder {
    open: Vec<MarkerNode>,
    finished: Vec<MarkerNode>,
}

impl MarkerBuilder {
    pub(crate) fn begin(&mut self, title: Cow<'static, str>, start_bit: usize) {
        self.open.push(MarkerNode {
            start_bit,
            end_bit: start_bit,
            title,
            value: None,
            children: Vec::new(),
        });
    }

    pub(crate) fn end(&mut self, end_bit: usize, value: Option<String>) {
        let Some(mut node) = self.open.pop() else {
            return;
        };
        node.end_bit = end_bit;
        node.value = value;
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.finished.push(node),
        }
    }

    pub(crate) fn finish(mut self, end_bit: usize) -> MarkerRoot {
        while !self.open.is_empty() {
            self.end(end_bit, None);
        }
        MarkerRoot {
            nodes: self.finished,
        }
    }
}
