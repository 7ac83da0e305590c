//! Property path parser (v0.1)
//!
//! Supports:
//! - a.b.c (dot notation)
//! - a[0].b (list index)
//! - a["key with spaces"] / a['key'] (quoted keys)
//!
//! Does NOT support:
//! - Wildcards: a[*]
//! - Negative indices: a[-1]
//! - Slices: a[0:5]
//!
//! Reading never fails: a missing segment is a normal state (new note,
//! optional field). Writing never fails either: intermediate containers are
//! created on the way down, shaped by the segment that follows them.
//!
//! List indices are capped at [`MAX_INDEX`] so a write can never try to pad
//! a list to an absurd length.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{MetaBindError, Result};

/// Largest list index a path may address
pub const MAX_INDEX: usize = 65_535;

/// A single step into a property tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Map key access: .key or ["key"]
    Key(String),
    /// List index access: [0]
    Index(usize),
}

/// Parsed, immutable property path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertyPath {
    segments: Vec<Segment>,
}

impl PropertyPath {
    /// Build a path from already-parsed segments
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse a path string into segments
    ///
    /// Examples:
    /// - "status" → [Key("status")]
    /// - "meta.tags[0]" → [Key("meta"), Key("tags"), Index(0)]
    pub fn parse(text: &str) -> Result<Self> {
        let fail = |reason: &str| MetaBindError::PathSyntax {
            path: text.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = text.trim().chars().collect();
        if chars.is_empty() {
            return Err(fail("path is empty"));
        }

        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            if chars[pos] == '[' {
                let (segment, next) = parse_bracket(&chars, pos + 1).map_err(|r| fail(r))?;
                segments.push(segment);
                pos = next;
                continue;
            }

            if !segments.is_empty() {
                if chars[pos] != '.' {
                    return Err(fail("expected '.' or '[' between segments"));
                }
                pos += 1;
            }

            let start = pos;
            while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                if chars[pos] == ']' {
                    return Err(fail("unexpected ']'"));
                }
                pos += 1;
            }

            let key: String = chars[start..pos].iter().collect();
            let key = key.trim();
            if key.is_empty() {
                return Err(fail("empty segment"));
            }
            segments.push(Segment::Key(key.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` is equal to `other` or one is an ancestor of the other
    pub fn overlaps(&self, other: &PropertyPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// True if every segment of `self` starts `other`
    pub fn is_prefix_of(&self, other: &PropertyPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Read the value at this path (cloned), `None` if any segment is missing
    pub fn read(&self, tree: &Value) -> Option<Value> {
        self.read_ref(tree).cloned()
    }

    /// Borrowing variant of [`read`](Self::read)
    pub fn read_ref<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(tree, |node, segment| match segment {
                Segment::Key(key) => node.as_object()?.get(key),
                Segment::Index(index) => node.as_array()?.get(*index),
            })
    }

    /// Write `value` at this path, creating containers as needed
    pub fn write(&self, tree: &mut Value, value: Value) {
        write_at(tree, &self.segments, value);
    }
}

fn write_at(node: &mut Value, segments: &[Segment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    match head {
        Segment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                write_at(child, rest, value);
            }
        }
        Segment::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            let Some(len) = index.checked_add(1).filter(|_| *index <= MAX_INDEX) else {
                tracing::warn!(index, max = MAX_INDEX, "list index out of range, write skipped");
                return;
            };
            if let Value::Array(items) = node {
                if items.len() < len {
                    items.resize(len, Value::Null);
                }
                if let Some(item) = items.get_mut(*index) {
                    write_at(item, rest, value);
                }
            }
        }
    }
}

/// Parse the inside of `[...]` starting right after the opening bracket.
/// Returns the segment and the position after the closing bracket.
fn parse_bracket(chars: &[char], mut pos: usize) -> std::result::Result<(Segment, usize), &'static str> {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    let Some(&first) = chars.get(pos) else {
        return Err("unterminated '['");
    };

    let segment = if first == '"' || first == '\'' {
        // `\` escapes the next character inside quotes
        let mut key = String::new();
        pos += 1;
        loop {
            match chars.get(pos) {
                None => return Err("unterminated quoted key"),
                Some(&'\\') => {
                    let Some(&escaped) = chars.get(pos + 1) else {
                        return Err("unterminated quoted key");
                    };
                    key.push(escaped);
                    pos += 2;
                }
                Some(&c) if c == first => {
                    pos += 1;
                    break;
                }
                Some(&c) => {
                    key.push(c);
                    pos += 1;
                }
            }
        }
        if key.is_empty() {
            return Err("empty quoted key");
        }
        Segment::Key(key)
    } else {
        let start = pos;
        while pos < chars.len() && chars[pos] != ']' {
            pos += 1;
        }
        let raw: String = chars[start..pos].iter().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty brackets");
        }
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err("index must be a non-negative integer or a quoted key");
        }
        match raw.parse::<usize>() {
            Ok(index) if index <= MAX_INDEX => Segment::Index(index),
            _ => return Err("index exceeds the maximum list index"),
        }
    };

    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    if chars.get(pos) != Some(&']') {
        return Err("unterminated '['");
    }
    Ok((segment, pos + 1))
}

impl FromStr for PropertyPath {
    type Err = MetaBindError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) if needs_quoting(key) => {
                    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[\"{escaped}\"]")?
                }
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.trim() != key || key.contains(['.', '[', ']', '#'])
}
