//! Front-matter split/compose
//!
//! A note's metadata lives in a YAML block fenced by `---` lines at the very
//! top of the file. Everything after the closing fence is the body and is
//! preserved byte for byte when the metadata is rewritten.

use serde_json::{Map, Value};

use crate::error::{MetaBindError, Result};

const FENCE: &str = "---";

/// A note split into its YAML block (if any) and body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontMatter<'a> {
    pub yaml: Option<&'a str>,
    pub body: &'a str,
}

impl FrontMatter<'_> {
    /// Parse the YAML block into a metadata tree
    ///
    /// Missing or empty front-matter is an empty map; anything other than a
    /// mapping is rejected.
    pub fn parse_tree(&self, document: &str) -> Result<Value> {
        let Some(yaml) = self.yaml.filter(|y| !y.trim().is_empty()) else {
            return Ok(Value::Object(Map::new()));
        };

        let tree: Value = serde_yaml::from_str(yaml).map_err(|e| MetaBindError::FrontMatter {
            document: document.to_string(),
            reason: e.to_string(),
        })?;

        match tree {
            Value::Object(_) => Ok(tree),
            Value::Null => Ok(Value::Object(Map::new())),
            other => Err(MetaBindError::FrontMatter {
                document: document.to_string(),
                reason: format!("expected a mapping, found {}", type_name(&other)),
            }),
        }
    }
}

/// Split raw note content into front-matter and body
pub fn split_front_matter(content: &str) -> FrontMatter<'_> {
    let no_front_matter = FrontMatter {
        yaml: None,
        body: content,
    };

    let Some(first_end) = content.find('\n') else {
        return no_front_matter;
    };
    if content[..first_end].trim_end() != FENCE {
        return no_front_matter;
    }

    let yaml_start = first_end + 1;
    let mut offset = yaml_start;
    for line in content[yaml_start..].split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return FrontMatter {
                yaml: Some(&content[yaml_start..offset]),
                body: &content[offset + line.len()..],
            };
        }
        offset += line.len();
    }

    no_front_matter
}

/// Render a metadata tree back into a note, keeping `body` untouched
pub fn compose_front_matter(tree: &Value, body: &str) -> Result<String> {
    let yaml = match tree {
        Value::Object(map) if map.is_empty() => String::new(),
        _ => serde_yaml::to_string(tree)?,
    };
    Ok(format!("{FENCE}\n{yaml}{FENCE}\n{body}"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
