//! Input field declarations
//!
//! ```text
//! INPUT[toggle:done]
//! INPUT[text]
//! INPUT[select(option(draft), option(done), title(Status)):Project#status]
//! ```
//!
//! The type name selects the widget, arguments configure it, and the part
//! after the first top-level `:` is the raw bind target (resolved later).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MetaBindError, Result};
use crate::widget::WidgetKind;

/// `INPUT[kind(args):target]`; args and target are optional
static DECLARATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^INPUT\[(?P<kind>[A-Za-z_]+)(?:\((?P<args>.*)\))?(?::(?P<target>.*))?\]$")
        .expect("valid declaration pattern")
});

/// `name` or `name(value)`
static ARGUMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z_]+)(?:\((?P<value>.*)\))?$").expect("valid argument pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    Title,
    Class,
    Showcase,
    Option,
    OptionQuery,
    Min,
    Max,
    Default,
}

impl ArgumentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArgumentKind::Title => "title",
            ArgumentKind::Class => "class",
            ArgumentKind::Showcase => "showcase",
            ArgumentKind::Option => "option",
            ArgumentKind::OptionQuery => "option_query",
            ArgumentKind::Min => "min",
            ArgumentKind::Max => "max",
            ArgumentKind::Default => "default",
        }
    }

    /// Arguments that may appear more than once
    pub fn is_repeatable(&self) -> bool {
        matches!(self, ArgumentKind::Option | ArgumentKind::OptionQuery | ArgumentKind::Class)
    }
}

impl FromStr for ArgumentKind {
    type Err = MetaBindError;

    fn from_str(name: &str) -> Result<Self> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "title" => ArgumentKind::Title,
            "class" => ArgumentKind::Class,
            "showcase" => ArgumentKind::Showcase,
            "option" => ArgumentKind::Option,
            "option_query" | "optionquery" => ArgumentKind::OptionQuery,
            "min" | "min_value" => ArgumentKind::Min,
            "max" | "max_value" => ArgumentKind::Max,
            "default" | "default_value" => ArgumentKind::Default,
            _ => {
                return Err(MetaBindError::InvalidArgument {
                    argument: name.to_string(),
                    reason: "unknown argument".to_string(),
                })
            }
        })
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub kind: ArgumentKind,
    /// Raw text between the parentheses (empty for bare flags)
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFieldDeclaration {
    pub full_declaration: String,
    pub kind: WidgetKind,
    pub bind_target: Option<String>,
    pub arguments: Vec<Argument>,
}

impl InputFieldDeclaration {
    /// First argument of `kind`
    pub fn argument(&self, kind: ArgumentKind) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.kind == kind)
    }

    pub fn arguments_of(&self, kind: ArgumentKind) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(move |a| a.kind == kind)
    }

    pub fn title(&self) -> Option<&str> {
        self.argument(ArgumentKind::Title).map(|a| a.value.as_str())
    }

    /// Every `class(...)` value, space-separated lists split apart
    pub fn classes(&self) -> Vec<&str> {
        self.arguments_of(ArgumentKind::Class)
            .flat_map(|a| a.value.split_whitespace())
            .collect()
    }

    pub fn showcase(&self) -> bool {
        self.argument(ArgumentKind::Showcase)
            .is_some_and(|a| a.value.is_empty() || a.value.eq_ignore_ascii_case("true"))
    }
}

/// Parse one `INPUT[...]` declaration
pub fn parse_declaration(text: &str) -> Result<InputFieldDeclaration> {
    let trimmed = text.trim();
    let error = |reason: String| MetaBindError::Declaration {
        declaration: trimmed.to_string(),
        reason,
    };

    let captures = DECLARATION_PATTERN
        .captures(trimmed)
        .ok_or_else(|| error("expected INPUT[type(arguments):target]".to_string()))?;

    let kind_name = &captures["kind"];
    let kind = WidgetKind::from_name(kind_name).ok_or_else(|| error(format!("unknown input type '{kind_name}'")))?;

    let arguments = match captures.name("args") {
        Some(args) => parse_arguments(args.as_str())?,
        None => Vec::new(),
    };

    for (i, argument) in arguments.iter().enumerate() {
        if !argument.kind.is_repeatable() && arguments[..i].iter().any(|a| a.kind == argument.kind) {
            return Err(MetaBindError::InvalidArgument {
                argument: argument.kind.to_string(),
                reason: "may only be given once".to_string(),
            });
        }
    }

    let bind_target = captures
        .name("target")
        .map(|t| t.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(InputFieldDeclaration {
        full_declaration: trimmed.to_string(),
        kind,
        bind_target,
        arguments,
    })
}

fn parse_arguments(text: &str) -> Result<Vec<Argument>> {
    split_top_level(text)?
        .into_iter()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let captures = ARGUMENT_PATTERN
                .captures(raw)
                .ok_or_else(|| MetaBindError::InvalidArgument {
                    argument: raw.to_string(),
                    reason: "expected name(value)".to_string(),
                })?;
            Ok(Argument {
                kind: captures["name"].parse()?,
                value: captures
                    .name("value")
                    .map(|v| v.as_str().trim().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Split on commas that are not nested in parentheses
fn split_top_level(text: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| MetaBindError::InvalidArgument {
                    argument: text.to_string(),
                    reason: "unbalanced ')'".to_string(),
                })?;
            }
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(MetaBindError::InvalidArgument {
            argument: text.to_string(),
            reason: "unclosed '('".to_string(),
        });
    }
    parts.push(&text[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_declaration() {
        let decl = parse_declaration("INPUT[toggle]").unwrap();
        assert_eq!(decl.kind, WidgetKind::Toggle);
        assert_eq!(decl.bind_target, None);
        assert!(decl.arguments.is_empty());
    }

    #[test]
    fn target_may_contain_brackets_and_separator() {
        let decl = parse_declaration("INPUT[text:Other#meta.tags[0]]").unwrap();
        assert_eq!(decl.kind, WidgetKind::Text);
        assert_eq!(decl.bind_target.as_deref(), Some("Other#meta.tags[0]"));
    }

    #[test]
    fn arguments_are_parsed_in_order() {
        let decl = parse_declaration(
            "INPUT[select(option(draft), option(done), title(Status: now), showcase):status]",
        )
        .unwrap();
        assert_eq!(decl.kind, WidgetKind::Select);
        let options: Vec<&str> = decl
            .arguments_of(ArgumentKind::Option)
            .map(|a| a.value.as_str())
            .collect();
        assert_eq!(options, vec!["draft", "done"]);
        assert_eq!(decl.title(), Some("Status: now"));
        assert!(decl.showcase());
        assert_eq!(decl.bind_target.as_deref(), Some("status"));
    }

    #[test]
    fn classes_are_collected_across_arguments() {
        let decl = parse_declaration("INPUT[toggle(class(wide), class(red bold)):done]").unwrap();
        assert_eq!(decl.classes(), vec!["wide", "red", "bold"]);
    }

    #[test]
    fn nested_parentheses_stay_in_value() {
        let decl = parse_declaration("INPUT[text(title(a (b), c)):x]").unwrap();
        assert_eq!(decl.title(), Some("a (b), c"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_declaration("INPUT[rocket:x]").unwrap_err();
        assert_eq!(err.code(), "MB-030");
        assert!(err.to_string().contains("unknown input type"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = parse_declaration("INPUT[text(colour(red)):x]").unwrap_err();
        assert_eq!(err.code(), "MB-031");
    }

    #[test]
    fn malformed_declarations_are_rejected() {
        for text in ["INPUT[]", "INPUT[text", "text:x", "INPUT[text(title(x):y]"] {
            assert!(parse_declaration(text).is_err(), "{text:?} should fail");
        }
    }

    #[test]
    fn duplicate_single_arguments_are_rejected() {
        let err = parse_declaration("INPUT[slider(min(0), min(1)):x]").unwrap_err();
        assert!(err.to_string().contains("only be given once"));
    }
}
