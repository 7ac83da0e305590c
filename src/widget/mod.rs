//! Widget Module - input field behaviour without a GUI (v0.1)
//!
//! Every widget keeps a typed value, coerces whatever the cache pushes into
//! that type, and renders itself as plain text. `render_count` counts value
//! pushes so redundant updates are observable.
//!
//! | Type           | Value       | Inline | Arguments              |
//! |----------------|-------------|--------|------------------------|
//! | `toggle`       | bool        | yes    |                        |
//! | `text`         | string      | yes    |                        |
//! | `number`       | number      | yes    |                        |
//! | `slider`       | number      | yes    | `min`, `max`           |
//! | `select`       | any scalar  | yes    | `option`               |
//! | `multi_select` | list        | no     | `option`               |
//! | `image_suggest`| image path  | no     | `option`, `option_query` |

mod fields;

use std::fmt;

use serde_json::Value;

use crate::declaration::{Argument, ArgumentKind};
use crate::error::{MetaBindError, Result};

pub use fields::{is_image_path, ImageSuggest, MultiSelect, Number, Select, Slider, Text, Toggle, IMAGE_EXTENSIONS};

/// Behaviour shared by all widgets
pub trait InputField: Send {
    fn kind(&self) -> WidgetKind;

    /// Current value as stored in metadata
    fn get_value(&self) -> Value;

    /// Show `value` (absent means the default) and re-render
    fn set_value(&mut self, value: Option<Value>);

    /// True if `value` would display exactly what is shown now
    fn is_equal_value(&self, value: Option<&Value>) -> bool;

    fn default_value(&self) -> Value;

    fn render(&self) -> String;

    /// Stop reacting to value pushes
    fn destroy(&mut self);

    fn render_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Toggle,
    Text,
    Number,
    Slider,
    Select,
    MultiSelect,
    ImageSuggest,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 7] = [
        WidgetKind::Toggle,
        WidgetKind::Text,
        WidgetKind::Number,
        WidgetKind::Slider,
        WidgetKind::Select,
        WidgetKind::MultiSelect,
        WidgetKind::ImageSuggest,
    ];

    /// Map a declaration type name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            WidgetKind::Toggle => "toggle",
            WidgetKind::Text => "text",
            WidgetKind::Number => "number",
            WidgetKind::Slider => "slider",
            WidgetKind::Select => "select",
            WidgetKind::MultiSelect => "multi_select",
            WidgetKind::ImageSuggest => "image_suggest",
        }
    }

    /// Block-only widgets need more room than a line of text
    pub fn allows_inline(&self) -> bool {
        !matches!(self, WidgetKind::MultiSelect | WidgetKind::ImageSuggest)
    }

    pub fn accepts(&self, argument: ArgumentKind) -> bool {
        match argument {
            ArgumentKind::Title | ArgumentKind::Class | ArgumentKind::Showcase | ArgumentKind::Default => true,
            ArgumentKind::Min | ArgumentKind::Max => matches!(self, WidgetKind::Slider),
            ArgumentKind::Option => matches!(
                self,
                WidgetKind::Select | WidgetKind::MultiSelect | WidgetKind::ImageSuggest
            ),
            ArgumentKind::OptionQuery => matches!(self, WidgetKind::ImageSuggest),
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of widgets
#[derive(Debug, Clone)]
pub enum Widget {
    Toggle(Toggle),
    Text(Text),
    Number(Number),
    Slider(Slider),
    Select(Select),
    MultiSelect(MultiSelect),
    ImageSuggest(ImageSuggest),
}

macro_rules! dispatch {
    ($self:expr, $w:ident => $body:expr) => {
        match $self {
            Widget::Toggle($w) => $body,
            Widget::Text($w) => $body,
            Widget::Number($w) => $body,
            Widget::Slider($w) => $body,
            Widget::Select($w) => $body,
            Widget::MultiSelect($w) => $body,
            Widget::ImageSuggest($w) => $body,
        }
    };
}

impl Widget {
    /// Construct a widget, validating its arguments
    pub fn build(kind: WidgetKind, arguments: &[Argument]) -> Result<Self> {
        if let Some(bad) = arguments.iter().find(|a| !kind.accepts(a.kind)) {
            return Err(MetaBindError::InvalidArgument {
                argument: bad.kind.to_string(),
                reason: format!("not supported by '{kind}' fields"),
            });
        }

        let default = arguments
            .iter()
            .find(|a| a.kind == ArgumentKind::Default)
            .map(|a| parse_scalar(&a.value));
        let options: Vec<Value> = arguments
            .iter()
            .filter(|a| a.kind == ArgumentKind::Option)
            .map(|a| parse_scalar(&a.value))
            .collect();

        Ok(match kind {
            WidgetKind::Toggle => Widget::Toggle(Toggle::new(default)),
            WidgetKind::Text => Widget::Text(Text::new(default)),
            WidgetKind::Number => Widget::Number(Number::new(default)),
            WidgetKind::Slider => {
                let min = number_argument(arguments, ArgumentKind::Min)?;
                let max = number_argument(arguments, ArgumentKind::Max)?;
                Widget::Slider(Slider::new(min, max, default)?)
            }
            WidgetKind::Select => Widget::Select(Select::new(options, default)),
            WidgetKind::MultiSelect => Widget::MultiSelect(MultiSelect::new(options, default)),
            WidgetKind::ImageSuggest => {
                let queries = arguments
                    .iter()
                    .filter(|a| a.kind == ArgumentKind::OptionQuery)
                    .map(|a| a.value.trim().trim_matches('"').to_string())
                    .collect();
                Widget::ImageSuggest(ImageSuggest::new(options, queries, default)?)
            }
        })
    }

    /// Folders to scan for extra options (`option_query` arguments)
    pub fn option_queries(&self) -> &[String] {
        match self {
            Widget::ImageSuggest(w) => w.option_queries(),
            _ => &[],
        }
    }

    /// Add options discovered by a folder scan
    pub fn add_options(&mut self, found: Vec<String>) {
        if let Widget::ImageSuggest(w) = self {
            w.add_options(found);
        }
    }
}

impl InputField for Widget {
    fn kind(&self) -> WidgetKind {
        dispatch!(self, w => w.kind())
    }

    fn get_value(&self) -> Value {
        dispatch!(self, w => w.get_value())
    }

    fn set_value(&mut self, value: Option<Value>) {
        dispatch!(self, w => w.set_value(value))
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        dispatch!(self, w => w.is_equal_value(value))
    }

    fn default_value(&self) -> Value {
        dispatch!(self, w => w.default_value())
    }

    fn render(&self) -> String {
        dispatch!(self, w => w.render())
    }

    fn destroy(&mut self) {
        dispatch!(self, w => w.destroy())
    }

    fn render_count(&self) -> usize {
        dispatch!(self, w => w.render_count())
    }
}

/// Argument text as a YAML scalar: `3` is a number, `true` a bool, `a b` a string
fn parse_scalar(text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(text.to_string()),
    }
}

fn number_argument(arguments: &[Argument], kind: ArgumentKind) -> Result<Option<f64>> {
    let Some(argument) = arguments.iter().find(|a| a.kind == kind) else {
        return Ok(None);
    };
    match argument.value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(MetaBindError::InvalidArgument {
            argument: kind.to_string(),
            reason: format!("'{}' is not a finite number", argument.value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arg(kind: ArgumentKind, value: &str) -> Argument {
        Argument {
            kind,
            value: value.to_string(),
        }
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in WidgetKind::ALL {
            assert_eq!(WidgetKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(WidgetKind::from_name("MULTI_SELECT"), Some(WidgetKind::MultiSelect));
        assert_eq!(WidgetKind::from_name("date"), None);
    }

    #[test]
    fn block_only_kinds() {
        assert!(!WidgetKind::ImageSuggest.allows_inline());
        assert!(!WidgetKind::MultiSelect.allows_inline());
        assert!(WidgetKind::Toggle.allows_inline());
    }

    #[test]
    fn build_rejects_unsupported_argument() {
        let err = Widget::build(WidgetKind::Toggle, &[arg(ArgumentKind::Min, "1")]).unwrap_err();
        assert_eq!(err.code(), "MB-031");
    }

    #[test]
    fn build_rejects_non_numeric_bounds() {
        let err = Widget::build(WidgetKind::Slider, &[arg(ArgumentKind::Max, "lots")]).unwrap_err();
        assert!(err.to_string().contains("not a finite number"));
    }

    #[test]
    fn build_rejects_non_finite_bounds() {
        for bad in ["nan", "NaN", "inf", "-infinity", "1e999"] {
            let err = Widget::build(WidgetKind::Slider, &[arg(ArgumentKind::Min, bad)]).unwrap_err();
            assert_eq!(err.code(), "MB-031", "{bad}");
        }
    }

    #[test]
    fn default_argument_is_typed() {
        let widget = Widget::build(WidgetKind::Number, &[arg(ArgumentKind::Default, "7")]).unwrap();
        assert_eq!(widget.default_value(), json!(7));

        let widget = Widget::build(WidgetKind::Toggle, &[arg(ArgumentKind::Default, "true")]).unwrap();
        assert_eq!(widget.get_value(), json!(true));
    }

    #[test]
    fn option_queries_are_unquoted() {
        let widget = Widget::build(
            WidgetKind::ImageSuggest,
            &[
                arg(ArgumentKind::OptionQuery, "\"assets/covers\""),
                arg(ArgumentKind::OptionQuery, "icons"),
            ],
        )
        .unwrap();
        assert_eq!(widget.option_queries(), ["assets/covers".to_string(), "icons".to_string()]);
        assert!(Widget::build(WidgetKind::Text, &[]).unwrap().option_queries().is_empty());
    }

    #[test]
    fn dispatch_reaches_variant() {
        let mut widget = Widget::build(WidgetKind::Text, &[]).unwrap();
        widget.set_value(Some(json!("hi")));
        assert_eq!(widget.kind(), WidgetKind::Text);
        assert_eq!(widget.get_value(), json!("hi"));
        assert_eq!(widget.render_count(), 1);
    }
}
