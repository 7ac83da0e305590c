//! Concrete widgets

use serde_json::Value;

use super::{InputField, WidgetKind};
use crate::error::{MetaBindError, Result};

/// Extensions `image_suggest` accepts for its options
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "apng", "avif", "gif", "jpg", "jpeg", "jfif", "pjpeg", "pjp", "png", "svg", "webp",
];

const SLIDER_DEFAULT_MIN: f64 = 0.0;
const SLIDER_DEFAULT_MAX: f64 = 100.0;
const SLIDER_TRACK: usize = 10;

#[derive(Debug, Clone, Default)]
struct Lifecycle {
    renders: usize,
    destroyed: bool,
}

impl Lifecycle {
    /// Count a render; false once destroyed
    fn render(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.renders += 1;
        true
    }
}

// ═══════════════════════════════════════════
// COERCION
// ═══════════════════════════════════════════

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Some(true),
            "false" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Finite numbers only; `"nan"` or `"inf"` text is not a number
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

/// Integral numbers are stored as integers so front-matter reads `4`, not `4.0`
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn format_number(n: f64) -> String {
    number_value(n).to_string()
}

/// Scalars compare by their text form, so `5` matches `"5"`
fn same_scalar(a: &Value, b: &Value) -> bool {
    as_text(a) == as_text(b)
}

fn label(value: &Value) -> String {
    as_text(value).unwrap_or_default()
}

// ═══════════════════════════════════════════
// TOGGLE
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Toggle {
    value: bool,
    default: bool,
    lifecycle: Lifecycle,
}

impl Toggle {
    pub fn new(default: Option<Value>) -> Self {
        let default = default.as_ref().and_then(as_bool).unwrap_or(false);
        Self {
            value: default,
            default,
            lifecycle: Lifecycle::default(),
        }
    }

    fn coerce(&self, value: Option<&Value>) -> bool {
        value.and_then(as_bool).unwrap_or(self.default)
    }
}

impl InputField for Toggle {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Toggle
    }

    fn get_value(&self) -> Value {
        Value::Bool(self.value)
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        self.coerce(value) == self.value
    }

    fn default_value(&self) -> Value {
        Value::Bool(self.default)
    }

    fn render(&self) -> String {
        let mark = if self.value { "[x]" } else { "[ ]" };
        mark.to_string()
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Text {
    value: String,
    default: String,
    lifecycle: Lifecycle,
}

impl Text {
    pub fn new(default: Option<Value>) -> Self {
        let default = default.as_ref().and_then(as_text).unwrap_or_default();
        Self {
            value: default.clone(),
            default,
            lifecycle: Lifecycle::default(),
        }
    }

    fn coerce(&self, value: Option<&Value>) -> String {
        value.and_then(as_text).unwrap_or_else(|| self.default.clone())
    }
}

impl InputField for Text {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Text
    }

    fn get_value(&self) -> Value {
        Value::String(self.value.clone())
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        self.coerce(value) == self.value
    }

    fn default_value(&self) -> Value {
        Value::String(self.default.clone())
    }

    fn render(&self) -> String {
        format!("[{}]", self.value)
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// NUMBER
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Number {
    value: f64,
    default: f64,
    lifecycle: Lifecycle,
}

impl Number {
    pub fn new(default: Option<Value>) -> Self {
        let default = default.as_ref().and_then(as_number).unwrap_or(0.0);
        Self {
            value: default,
            default,
            lifecycle: Lifecycle::default(),
        }
    }

    fn coerce(&self, value: Option<&Value>) -> f64 {
        value.and_then(as_number).unwrap_or(self.default)
    }
}

impl InputField for Number {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Number
    }

    fn get_value(&self) -> Value {
        number_value(self.value)
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        self.coerce(value) == self.value
    }

    fn default_value(&self) -> Value {
        number_value(self.default)
    }

    fn render(&self) -> String {
        format!("[{}]", format_number(self.value))
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// SLIDER
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Slider {
    value: f64,
    min: f64,
    max: f64,
    default: f64,
    lifecycle: Lifecycle,
}

impl Slider {
    pub fn new(min: Option<f64>, max: Option<f64>, default: Option<Value>) -> Result<Self> {
        let min = min.unwrap_or(SLIDER_DEFAULT_MIN);
        let max = max.unwrap_or(SLIDER_DEFAULT_MAX);
        if !min.is_finite() || !max.is_finite() {
            return Err(MetaBindError::InvalidArgument {
                argument: "min".to_string(),
                reason: "slider bounds must be finite numbers".to_string(),
            });
        }
        if min > max {
            return Err(MetaBindError::InvalidArgument {
                argument: "min".to_string(),
                reason: format!("min {} is greater than max {}", format_number(min), format_number(max)),
            });
        }
        let default = default.as_ref().and_then(as_number).unwrap_or(min).clamp(min, max);
        Ok(Self {
            value: default,
            min,
            max,
            default,
            lifecycle: Lifecycle::default(),
        })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    fn coerce(&self, value: Option<&Value>) -> f64 {
        value
            .and_then(as_number)
            .unwrap_or(self.default)
            .clamp(self.min, self.max)
    }
}

impl InputField for Slider {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Slider
    }

    fn get_value(&self) -> Value {
        number_value(self.value)
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        self.coerce(value) == self.value
    }

    fn default_value(&self) -> Value {
        number_value(self.default)
    }

    fn render(&self) -> String {
        let span = self.max - self.min;
        let knob = if span > 0.0 {
            (((self.value - self.min) / span) * SLIDER_TRACK as f64).round() as usize
        } else {
            0
        };
        let track: String = (0..=SLIDER_TRACK)
            .map(|i| if i == knob { '●' } else { '─' })
            .collect();
        format!(
            "{} {} {} ({})",
            format_number(self.min),
            track,
            format_number(self.max),
            format_number(self.value)
        )
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// SELECT
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Select {
    options: Vec<Value>,
    value: Value,
    default: Value,
    lifecycle: Lifecycle,
}

impl Select {
    pub fn new(options: Vec<Value>, default: Option<Value>) -> Self {
        let default = default.unwrap_or(Value::Null);
        Self {
            options,
            value: default.clone(),
            default,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn options(&self) -> &[Value] {
        &self.options
    }

    fn coerce(&self, value: Option<&Value>) -> Value {
        match value {
            None | Some(Value::Null) => self.default.clone(),
            Some(v) => v.clone(),
        }
    }
}

impl InputField for Select {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Select
    }

    fn get_value(&self) -> Value {
        self.value.clone()
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        same_scalar(&self.coerce(value), &self.value)
    }

    fn default_value(&self) -> Value {
        self.default.clone()
    }

    fn render(&self) -> String {
        if self.options.is_empty() {
            return format!("[{}]", label(&self.value));
        }
        self.options
            .iter()
            .map(|option| {
                let mark = if same_scalar(option, &self.value) { "(•)" } else { "( )" };
                format!("{mark} {}", label(option))
            })
            .collect::<Vec<_>>()
            .join("  ")
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// MULTI SELECT
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct MultiSelect {
    options: Vec<Value>,
    value: Vec<Value>,
    default: Vec<Value>,
    lifecycle: Lifecycle,
}

impl MultiSelect {
    pub fn new(options: Vec<Value>, default: Option<Value>) -> Self {
        let default = Self::to_list(default.as_ref()).unwrap_or_default();
        Self {
            options,
            value: default.clone(),
            default,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn options(&self) -> &[Value] {
        &self.options
    }

    fn to_list(value: Option<&Value>) -> Option<Vec<Value>> {
        match value? {
            Value::Null => None,
            Value::Array(items) => Some(items.clone()),
            scalar => Some(vec![scalar.clone()]),
        }
    }

    fn coerce(&self, value: Option<&Value>) -> Vec<Value> {
        Self::to_list(value).unwrap_or_else(|| self.default.clone())
    }

    fn is_selected(&self, option: &Value) -> bool {
        self.value.iter().any(|v| same_scalar(v, option))
    }
}

impl InputField for MultiSelect {
    fn kind(&self) -> WidgetKind {
        WidgetKind::MultiSelect
    }

    fn get_value(&self) -> Value {
        Value::Array(self.value.clone())
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        let other = self.coerce(value);
        other.len() == self.value.len() && other.iter().zip(&self.value).all(|(a, b)| same_scalar(a, b))
    }

    fn default_value(&self) -> Value {
        Value::Array(self.default.clone())
    }

    fn render(&self) -> String {
        let listed = self.options.iter().map(|option| {
            let mark = if self.is_selected(option) { "[x]" } else { "[ ]" };
            format!("{mark} {}", label(option))
        });
        // Selected values the options don't mention are still shown
        let extra = self
            .value
            .iter()
            .filter(|v| !self.options.iter().any(|o| same_scalar(o, v)))
            .map(|v| format!("[x] {}", label(v)));
        listed.chain(extra).collect::<Vec<_>>().join("\n")
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}

// ═══════════════════════════════════════════
// IMAGE SUGGEST
// ═══════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ImageSuggest {
    options: Vec<String>,
    /// Folders whose images are offered too
    option_queries: Vec<String>,
    value: Option<String>,
    default: Option<String>,
    lifecycle: Lifecycle,
}

impl ImageSuggest {
    pub fn new(options: Vec<Value>, option_queries: Vec<String>, default: Option<Value>) -> Result<Self> {
        let options = options
            .iter()
            .map(|option| {
                let path = label(option);
                if is_image_path(&path) {
                    Ok(path)
                } else {
                    Err(MetaBindError::InvalidArgument {
                        argument: "option".to_string(),
                        reason: format!("'{path}' is not an image ({})", IMAGE_EXTENSIONS.join(", ")),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let default = default.as_ref().and_then(as_text);
        Ok(Self {
            options,
            option_queries,
            value: default.clone(),
            default,
            lifecycle: Lifecycle::default(),
        })
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn option_queries(&self) -> &[String] {
        &self.option_queries
    }

    /// Offer images found by scanning the query folders; non-images and
    /// paths already offered are ignored
    pub fn add_options(&mut self, found: impl IntoIterator<Item = String>) {
        for path in found {
            if is_image_path(&path) && !self.options.contains(&path) {
                self.options.push(path);
            }
        }
    }

    fn coerce(&self, value: Option<&Value>) -> Option<String> {
        value.and_then(as_text).or_else(|| self.default.clone())
    }
}

/// True if `path` has one of the [`IMAGE_EXTENSIONS`]
pub fn is_image_path(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl InputField for ImageSuggest {
    fn kind(&self) -> WidgetKind {
        WidgetKind::ImageSuggest
    }

    fn get_value(&self) -> Value {
        self.value.clone().map_or(Value::Null, Value::String)
    }

    fn set_value(&mut self, value: Option<Value>) {
        if self.lifecycle.render() {
            self.value = self.coerce(value.as_ref());
        }
    }

    fn is_equal_value(&self, value: Option<&Value>) -> bool {
        self.coerce(value) == self.value
    }

    fn default_value(&self) -> Value {
        self.default.clone().map_or(Value::Null, Value::String)
    }

    fn render(&self) -> String {
        let image = match &self.value {
            Some(path) => format!("![[{path}]]"),
            None => "[no image]".to_string(),
        };
        if self.options.is_empty() {
            image
        } else {
            format!("{image}\nsuggestions: {}", self.options.join(", "))
        }
    }

    fn destroy(&mut self) {
        self.lifecycle.destroyed = true;
    }

    fn render_count(&self) -> usize {
        self.lifecycle.renders
    }
}
