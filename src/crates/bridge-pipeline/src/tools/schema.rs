//! Declarative argument schemas and sanitization.
//!
//! Validation and sanitization happen in one pass: strings are trimmed,
//! colors normalized to `#rrggbb`, numbers and booleans coerced from
//! string forms, defaults applied, unknown fields dropped. Error strings
//! name the offending field; the executor wraps them in its validation
//! error so the failure classifier can match them.

use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Accepted value shapes for one field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,

    /// A `#rrggbb` color; `#rgb` shorthand is expanded.
    Color,

    /// One of a fixed set of lowercase variants.
    Enum(&'static [&'static str]),
}

/// One argument in a tool schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldKind, required: bool) -> Self {
        Self {
            name,
            kind,
            required,
            default: None,
            min: None,
            max: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// Shorthand constructors used by the registry table.
pub fn string(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::String, required)
}

pub fn number(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::Number, required)
}

pub fn boolean(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::Boolean, required)
}

pub fn array(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::Array, required)
}

pub fn color(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::Color, required)
}

pub fn enum_of(name: &'static str, variants: &'static [&'static str], required: bool) -> FieldSpec {
    FieldSpec::new(name, FieldKind::Enum(variants), required)
}

/// Argument schema for one tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub tool: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn new(tool: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { tool, fields }
    }

    /// Validate and sanitize `args`. Returns the sanitized object with
    /// defaults applied and unknown fields dropped, or a precise error.
    pub fn validate(&self, args: &Value) -> Result<Value, String> {
        let input = match args {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(format!(
                    "{} arguments must be an object",
                    self.tool
                ))
            }
        };

        let mut sanitized = Map::new();
        for field in &self.fields {
            match input.get(field.name) {
                None | Some(Value::Null) => {
                    if let Some(default) = &field.default {
                        sanitized.insert(field.name.to_string(), default.clone());
                    } else if field.required {
                        return Err(format!(
                            "missing required field '{}'",
                            field.name
                        ));
                    }
                }
                Some(value) => {
                    let cleaned = self.sanitize_field(field, value)?;
                    sanitized.insert(field.name.to_string(), cleaned);
                }
            }
        }
        Ok(Value::Object(sanitized))
    }

    fn sanitize_field(&self, field: &FieldSpec, value: &Value) -> Result<Value, String> {
        match &field.kind {
            FieldKind::String => match value {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(format!(
                    "field '{}' must be a string",
                    field.name
                )),
            },

            FieldKind::Number => {
                let parsed = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                let number = parsed.ok_or_else(|| {
                    format!("field '{}' must be a number", field.name)
                })?;
                if let Some(min) = field.min {
                    if number < min {
                        return Err(format!(
                            "field '{}' must be at least {}",
                            field.name, min
                        ));
                    }
                }
                if let Some(max) = field.max {
                    if number > max {
                        return Err(format!(
                            "field '{}' must be at most {}",
                            field.name, max
                        ));
                    }
                }
                Ok(serde_json::json!(number))
            }

            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "1" => Ok(Value::Bool(true)),
                    "false" | "no" | "0" => Ok(Value::Bool(false)),
                    _ => Err(format!(
                        "field '{}' must be a boolean",
                        field.name
                    )),
                },
                Value::Number(n) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
                _ => Err(format!(
                    "field '{}' must be a boolean",
                    field.name
                )),
            },

            FieldKind::Object => {
                if value.is_object() {
                    Ok(value.clone())
                } else {
                    Err(format!(
                        "field '{}' must be an object",
                        field.name
                    ))
                }
            }

            FieldKind::Array => {
                if value.is_array() {
                    Ok(value.clone())
                } else {
                    Err(format!(
                        "field '{}' must be an array",
                        field.name
                    ))
                }
            }

            FieldKind::Color => {
                let raw = value.as_str().ok_or_else(|| {
                    format!("field '{}' must be a color string", field.name)
                })?;
                normalize_color(raw).ok_or_else(|| {
                    format!(
                        "field '{}' is not a valid color: {}",
                        field.name, raw
                    )
                })
            }

            FieldKind::Enum(variants) => {
                let raw = value.as_str().ok_or_else(|| {
                    format!("field '{}' must be a string", field.name)
                })?;
                let lowered = raw.trim().to_lowercase();
                if variants.contains(&lowered.as_str()) {
                    Ok(Value::String(lowered))
                } else {
                    Err(format!(
                        "field '{}' must be one of [{}], got '{}'",
                        field.name,
                        variants.join(", "),
                        raw
                    ))
                }
            }
        }
    }

    /// JSON-schema parameter object for the LLM tool surface.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let type_name = match &field.kind {
                FieldKind::String | FieldKind::Color => "string",
                FieldKind::Number => "number",
                FieldKind::Boolean => "boolean",
                FieldKind::Object => "object",
                FieldKind::Array => "array",
                FieldKind::Enum(_) => "string",
            };
            let mut spec = Map::new();
            spec.insert("type".to_string(), Value::String(type_name.to_string()));
            if let FieldKind::Enum(variants) = &field.kind {
                spec.insert(
                    "enum".to_string(),
                    Value::Array(variants.iter().map(|v| Value::String(v.to_string())).collect()),
                );
            }
            properties.insert(field.name.to_string(), Value::Object(spec));
            if field.required {
                required.push(Value::String(field.name.to_string()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Normalize a color string to lowercase `#rrggbb`. Accepts `#rgb`
/// shorthand. Returns None for anything else.
pub fn normalize_color(raw: &str) -> Option<Value> {
    static HEX: OnceLock<regex::Regex> = OnceLock::new();
    let hex = HEX.get_or_init(|| regex::Regex::new(r"^#([0-9a-f]{3}|[0-9a-f]{6})$").unwrap());

    let lowered = raw.trim().to_lowercase();
    if !hex.is_match(&lowered) {
        return None;
    }
    if lowered.len() == 4 {
        let expanded: String = lowered[1..]
            .chars()
            .flat_map(|c| [c, c])
            .collect();
        Some(Value::String(format!("#{}", expanded)))
    } else {
        Some(Value::String(lowered))
    }
}
