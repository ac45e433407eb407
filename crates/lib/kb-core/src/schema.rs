//! Structural parameter schemas for the KB tools.
//!
//! A [`ParamSchema`] renders to the JSON-Schema object advertised to hosts and
//! validates incoming arguments against the same rules, so a call that would be
//! rejected by a schema-aware host is rejected here too.

use std::error::Error;
use std::fmt;

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String { min_length: usize },
    Integer { minimum: i64, maximum: i64 },
    Boolean,
}

impl ParamKind {
    const fn type_name(self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::String { min_length } => json!({ "type": "string", "minLength": min_length }),
            Self::Integer { minimum, maximum } => {
                json!({ "type": "integer", "minimum": minimum, "maximum": maximum })
            }
            Self::Boolean => json!({ "type": "boolean" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// Object schema with a closed set of properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    #[must_use]
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    #[must_use]
    pub fn required(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    #[must_use]
    pub fn optional(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    /// JSON-Schema rendering; `required` is omitted when empty.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|param| (param.name.to_string(), param.kind.to_json()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();

        let mut schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Checks `args` against the schema. The first violation wins.
    ///
    /// # Errors
    /// Returns an [`InvocationError`] describing the violation.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), InvocationError> {
        if let Some(unknown) = args.keys().find(|key| self.get(key).is_none()) {
            return Err(InvocationError::UnknownProperty(unknown.clone()));
        }
        for param in &self.params {
            match args.get(param.name) {
                None if param.required => {
                    return Err(InvocationError::MissingProperty(param.name));
                }
                None => {}
                Some(value) => check_value(param, value)?,
            }
        }
        Ok(())
    }
}

fn check_value(param: &ParamSpec, value: &Value) -> Result<(), InvocationError> {
    let invalid_type = || InvocationError::InvalidType {
        name: param.name,
        expected: param.kind.type_name(),
    };
    match param.kind {
        ParamKind::String { min_length } => {
            let text = value.as_str().ok_or_else(invalid_type)?;
            if text.chars().count() < min_length {
                return Err(InvocationError::TooShort {
                    name: param.name,
                    min_length,
                });
            }
        }
        ParamKind::Integer { minimum, maximum } => {
            let number = if value.is_i64() || value.is_u64() {
                value.as_i64()
            } else {
                return Err(invalid_type());
            };
            match number {
                Some(number) if (minimum..=maximum).contains(&number) => {}
                _ => {
                    return Err(InvocationError::OutOfRange {
                        name: param.name,
                        minimum,
                        maximum,
                    });
                }
            }
        }
        ParamKind::Boolean => {
            if !value.is_boolean() {
                return Err(invalid_type());
            }
        }
    }
    Ok(())
}

/// A call rejected before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    UnknownTool(String),
    NotAnObject,
    UnknownProperty(String),
    MissingProperty(&'static str),
    InvalidType {
        name: &'static str,
        expected: &'static str,
    },
    TooShort {
        name: &'static str,
        min_length: usize,
    },
    OutOfRange {
        name: &'static str,
        minimum: i64,
        maximum: i64,
    },
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::NotAnObject => write!(f, "arguments must be a JSON object"),
            Self::UnknownProperty(name) => write!(f, "unexpected property: {name}"),
            Self::MissingProperty(name) => write!(f, "{name} is required"),
            Self::InvalidType { name, expected } => write!(f, "{name} must be a {expected}"),
            Self::TooShort { name, min_length } => {
                write!(f, "{name} must be at least {min_length} character(s)")
            }
            Self::OutOfRange {
                name,
                minimum,
                maximum,
            } => write!(f, "{name} must be between {minimum} and {maximum}"),
        }
    }
}

impl Error for InvocationError {}
