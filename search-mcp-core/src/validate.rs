// search-mcp-core/src/validate.rs
// ============================================================================
// Module: Parameter Validation
// Description: Schema-lite constraint checks for tool parameters.
// Purpose: Reject malformed tool arguments before dispatch, fail closed.
// Dependencies: regex, serde_json
// ============================================================================

//! ## Overview
//! Tool parameters are validated against a small constraint vocabulary:
//! type, required, enum, pattern, numeric range, and length bounds. Unknown
//! parameters are rejected. Validation accumulates every error so callers see
//! the full list in one pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::AggregatorError;

// ============================================================================
// SECTION: Parameter Specs
// ============================================================================

/// Accepted parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// Plain JSON object.
    Object,
    /// JSON array.
    Array,
}

impl ParamType {
    /// Returns the lowercase label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Declarative constraint set for one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Expected type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Required when true; optional parameters may be absent.
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    /// Description surfaced in tool listings.
    pub description: String,
    /// Allowed values for strings and numbers.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Regex the string value must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Inclusive numeric lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum string length or array item count.
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length or array item count.
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Default applied by the handler when the parameter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip predicate signature")]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ParamSpec {
    /// Builds a minimal optional parameter spec.
    #[must_use]
    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            description: description.to_string(),
            enum_values: None,
            pattern: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            default: None,
        }
    }

    /// Builds a minimal required parameter spec.
    #[must_use]
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: true,
            ..Self::optional(name, param_type, description)
        }
    }

    /// Returns a copy restricted to the given enum values.
    #[must_use]
    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|value| Value::from(*value)).collect());
        self
    }

    /// Returns a copy with a numeric range constraint.
    #[must_use]
    pub const fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    /// Returns a copy with a default value recorded for listings.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates arguments against the parameter specs, returning every error.
#[must_use]
pub fn validate_params(specs: &[ParamSpec], arguments: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    for spec in specs {
        match arguments.get(&spec.name) {
            Some(value) => validate_value(spec, value, &mut errors),
            None => {
                if spec.required {
                    errors.push(format!("Required parameter missing: {}", spec.name));
                }
            }
        }
    }
    for name in arguments.keys() {
        if !specs.iter().any(|spec| spec.name == *name) {
            errors.push(format!("Unknown parameter: {name}"));
        }
    }
    errors
}

/// Validates arguments and wraps failures in a single validation error.
///
/// # Errors
///
/// Returns [`AggregatorError::ValidationError`] listing every violation.
pub fn validate_or_reject(
    specs: &[ParamSpec],
    arguments: &Map<String, Value>,
) -> Result<(), AggregatorError> {
    let errors = validate_params(specs, arguments);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AggregatorError::validation_failed(errors))
    }
}

fn validate_value(spec: &ParamSpec, value: &Value, errors: &mut Vec<String>) {
    match spec.param_type {
        ParamType::String => validate_string(spec, value, errors),
        ParamType::Number => validate_number(spec, value, errors),
        ParamType::Boolean => {
            if !value.is_boolean() {
                errors.push(type_error(spec));
            }
        }
        ParamType::Object => {
            if !value.is_object() {
                errors.push(type_error(spec));
            }
        }
        ParamType::Array => validate_array(spec, value, errors),
    }
}

fn validate_string(spec: &ParamSpec, value: &Value, errors: &mut Vec<String>) {
    let Some(text) = value.as_str() else {
        errors.push(type_error(spec));
        return;
    };
    if let Some(allowed) = &spec.enum_values
        && !allowed.iter().any(|candidate| candidate.as_str() == Some(text))
    {
        errors.push(format!("Parameter {} must be one of {}", spec.name, enum_labels(allowed)));
    }
    if let Some(pattern) = &spec.pattern {
        match Regex::new(pattern) {
            Ok(regex) => {
                if !regex.is_match(text) {
                    errors.push(format!("Parameter {} does not match pattern {pattern}", spec.name));
                }
            }
            Err(_) => {
                errors.push(format!("Parameter {} has an invalid pattern: {pattern}", spec.name));
            }
        }
    }
    let length = text.chars().count();
    if let Some(min) = spec.min_length
        && length < min
    {
        errors.push(format!("Parameter {} must have at least {min} characters", spec.name));
    }
    if let Some(max) = spec.max_length
        && length > max
    {
        errors.push(format!("Parameter {} must have at most {max} characters", spec.name));
    }
}

fn validate_number(spec: &ParamSpec, value: &Value, errors: &mut Vec<String>) {
    let Some(number) = value.as_f64() else {
        errors.push(type_error(spec));
        return;
    };
    if number.is_nan() {
        errors.push(format!("Parameter {} must be a finite number", spec.name));
        return;
    }
    if let Some(allowed) = &spec.enum_values
        && !allowed.iter().any(|candidate| candidate.as_f64() == Some(number))
    {
        errors.push(format!("Parameter {} must be one of {}", spec.name, enum_labels(allowed)));
    }
    if let Some(minimum) = spec.minimum
        && number < minimum
    {
        errors.push(format!("Parameter {} must be at least {minimum}", spec.name));
    }
    if let Some(maximum) = spec.maximum
        && number > maximum
    {
        errors.push(format!("Parameter {} must be at most {maximum}", spec.name));
    }
}

fn validate_array(spec: &ParamSpec, value: &Value, errors: &mut Vec<String>) {
    let Some(items) = value.as_array() else {
        errors.push(type_error(spec));
        return;
    };
    if let Some(min) = spec.min_length
        && items.len() < min
    {
        errors.push(format!("Parameter {} must have at least {min} items", spec.name));
    }
    if let Some(max) = spec.max_length
        && items.len() > max
    {
        errors.push(format!("Parameter {} must have at most {max} items", spec.name));
    }
}

fn type_error(spec: &ParamSpec) -> String {
    format!("Parameter {} must be of type {}", spec.name, spec.param_type.label())
}

fn enum_labels(allowed: &[Value]) -> String {
    let labels: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    labels.join(", ")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
