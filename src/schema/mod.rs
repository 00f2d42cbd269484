//! Frontmatter schema validation.
//!
//! Declares a typed shape for a content collection's frontmatter and
//! validates/coerces parsed TOML/YAML frontmatter (represented as
//! [`serde_json::Value`] after the parser normalizes it) against that
//! shape. Never raises: every failure is folded into a [`ValidationResult`].

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A field's declared type.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Bool,
    Date,
    DateTime,
    List(Box<FieldType>),
    Map,
    Optional(Box<FieldType>),
    /// Tried in declaration order; the first variant that coerces wins.
    Union(Vec<FieldType>),
    Nested(String),
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    /// No default means the field is required.
    pub default: Option<Value>,
}

impl FieldSchema {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType, default: Value) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: Some(default),
        }
    }
}

/// How an unknown (undeclared) field is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraPolicy {
    /// Unknown fields produce a validation error.
    Strict,
    /// Unknown fields are silently dropped.
    Ignore,
    /// Unknown fields are kept, nested under an `_extra` key.
    AllowExtra,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub extra_policy: ExtraPolicy,
}

/// A named collection of schemas, so [`FieldType::Nested`] can resolve
/// sibling schemas by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.name.clone(), Arc::new(schema));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Outcome of validating one frontmatter document against a schema.
/// Never constructed from a panic/raise path — always returned.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
    /// The coerced document, present even when there are errors (lenient
    /// mode keeps going and returns the best-effort coercion alongside
    /// the error list; strict mode callers should check `is_valid()`
    /// before trusting `value`).
    pub value: Value,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

const DEFAULT_MAX_DEPTH: usize = 10;

/// Validate `input` (expected to be a JSON object) against `schema`.
pub fn validate(schema: &Schema, input: &Value, registry: &SchemaRegistry) -> ValidationResult {
    validate_with_depth(schema, input, registry, DEFAULT_MAX_DEPTH)
}

pub fn validate_with_depth(
    schema: &Schema,
    input: &Value,
    registry: &SchemaRegistry,
    max_depth: usize,
) -> ValidationResult {
    let mut errors = Vec::new();
    let Some(input_obj) = input.as_object() else {
        errors.push(FieldError {
            field: schema.name.clone(),
            message: "expected a mapping".to_string(),
        });
        return ValidationResult {
            errors,
            value: Value::Null,
        };
    };

    let mut out = Map::new();
    let mut seen = std::collections::HashSet::new();

    for field in &schema.fields {
        seen.insert(field.name.as_str());
        let raw = input_obj.get(&field.name);
        match raw {
            None => match &field.default {
                Some(default) => {
                    out.insert(field.name.clone(), default.clone());
                }
                None => errors.push(FieldError {
                    field: field.name.clone(),
                    message: "required field is missing".to_string(),
                }),
            },
            Some(value) => match coerce(&field.field_type, value, registry, max_depth) {
                Ok(coerced) => {
                    out.insert(field.name.clone(), coerced);
                }
                Err(message) => errors.push(FieldError {
                    field: field.name.clone(),
                    message,
                }),
            },
        }
    }

    let mut extras = Map::new();
    for (key, value) in input_obj {
        if seen.contains(key.as_str()) {
            continue;
        }
        match schema.extra_policy {
            ExtraPolicy::Strict => errors.push(FieldError {
                field: key.clone(),
                message: "unknown field".to_string(),
            }),
            ExtraPolicy::Ignore => {}
            ExtraPolicy::AllowExtra => {
                extras.insert(key.clone(), value.clone());
            }
        }
    }
    if schema.extra_policy == ExtraPolicy::AllowExtra && !extras.is_empty() {
        out.insert("_extra".to_string(), Value::Object(extras));
    }

    ValidationResult {
        errors,
        value: Value::Object(out),
    }
}

fn coerce(
    field_type: &FieldType,
    value: &Value,
    registry: &SchemaRegistry,
    depth_remaining: usize,
) -> Result<Value, String> {
    match field_type {
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err("expected a string".to_string()),
        },
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| "expected an integer".to_string()),
            _ => Err("expected an integer".to_string()),
        },
        FieldType::Float => match value {
            Value::Number(n) => Ok(Value::Number(
                serde_json::Number::from_f64(n.as_f64().unwrap_or(0.0))
                    .unwrap_or_else(|| serde_json::Number::from(0)),
            )),
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "expected a float".to_string()),
            _ => Err("expected a float".to_string()),
        },
        FieldType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => coerce_bool_str(s)
                .map(Value::Bool)
                .ok_or_else(|| format!("cannot coerce `{s}` to a boolean")),
            _ => Err("expected a boolean".to_string()),
        },
        FieldType::Date | FieldType::DateTime => match value {
            Value::String(s) if crate::utils::date::DateTimeUtc::parse(s).is_some() => {
                Ok(value.clone())
            }
            _ => Err("expected an ISO-8601 date".to_string()),
        },
        FieldType::List(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    // List elements do not consume depth budget.
                    out.push(
                        coerce(inner, item, registry, depth_remaining)
                            .map_err(|e| format!("item {i}: {e}"))?,
                    );
                }
                Ok(Value::Array(out))
            }
            _ => Err("expected a list".to_string()),
        },
        FieldType::Map => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err("expected a mapping".to_string()),
        },
        FieldType::Optional(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                coerce(inner, value, registry, depth_remaining)
            }
        }
        FieldType::Union(variants) => {
            for variant in variants {
                if let Ok(v) = coerce(variant, value, registry, depth_remaining) {
                    return Ok(v);
                }
            }
            Err("value does not match any union variant".to_string())
        }
        FieldType::Nested(name) => {
            if depth_remaining == 0 {
                return Err("max schema nesting depth exceeded".to_string());
            }
            let nested_schema = registry
                .get(name)
                .ok_or_else(|| format!("unknown nested schema `{name}`"))?;
            let result =
                validate_with_depth(&nested_schema, value, registry, depth_remaining - 1);
            if result.is_valid() {
                Ok(result.value)
            } else {
                let message = result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(message)
            }
        }
    }
}

fn coerce_bool_str(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_schema() -> Schema {
        Schema {
            name: "post".into(),
            fields: vec![
                FieldSchema::required("title", FieldType::String),
                FieldSchema::optional("draft", FieldType::Bool, json!(false)),
            ],
            extra_policy: ExtraPolicy::Strict,
        }
    }

    #[test]
    fn required_field_missing_is_error() {
        let result = validate(&simple_schema(), &json!({}), &SchemaRegistry::new());
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].field, "title");
    }

    #[test]
    fn optional_field_uses_default() {
        let result = validate(
            &simple_schema(),
            &json!({"title": "Hello"}),
            &SchemaRegistry::new(),
        );
        assert!(result.is_valid());
        assert_eq!(result.value["draft"], json!(false));
    }

    #[test]
    fn bool_coerces_from_truthy_strings() {
        let result = validate(
            &simple_schema(),
            &json!({"title": "Hello", "draft": "yes"}),
            &SchemaRegistry::new(),
        );
        assert!(result.is_valid());
        assert_eq!(result.value["draft"], json!(true));
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let result = validate(
            &simple_schema(),
            &json!({"title": "Hello", "bogus": 1}),
            &SchemaRegistry::new(),
        );
        assert!(!result.is_valid());
    }

    #[test]
    fn allow_extra_nests_unknown_fields() {
        let mut schema = simple_schema();
        schema.extra_policy = ExtraPolicy::AllowExtra;
        let result = validate(
            &schema,
            &json!({"title": "Hello", "bogus": 1}),
            &SchemaRegistry::new(),
        );
        assert!(result.is_valid());
        assert_eq!(result.value["_extra"]["bogus"], json!(1));
    }

    #[test]
    fn list_items_do_not_consume_depth_budget() {
        let schema = Schema {
            name: "tags".into(),
            fields: vec![FieldSchema::required(
                "tags",
                FieldType::List(Box::new(FieldType::String)),
            )],
            extra_policy: ExtraPolicy::Strict,
        };
        let result = validate(&schema, &json!({"tags": ["a", "b", "c"]}), &SchemaRegistry::new());
        assert!(result.is_valid());
    }

    #[test]
    fn nested_schema_recursion_is_depth_bounded() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema {
            name: "self_ref".into(),
            fields: vec![FieldSchema::optional(
                "child",
                FieldType::Optional(Box::new(FieldType::Nested("self_ref".into()))),
                Value::Null,
            )],
            extra_policy: ExtraPolicy::Strict,
        });
        let schema = registry.get("self_ref").unwrap();

        // Build a chain deeper than max_depth.
        let mut value = json!({});
        for _ in 0..20 {
            value = json!({"child": value});
        }

        let result = validate_with_depth(&schema, &value, &registry, 3);
        assert!(!result.is_valid());
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.message.contains("depth exceeded"))
        );
    }

    #[test]
    fn union_tries_variants_in_order() {
        let schema = Schema {
            name: "value".into(),
            fields: vec![FieldSchema::required(
                "v",
                FieldType::Union(vec![FieldType::Integer, FieldType::String]),
            )],
            extra_policy: ExtraPolicy::Strict,
        };
        let result = validate(&schema, &json!({"v": "42"}), &SchemaRegistry::new());
        assert!(result.is_valid());
        // Integer variant is tried first and a numeric string coerces to it.
        assert_eq!(result.value["v"], json!(42));
    }
}
