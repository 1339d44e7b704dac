//! Structural validation of raw topology documents.
//!
//! Runs on the untyped JSON value so every missing or mistyped field is
//! reported in one pass. Categories are checked in a fixed order
//! (networks, instances, routers) and fields in declaration order, which
//! keeps error ordering deterministic. Nothing here looks at another
//! entity's data.

use serde_json::{Map, Value};
use tracing::debug;

use crate::result::ValidationResult;

/// Top-level keys every topology document must carry.
pub const REQUIRED_KEYS: [&str; 3] = ["instances", "networks", "routers"];

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    String,
    NonEmptyString,
    Integer { min: u64 },
    Number { min: f64 },
    Bool,
    StringArray,
    StringOrBool,
    ObjectArray(&'static [FieldRule]),
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::String => "a string".to_string(),
            FieldKind::NonEmptyString => "a non-empty string".to_string(),
            FieldKind::Integer { min } => format!("an integer >= {}", min),
            FieldKind::Number { min } => format!("a number >= {}", min),
            FieldKind::Bool => "a boolean".to_string(),
            FieldKind::StringArray => "an array of strings".to_string(),
            FieldKind::StringOrBool => "a string or boolean".to_string(),
            FieldKind::ObjectArray(_) => "an array of objects".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    key: &'static str,
    alias: Option<&'static str>,
    kind: FieldKind,
    required: bool,
    nullable: bool,
}

impl FieldRule {
    const fn required(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            alias: None,
            kind,
            required: true,
            nullable: false,
        }
    }

    const fn optional(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            alias: None,
            kind,
            required: false,
            nullable: false,
        }
    }

    const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }
}

const ATTACHMENT_FIELDS: &[FieldRule] = &[
    FieldRule::required("name", FieldKind::NonEmptyString).alias("network_name"),
    FieldRule::required("ip", FieldKind::NonEmptyString),
];

const POOL_FIELDS: &[FieldRule] = &[
    FieldRule::required("start", FieldKind::NonEmptyString),
    FieldRule::required("end", FieldKind::NonEmptyString),
];

const ROUTE_FIELDS: &[FieldRule] = &[
    FieldRule::required("destination", FieldKind::NonEmptyString).alias("destination_cidr"),
    FieldRule::required("nexthop", FieldKind::NonEmptyString),
];

const NETWORK_FIELDS: &[FieldRule] = &[
    FieldRule::required("name", FieldKind::NonEmptyString),
    FieldRule::required("cidr", FieldKind::NonEmptyString),
    FieldRule::optional("gateway_ip", FieldKind::String).nullable(),
    FieldRule::optional("enable_dhcp", FieldKind::Bool),
    FieldRule::optional("pool", FieldKind::ObjectArray(POOL_FIELDS)),
];

const INSTANCE_FIELDS: &[FieldRule] = &[
    FieldRule::required("name", FieldKind::NonEmptyString),
    FieldRule::required("image", FieldKind::NonEmptyString),
    FieldRule::required("cpu", FieldKind::Integer { min: 1 }),
    FieldRule::required("ram", FieldKind::Number { min: 0.5 }),
    FieldRule::required("disk", FieldKind::Integer { min: 1 }),
    FieldRule::required("networks", FieldKind::ObjectArray(ATTACHMENT_FIELDS)),
    FieldRule::optional("keypair", FieldKind::String).nullable(),
    FieldRule::optional("security_groups", FieldKind::StringArray),
    FieldRule::optional("floating_ip", FieldKind::StringOrBool).nullable(),
    FieldRule::optional("cloud_init", FieldKind::String).nullable(),
];

const ROUTER_FIELDS: &[FieldRule] = &[
    FieldRule::required("name", FieldKind::NonEmptyString),
    FieldRule::required("networks", FieldKind::ObjectArray(ATTACHMENT_FIELDS)),
    FieldRule::required("external", FieldKind::Bool),
    FieldRule::optional("routes", FieldKind::ObjectArray(ROUTE_FIELDS)),
];

/// Validator for the structure of topology documents.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate a raw topology document. Never fails fast: the result holds
    /// every structural error found.
    pub fn validate(document: &Value) -> ValidationResult {
        let mut result = ValidationResult::new();

        let Some(root) = document.as_object() else {
            result.add_error("root: expected a JSON object");
            return result;
        };

        for key in REQUIRED_KEYS {
            match root.get(key) {
                None => result.add_error(format!("root: missing required key '{}'", key)),
                Some(value) if !value.is_array() => result.add_error(format!(
                    "root.{}: expected an array, found {}",
                    key,
                    type_name(value)
                )),
                Some(_) => {}
            }
        }
        for key in root.keys() {
            if !REQUIRED_KEYS.contains(&key.as_str()) {
                result.add_warning(format!("root: unknown key '{}' is ignored", key));
            }
        }

        Self::validate_category(root, "networks", NETWORK_FIELDS, &mut result);
        Self::validate_category(root, "instances", INSTANCE_FIELDS, &mut result);
        Self::validate_category(root, "routers", ROUTER_FIELDS, &mut result);

        debug!(
            "Schema validation finished: {} errors, {} warnings",
            result.errors.len(),
            result.warnings.len()
        );
        result
    }

    fn validate_category(
        root: &Map<String, Value>,
        key: &str,
        rules: &[FieldRule],
        result: &mut ValidationResult,
    ) {
        let Some(items) = root.get(key).and_then(Value::as_array) else {
            return;
        };
        for (index, item) in items.iter().enumerate() {
            let path = entity_path(key, index, item);
            Self::validate_object(&path, item, rules, result);
        }
    }

    fn validate_object(path: &str, item: &Value, rules: &[FieldRule], result: &mut ValidationResult) {
        let Some(object) = item.as_object() else {
            result.add_error(format!("{}: expected an object, found {}", path, type_name(item)));
            return;
        };

        for rule in rules {
            let value = object
                .get(rule.key)
                .or_else(|| rule.alias.and_then(|alias| object.get(alias)));
            match value {
                None if rule.required => {
                    result.add_error(format!("{}: missing required field '{}'", path, rule.key));
                }
                None => {}
                Some(Value::Null) if rule.nullable => {}
                Some(value) => Self::validate_field(path, rule, value, result),
            }
        }

        for key in object.keys() {
            let known = rules
                .iter()
                .any(|rule| rule.key == key || rule.alias == Some(key.as_str()));
            if !known {
                result.add_warning(format!("{}: unknown field '{}' is ignored", path, key));
            }
        }
    }

    fn validate_field(path: &str, rule: &FieldRule, value: &Value, result: &mut ValidationResult) {
        let field_path = format!("{}.{}", path, rule.key);
        let ok = match rule.kind {
            FieldKind::String => value.is_string(),
            FieldKind::NonEmptyString => value.as_str().map_or(false, |s| !s.trim().is_empty()),
            FieldKind::Integer { min } => value
                .as_u64()
                .map_or(false, |n| n >= min && n <= u64::from(u32::MAX)),
            FieldKind::Number { min } => value.as_f64().map_or(false, |n| n >= min),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::StringArray => value
                .as_array()
                .map_or(false, |items| items.iter().all(Value::is_string)),
            FieldKind::StringOrBool => value.is_string() || value.is_boolean(),
            FieldKind::ObjectArray(nested) => match value.as_array() {
                Some(items) => {
                    for (index, item) in items.iter().enumerate() {
                        let nested_path = format!("{}[{}]", field_path, index);
                        Self::validate_object(&nested_path, item, nested, result);
                    }
                    true
                }
                None => false,
            },
        };

        if !ok {
            result.add_error(format!(
                "{}: expected {}, found {}",
                field_path,
                rule.kind.describe(),
                describe_value(value)
            ));
        }
    }
}

fn entity_path(category: &str, index: usize, item: &Value) -> String {
    match item.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => format!("{}[{}] '{}'", category, index, name),
        _ => format!("{}[{}]", category, index),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("number {}", n),
        Value::String(s) if s.trim().is_empty() => "empty string".to_string(),
        other => type_name(other).to_string(),
    }
}
