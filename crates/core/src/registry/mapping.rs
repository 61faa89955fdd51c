use serde_json::{Map, Number, Value};

use crate::domain::action::{ArgumentKind, ArgumentMapping, ArgumentRule, ArgumentSource};
use crate::errors::DispatchError;

pub type MappedArguments = Map<String, Value>;

impl ArgumentMapping {
    /// Projects caller parameters onto the target operation's argument list.
    ///
    /// Every rule yields exactly one key in the output; absent optional values become `null`.
    pub fn apply(
        &self,
        params: &Value,
        actor_id: Option<&str>,
    ) -> Result<MappedArguments, DispatchError> {
        let empty = Map::new();
        let params = match params {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(validation(
                    "params",
                    format!("parameters must be an object, got {}", json_type(other)),
                ))
            }
        };

        let mut mapped = Map::with_capacity(self.rules.len());
        for rule in &self.rules {
            let value = resolve(rule, params, actor_id)?;
            mapped.insert(rule.name.clone(), value);
        }
        Ok(mapped)
    }
}

fn resolve(
    rule: &ArgumentRule,
    params: &Map<String, Value>,
    actor_id: Option<&str>,
) -> Result<Value, DispatchError> {
    match &rule.source {
        ArgumentSource::ActorId => {
            Ok(actor_id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null))
        }
        ArgumentSource::AllParams => Ok(Value::Object(params.clone())),
        ArgumentSource::Param(key) => match params.get(key) {
            Some(value) if !value.is_null() => coerce(key, value, rule.kind),
            _ if rule.required => Err(validation(key, "required argument is missing")),
            _ => Ok(rule.default.clone().unwrap_or(Value::Null)),
        },
    }
}

fn coerce(field: &str, value: &Value, kind: ArgumentKind) -> Result<Value, DispatchError> {
    let coerced = match (kind, value) {
        (ArgumentKind::Any, value) => Some(value.clone()),
        (ArgumentKind::String, Value::String(_)) => Some(value.clone()),
        (ArgumentKind::String, Value::Number(number)) => Some(Value::String(number.to_string())),
        (ArgumentKind::String, Value::Bool(flag)) => Some(Value::String(flag.to_string())),
        (ArgumentKind::Integer, Value::Number(number)) => integer_from_number(number),
        (ArgumentKind::Integer, Value::String(text)) => {
            text.trim().parse::<i64>().ok().map(Value::from)
        }
        (ArgumentKind::Number, Value::Number(_)) => Some(value.clone()),
        (ArgumentKind::Number, Value::String(text)) => {
            text.trim().parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
        }
        (ArgumentKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ArgumentKind::Boolean, Value::String(text)) => match text.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (ArgumentKind::Object, Value::Object(_)) => Some(value.clone()),
        (ArgumentKind::Array, Value::Array(_)) => Some(value.clone()),
        _ => None,
    };

    coerced.ok_or_else(|| {
        validation(field, format!("expected {}, got {}", kind.as_str(), json_type(value)))
    })
}

fn integer_from_number(number: &Number) -> Option<Value> {
    if let Some(value) = number.as_i64() {
        return Some(Value::from(value));
    }
    number
        .as_f64()
        .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .map(|value| Value::from(value as i64))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validation(field: &str, reason: impl Into<String>) -> DispatchError {
    DispatchError::Validation { field: field.to_string(), reason: reason.into() }
}
