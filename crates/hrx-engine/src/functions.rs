//! Global template functions

use minijinja::value::{Object, ObjectRepr, Rest};
use minijinja::{Error, ErrorKind, State, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum nesting of `tpl` calls
const MAX_TPL_DEPTH: usize = 10;

const TPL_DEPTH_KEY: &str = "__hrx_tpl_depth";

#[derive(Debug, Default)]
struct TplDepthCounter(AtomicUsize);

impl Object for TplDepthCounter {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Abort rendering with a message
///
/// Usage: {{ fail("Values.mode must be one of a, b") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Build a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(invalid(
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        let value = serde_json::to_value(&pair[1]).map_err(|e| invalid(e.to_string()))?;
        map.insert(key.to_string(), value);
    }
    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Usage: {{ get(Values, "key", "default") }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Walk nested keys, returning the last argument when any key is missing
///
/// Usage: {{ dig(Values, "a", "b", "fallback") }}
pub fn dig(obj: Value, keys_and_default: Rest<Value>) -> Result<Value, Error> {
    let args: &[Value] = &keys_and_default;
    let Some((default, keys)) = args.split_last() else {
        return Err(invalid("dig requires at least one key and a default value"));
    };

    let mut current = obj;
    for key in keys {
        let next = match key.as_str() {
            Some(name) => current.get_attr(name),
            None => current.get_item(key),
        };
        match next {
            Ok(v) if !v.is_undefined() && !v.is_none() => current = v,
            _ => return Ok(default.clone()),
        }
    }
    Ok(current)
}

/// First argument that is neither undefined, null nor an empty string
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|arg| {
            !(arg.is_undefined() || arg.is_none() || arg.as_str().is_some_and(str::is_empty))
        })
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("yes", "no", Values.enabled) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}

pub fn tostring(value: Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Printf-style formatting supporting %s, %d, %v and %%
///
/// Usage: {{ printf("%s-%s", Release.Name, Chart.Name) }}
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 8);
    let mut chars = format.chars();
    let mut remaining = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            None => result.push('%'),
            Some('%') => result.push('%'),
            Some(_) => {
                let arg = remaining
                    .next()
                    .ok_or_else(|| invalid("not enough arguments for format string"))?;
                result.push_str(&tostring(arg.clone()));
            }
        }
    }
    Ok(result)
}

/// Render a string as a template against `context`
///
/// Usage: {{ tpl(Values.hostTemplate, {"Release": Release}) }}
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template);
    }

    let counter = state.get_or_set_temp_object(TPL_DEPTH_KEY, TplDepthCounter::default);
    let depth = counter.0.fetch_add(1, Ordering::SeqCst) + 1;
    if depth > MAX_TPL_DEPTH {
        counter.0.fetch_sub(1, Ordering::SeqCst);
        return Err(invalid(format!(
            "tpl recursion depth exceeded maximum of {}",
            MAX_TPL_DEPTH
        )));
    }

    let result = state
        .env()
        .render_str(&template, context)
        .map_err(|e| invalid(format!("tpl error: {}", e)));
    counter.0.fetch_sub(1, Ordering::SeqCst);
    result
}
