use serde_json::Value;

/// Queries a dotted path such as `a.b.0.c` inside a JSON value.
/// Returns `None` when any segment is missing or not traversable
pub fn query<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
	let mut current = value;
	for segment in path.split('.') {
		current = match current {
			Value::Object(map) => map.get(segment)?,
			Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current)
}

/// Renders a primitive value the way it appears inside a command: strings
/// bare, numbers and booleans in their JSON form
pub fn render_primitive(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(num) => Some(num.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		_ => None,
	}
}

/// JSON text of any value with every whitespace character removed.
/// Used by the force-stringify escape hatch for non-primitive values
pub fn stringify_compact(value: &Value) -> String {
	value
		.to_string()
		.chars()
		.filter(|c| !c.is_whitespace())
		.collect()
}

/// Name of a value's JSON type, for error messages
pub fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_query() {
		let value = json!({"a": {"b": [1, 2, {"c": "deep"}]}});
		assert_eq!(query(&value, "a.b.1"), Some(&json!(2)));
		assert_eq!(query(&value, "a.b.2.c"), Some(&json!("deep")));
		assert_eq!(query(&value, "a.missing"), None);
		assert_eq!(query(&value, "a.b.9"), None);
	}

	#[test]
	fn test_render_primitive() {
		assert_eq!(render_primitive(&json!("hi")), Some("hi".into()));
		assert_eq!(render_primitive(&json!(123)), Some("123".into()));
		assert_eq!(render_primitive(&json!(true)), Some("true".into()));
		assert_eq!(render_primitive(&json!(null)), None);
		assert_eq!(render_primitive(&json!([1])), None);
	}

	#[test]
	fn test_stringify_compact() {
		let value = json!({"a": [1, 2], "b": "x y"});
		assert_eq!(stringify_compact(&value), "{\"a\":[1,2],\"b\":\"xy\"}");
	}
}
