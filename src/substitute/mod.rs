use anyhow::{bail, Context};
use serde_json::{Map, Value};

use crate::common::value;
use crate::common::Env;
use crate::parse::extract_placeholders;
use crate::project::BuildSettings;

/// Expands every `%[...]` placeholder in the text against the environment.
/// Iterator keys resolve before variable keys; a `.suffix` selects a column
/// for iterators and queries a dotted path for variables. A lone `%` not
/// followed by `[` is copied through unchanged
pub fn substitute_str(input: &str, env: &Env, settings: &BuildSettings) -> anyhow::Result<String> {
	let mut out = String::with_capacity(input.len());
	let mut chars = input.chars().peekable();

	while let Some(c) = chars.next() {
		if c != '%' {
			out.push(c);
			continue;
		}
		if chars.peek() != Some(&'[') {
			out.push('%');
			continue;
		}
		chars.next();

		let mut token = String::new();
		let mut closed = false;
		for inner in chars.by_ref() {
			if inner == ']' {
				closed = true;
				break;
			}
			token.push(inner);
		}
		if !closed {
			bail!("unclosed placeholder %[{token}");
		}

		out.push_str(&resolve_token(&token, env, settings)?);
	}

	Ok(out)
}

fn resolve_token(token: &str, env: &Env, settings: &BuildSettings) -> anyhow::Result<String> {
	let (key, suffix) = match token.split_once('.') {
		Some((key, suffix)) => (key, Some(suffix)),
		None => (token, None),
	};

	if let Some(columns) = env.iterators.get(key) {
		let index = match suffix {
			Some(suffix) => suffix
				.parse::<usize>()
				.with_context(|| format!("invalid iterator index {suffix:?} in %[{token}]"))?,
			None => 0,
		};
		let Some(column) = columns.get(index) else {
			bail!("index {index} is out of range of {columns:?}");
		};
		return Ok(column.clone());
	}

	let Some(mut value) = env.variables.get(key) else {
		bail!("unknown variable {key:?}");
	};
	if let Some(path) = suffix {
		value = value::query(value, path)
			.with_context(|| format!("no field {path:?} in variable {key:?}"))?;
	}
	if let Some(text) = value::render_primitive(value) {
		return Ok(text);
	}
	if settings.force_stringify {
		return Ok(value::stringify_compact(value));
	}
	bail!(
		"simple substitution only supports primitive values, got ({}) {}",
		value::type_name(value),
		value
	);
}

/// Expands placeholders across a whole JSON document in place.
///
/// Keys are substituted in string mode; renames are collected during the
/// object scan and applied afterwards. A string value that is exactly one
/// placeholder is replaced by the bound value with its native type.
/// A `%[name?]` placeholder whose name is unbound removes the owning key
/// (or array element) instead of failing
pub fn substitute_document(doc: &mut Value, env: &Env, settings: &BuildSettings) -> anyhow::Result<()> {
	match doc {
		Value::Object(map) => substitute_object(map, env, settings),
		Value::Array(items) => substitute_array(items, env, settings),
		_ => Ok(()),
	}
}

fn substitute_object(
	map: &mut Map<String, Value>,
	env: &Env,
	settings: &BuildSettings,
) -> anyhow::Result<()> {
	let keys: Vec<String> = map.keys().cloned().collect();
	let mut renames: Vec<(String, String)> = Vec::new();

	for key in keys {
		let new_key = substitute_str(&key, env, settings)?;

		let smart = match map
			.get_mut(&key)
			.expect("scanned key is present in the object")
		{
			Value::String(text) => {
				let text = text.clone();
				Some(substitute_smart(&text, env, settings)?)
			}
			Value::Array(items) => {
				substitute_array(items, env, settings)?;
				None
			}
			Value::Object(inner) => {
				substitute_object(inner, env, settings)?;
				None
			}
			_ => None,
		};

		match smart {
			Some(Smart::Replace(new_value)) => {
				map.insert(key.clone(), new_value);
			}
			Some(Smart::Remove) => {
				map.remove(&key);
				continue;
			}
			None => {}
		}

		if new_key != key {
			renames.push((key, new_key));
		}
	}

	for (old, new) in renames {
		if let Some(value) = map.remove(&old) {
			map.insert(new, value);
		}
	}

	Ok(())
}

fn substitute_array(
	items: &mut Vec<Value>,
	env: &Env,
	settings: &BuildSettings,
) -> anyhow::Result<()> {
	let mut index = 0;
	while index < items.len() {
		let smart = match &mut items[index] {
			Value::String(text) => {
				let text = text.clone();
				Some(substitute_smart(&text, env, settings)?)
			}
			Value::Array(inner) => {
				substitute_array(inner, env, settings)?;
				None
			}
			Value::Object(map) => {
				substitute_object(map, env, settings)?;
				None
			}
			_ => None,
		};

		match smart {
			Some(Smart::Replace(value)) => {
				items[index] = value;
				index += 1;
			}
			Some(Smart::Remove) => {
				items.remove(index);
			}
			None => index += 1,
		}
	}
	Ok(())
}

enum Smart {
	Replace(Value),
	Remove,
}

/// A string value that consists of exactly one placeholder is replaced with
/// the bound value's native type; anything else stays a string and goes
/// through plain substitution
fn substitute_smart(text: &str, env: &Env, settings: &BuildSettings) -> anyhow::Result<Smart> {
	let placeholders = extract_placeholders(text);
	let is_smart = placeholders.len() == 1 && text.len() == placeholders[0].len() + "%[]".len();

	if !is_smart {
		return Ok(Smart::Replace(Value::String(substitute_str(
			text, env, settings,
		)?)));
	}

	let token = placeholders[0].strip_suffix('?');
	let optional = token.is_some();
	let token = token.unwrap_or(placeholders[0].as_str());

	let (key, suffix) = match token.split_once('.') {
		Some((key, suffix)) => (key, Some(suffix)),
		None => (token, None),
	};

	if let Some(columns) = env.iterators.get(key) {
		let index = match suffix {
			Some(suffix) => suffix
				.parse::<usize>()
				.with_context(|| format!("invalid iterator index {suffix:?} in %[{token}]"))?,
			None => 0,
		};
		let Some(column) = columns.get(index) else {
			bail!("index {index} is out of range of {columns:?}");
		};
		return Ok(Smart::Replace(Value::String(column.clone())));
	}

	let Some(mut value) = env.variables.get(key) else {
		if optional {
			return Ok(Smart::Remove);
		}
		bail!("unknown variable {key:?}");
	};
	if let Some(path) = suffix {
		value = value::query(value, path)
			.with_context(|| format!("no field {path:?} in variable {key:?}"))?;
	}

	Ok(Smart::Replace(value.clone()))
}
