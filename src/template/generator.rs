use std::path::{Path, PathBuf};

use anyhow::Context;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::common::{Env, Rows};
use crate::error::BuildError;
use crate::parse::extract_placeholders;
use crate::project::BuildSettings;
use crate::substitute::{substitute_document, substitute_str};

use super::Manifest;

/// One concrete (environment, document) pair produced by expanding a
/// generator template
#[derive(Debug)]
pub struct Definition {
	pub document: Value,
	pub env: Env,
}

/// A template that expands its per-file JSON definitions combinatorially
/// over the named iterator tables of its manifest
#[derive(Debug)]
pub struct GeneratorTemplate {
	pub root: PathBuf,
	pub iterators: FxHashMap<String, Rows>,
	pub definitions: FxHashMap<String, Definition>,
}

impl GeneratorTemplate {
	pub fn load(root: PathBuf, manifest: Manifest, settings: &BuildSettings) -> anyhow::Result<Self> {
		let mut template = Self {
			iterators: manifest.iterators.unwrap_or_default(),
			definitions: FxHashMap::default(),
			root,
		};

		let dir = template.root.join("definitions");
		if !dir.is_dir() {
			warn!(root = %template.root.display(), "template has no definitions");
			return Ok(template);
		}

		let mut entries: Vec<_> = std::fs::read_dir(&dir)
			.with_context(|| format!("Failed to read {}", dir.display()))?
			.collect::<Result<_, _>>()
			.context("Failed to read a definitions entry")?;
		entries.sort_by_key(|entry| entry.file_name());

		for entry in entries {
			let path = entry.path();
			if !path.is_file() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			let data = std::fs::read_to_string(&path)
				.with_context(|| format!("Failed to read {}", path.display()))?;
			let document: Value = serde_json::from_str(&data)
				.map_err(|err| BuildError::validation(path.display().to_string(), err))?;

			let tokens = extract_placeholders(&name);
			if tokens.is_empty() {
				template.definitions.insert(
					name,
					Definition {
						document,
						env: Env::new(),
					},
				);
			} else {
				expand_using_iterators(
					&template.iterators,
					&mut template.definitions,
					&path,
					&name,
					&tokens,
					&document,
					settings,
				)?;
			}
		}

		for (name, definition) in template.definitions.iter_mut() {
			derive_env(name, definition);
		}

		Ok(template)
	}
}

/// Expands one definition file whose name references iterators. Index
/// combinations count in mixed-radix order, the rightmost identifier
/// varying fastest, and `i` numbers the emitted definitions in that order
fn expand_using_iterators(
	iterators: &FxHashMap<String, Rows>,
	definitions: &mut FxHashMap<String, Definition>,
	path: &Path,
	name: &str,
	tokens: &[String],
	document: &Value,
	settings: &BuildSettings,
) -> anyhow::Result<()> {
	let scope = path.display().to_string();

	let mut identifiers = Vec::with_capacity(tokens.len());
	let mut resolved: Vec<&Rows> = Vec::with_capacity(tokens.len());

	for token in tokens {
		let (identifier, fixed) = match token.split_once('.') {
			Some((identifier, fixed)) => (identifier, Some(fixed)),
			None => (token.as_str(), None),
		};

		let Some(rows) = iterators.get(identifier) else {
			return Err(BuildError::validation(
				scope.clone(),
				format!("undefined iterator {identifier:?}"),
			)
			.into());
		};
		if rows.is_empty() {
			return Err(BuildError::validation(
				scope.clone(),
				format!("iterator {identifier:?} has no rows"),
			)
			.into());
		}
		if let Some(fixed) = fixed {
			let index: usize = fixed.parse().map_err(|_| {
				BuildError::syntax(
					scope.clone(),
					format!("invalid column index {fixed:?} in %[{token}]"),
				)
			})?;
			if index >= rows[0].len() {
				return Err(BuildError::validation(
					scope.clone(),
					format!("index {index} is out of range of {:?}", rows[0]),
				)
				.into());
			}
		}

		identifiers.push(identifier);
		resolved.push(rows);
	}

	let combinations = resolved
		.iter()
		.map(|rows| rows.iter())
		.multi_cartesian_product();

	for (n, combination) in combinations.enumerate() {
		let mut env = Env::new();
		for (identifier, column) in identifiers.iter().zip(&combination) {
			env.set_iterator(identifier.to_string(), (*column).clone());
		}

		let key = substitute_str(name, &env, settings)
			.map_err(|err| BuildError::format(scope.clone(), format!("{err:#}")))?;
		env.set_var("i", n as u64);

		let mut document = document.clone();
		substitute_document(&mut document, &env, settings)
			.map_err(|err| BuildError::format(scope.clone(), format!("{err:#}")))?;

		let definition = Definition { document, env };
		if definitions.insert(key.clone(), definition).is_some() {
			// two combinations rendered the same filename: last writer wins
			debug!(%key, "definition overwritten by a later combination");
		}
	}

	Ok(())
}

fn derive_env(name: &str, definition: &mut Definition) {
	let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
	definition.env.set_var("id", stem);
	definition.env.set_var("filename", name);
	if let Value::Object(map) = &definition.document {
		for (key, value) in map {
			definition.env.variables.insert(key.clone(), value.clone());
		}
	}
}
