use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use itertools::Itertools;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::BuildError;
use crate::mcfunction::{FunctionRegistry, Processor};
use crate::project::BuildSettings;
use crate::substitute::{substitute_document, substitute_str};
use crate::template::generator::{Definition, GeneratorTemplate};
use crate::template::TemplateSet;

type StagedFiles = Mutex<FxHashMap<String, Vec<u8>>>;

/// Everything one build produced: resolved function bodies, staged files
/// and the namespaces they reference
#[derive(Debug)]
pub struct BuildOutput {
	pub functions: FxHashMap<String, Vec<String>>,
	pub files: FxHashMap<String, Vec<u8>>,
	pub namespaces: Vec<String>,
}

/// Runs the whole generation pipeline over a project directory: loads the
/// template registry, processes the source pack's function folders and
/// expands every generator template over its definitions.
///
/// Independent units of work fan out over a worker pool and the stage
/// blocks until all of them finish; the first error wins
pub fn run_build(root: &Path, settings: &BuildSettings) -> anyhow::Result<BuildOutput> {
	let templates = TemplateSet::load(root, settings)?;
	let registry = FunctionRegistry::with_strict(settings.strict_functions);
	let staged: StagedFiles = Mutex::new(FxHashMap::default());

	process_source_pack(root, &templates, settings, &registry, &staged)?;

	for (name, template) in &templates.generators {
		info!(
			name = %name,
			definitions = template.definitions.len(),
			"generating from template"
		);
		apply_generator(template, &templates, settings, &registry, &staged)?;
	}

	let namespaces = registry.used_namespaces();
	info!(
		functions = registry.len(),
		namespaces = namespaces.len(),
		"generation finished"
	);

	Ok(BuildOutput {
		functions: registry.into_functions(),
		files: staged
			.into_inner()
			.unwrap_or_else(|poisoned| poisoned.into_inner()),
		namespaces,
	})
}

/// Processes the project's own `data` tree: every file under a function
/// folder goes through the processor, everything else is staged verbatim
fn process_source_pack(
	root: &Path,
	templates: &TemplateSet,
	settings: &BuildSettings,
	registry: &FunctionRegistry,
	staged: &StagedFiles,
) -> anyhow::Result<()> {
	let data = root.join("data");
	if !data.is_dir() {
		debug!("no data directory");
		return Ok(());
	}

	let mut paths = Vec::new();
	collect_files(&data, &mut paths)?;

	let mut function_files = Vec::new();
	let mut other_files = Vec::new();
	for path in paths {
		let rel = rel_string(root, &path)?;
		let folder = rel.split('/').nth(2);
		if matches!(folder, Some("function" | "functions")) && rel.ends_with(".mcfunction") {
			function_files.push((path, rel));
		} else {
			other_files.push((path, rel));
		}
	}

	info!(
		functions = function_files.len(),
		files = other_files.len(),
		"processing source pack"
	);

	function_files.par_iter().try_for_each(|(path, rel)| {
		let source = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read {}", path.display()))?;
		Processor::new(rel.as_str(), &templates.inline, settings).process(&source, registry)
	})?;

	for (path, rel) in other_files {
		let contents =
			std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
		lock_staged(staged).insert(rel, contents);
	}

	Ok(())
}

/// Applies one generator template: its `data` tree is loaded once and then
/// substituted per definition, one task per definition
fn apply_generator(
	template: &GeneratorTemplate,
	templates: &TemplateSet,
	settings: &BuildSettings,
	registry: &FunctionRegistry,
	staged: &StagedFiles,
) -> anyhow::Result<()> {
	let tree_root = template.root.join("data");
	if !tree_root.is_dir() {
		debug!(root = %template.root.display(), "template has no data tree");
		return Ok(());
	}

	let mut paths = Vec::new();
	collect_files(&tree_root, &mut paths)?;

	let mut files = Vec::new();
	for path in paths {
		let rel = format!("data/{}", rel_string(&tree_root, &path)?);
		let contents =
			std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
		files.push((rel, contents));
	}

	template
		.definitions
		.par_iter()
		.try_for_each(|(name, definition)| {
			debug!(definition = %name, "applying definition");
			for (rel, contents) in &files {
				apply_file(rel, contents, definition, templates, settings, registry, staged)?;
			}
			Ok(())
		})
}

fn apply_file(
	rel: &str,
	contents: &[u8],
	definition: &Definition,
	templates: &TemplateSet,
	settings: &BuildSettings,
	registry: &FunctionRegistry,
	staged: &StagedFiles,
) -> anyhow::Result<()> {
	let new_rel = substitute_str(rel, &definition.env, settings)
		.map_err(|err| BuildError::format(rel, format!("{err:#}")))?;

	let Ok(text) = std::str::from_utf8(contents) else {
		// binary payloads are staged untouched
		lock_staged(staged).insert(new_rel, contents.to_vec());
		return Ok(());
	};

	if new_rel.ends_with(".mcfunction") {
		let substituted = substitute_str(text, &definition.env, settings)
			.map_err(|err| BuildError::format(rel, format!("{err:#}")))?;
		return Processor::new(new_rel, &templates.inline, settings)
			.process(&substituted, registry);
	}

	if new_rel.ends_with(".json") {
		let mut document: Value =
			serde_json::from_str(text).map_err(|err| BuildError::validation(rel, err))?;
		substitute_document(&mut document, &definition.env, settings)
			.map_err(|err| BuildError::format(rel, format!("{err:#}")))?;
		let rendered =
			serde_json::to_string_pretty(&document).context("Failed to render a JSON document")?;
		lock_staged(staged).insert(new_rel, rendered.into_bytes());
		return Ok(());
	}

	let substituted = substitute_str(text, &definition.env, settings)
		.map_err(|err| BuildError::format(rel, format!("{err:#}")))?;
	lock_staged(staged).insert(new_rel, substituted.into_bytes());
	Ok(())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
	let mut entries: Vec<_> = std::fs::read_dir(dir)
		.with_context(|| format!("Failed to read {}", dir.display()))?
		.collect::<Result<_, _>>()
		.context("Failed to read a directory entry")?;
	entries.sort_by_key(|entry| entry.file_name());

	for entry in entries {
		let path = entry.path();
		if path.is_dir() {
			collect_files(&path, out)?;
		} else {
			out.push(path);
		}
	}
	Ok(())
}

fn rel_string(root: &Path, path: &Path) -> anyhow::Result<String> {
	let rel = path
		.strip_prefix(root)
		.context("walked path is under its root")?;
	Ok(rel
		.components()
		.map(|c| c.as_os_str().to_string_lossy())
		.join("/"))
}

fn lock_staged(staged: &StagedFiles) -> std::sync::MutexGuard<'_, FxHashMap<String, Vec<u8>>> {
	staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
