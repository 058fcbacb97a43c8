pub mod generator;
pub mod inline;

use std::path::Path;

use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::Rows;
use crate::error::BuildError;
use crate::project::BuildSettings;

use self::generator::GeneratorTemplate;
use self::inline::InlineTemplate;

/// Marks a line inside an mcfunction body as an inline template invocation
pub const INLINE_CALL_PREFIX: &str = "#~>";

/// The splice point for captured lines inside a snippet body
pub const BODY_MARKER: &str = "%[...]";

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const SNIPPET_FILENAME: &str = "snippet.mcfunction";

pub fn is_inline_call(line: &str) -> bool {
	line.starts_with(INLINE_CALL_PREFIX)
}

/// Parsed `manifest.json` of a template directory
#[derive(Debug, Deserialize)]
pub struct Manifest {
	#[serde(rename = "type")]
	pub kind: ManifestKind,
	/// Named arguments of an inline template. Absent or null means the
	/// template takes the raw call-line text as one pass-through argument
	#[serde(default)]
	pub arguments: Option<Vec<String>>,
	#[serde(default)]
	pub iterators: Option<FxHashMap<String, Rows>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
	Inline,
	Generate,
}

/// A loaded template, dispatched by the manifest `type` field
pub enum Template {
	Inline(InlineTemplate),
	Generator(GeneratorTemplate),
}

impl Template {
	pub fn load(dir: &Path, settings: &BuildSettings) -> anyhow::Result<Self> {
		let manifest_path = dir.join(MANIFEST_FILENAME);
		let data = std::fs::read_to_string(&manifest_path)
			.with_context(|| format!("Failed to read {}", manifest_path.display()))?;
		let manifest: Manifest = serde_json::from_str(&data)
			.map_err(|err| BuildError::validation(manifest_path.display().to_string(), err))?;

		match manifest.kind {
			ManifestKind::Inline => Ok(Self::Inline(InlineTemplate::load(dir, manifest)?)),
			ManifestKind::Generate => Ok(Self::Generator(GeneratorTemplate::load(
				dir.to_path_buf(),
				manifest,
				settings,
			)?)),
		}
	}
}

/// Every template of a project, loaded from the `templates` directory and
/// keyed by directory name
#[derive(Default)]
pub struct TemplateSet {
	pub inline: FxHashMap<String, InlineTemplate>,
	pub generators: FxHashMap<String, GeneratorTemplate>,
}

impl TemplateSet {
	pub fn load(root: &Path, settings: &BuildSettings) -> anyhow::Result<Self> {
		let mut set = Self::default();

		let dir = root.join("templates");
		if !dir.is_dir() {
			debug!("no templates directory");
			return Ok(set);
		}

		let mut entries: Vec<_> = std::fs::read_dir(&dir)
			.with_context(|| format!("Failed to read {}", dir.display()))?
			.collect::<Result<_, _>>()
			.context("Failed to read a templates entry")?;
		entries.sort_by_key(|entry| entry.file_name());

		for entry in entries {
			if !entry.path().is_dir() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			debug!(name = %name, "loading template");
			match Template::load(&entry.path(), settings)? {
				Template::Inline(template) => {
					set.inline.insert(name, template);
				}
				Template::Generator(template) => {
					set.generators.insert(name, template);
				}
			}
		}

		info!(
			inline = set.inline.len(),
			generators = set.generators.len(),
			"loaded templates"
		);
		Ok(set)
	}
}
