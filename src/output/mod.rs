use std::path::Path;

use anyhow::{bail, Context};
use tracing::debug;

use crate::build::BuildOutput;

/// Folder name functions live under inside a namespace. Older game versions
/// use the pluralized form, handled by the legacy-folders setting
pub const FUNCTION_FOLDER: &str = "function";

/// Converts a pack-relative file path under a `data`/`assets` root into its
/// namespaced resource identifier, e.g.
/// `data/demo/function/gen/main.mcfunction` -> `demo:gen/main`.
/// Fewer than three segments past the root is an invariant violation
pub fn path_to_resource(path: &str) -> anyhow::Result<String> {
	let mut fields: Vec<&str> = path.split('/').collect();
	if let Some(index) = fields.iter().position(|f| *f == "data" || *f == "assets") {
		fields.drain(..=index);
	}
	if fields.len() < 3 {
		bail!("not enough path segments in {path:?} to form a resource");
	}

	let last = fields.last_mut().expect("at least three segments");
	if let Some((stem, _)) = last.rsplit_once('.') {
		*last = stem;
	}
	Ok(format!("{}:{}", fields[0], fields[2..].join("/")))
}

/// Converts a resource identifier back into a namespace-relative path, e.g.
/// (`function`, `demo:gen/main`) -> `demo/function/gen/main`
pub fn resource_to_path(folder: &str, resource: &str) -> anyhow::Result<String> {
	let Some((namespace, rest)) = resource.split_once(':') else {
		bail!("missing namespace in resource {resource:?}");
	};
	Ok(format!("{namespace}/{folder}/{rest}"))
}

/// Writes every generated function and staged file below the output
/// directory. The `data` tree of a previous build is removed first; output
/// already written by completed tasks of a failed build is never rolled back
pub fn write_pack(output: &BuildOutput, path: &Path) -> anyhow::Result<()> {
	let data_path = path.join("data");
	if data_path.exists() {
		std::fs::remove_dir_all(&data_path).context("Failed to remove stale data directory")?;
	}

	for (rel, lines) in &output.functions {
		let path = path.join(rel);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.with_context(|| format!("Failed to create directory for {rel}"))?;
		}
		std::fs::write(&path, lines.join("\n"))
			.with_context(|| format!("Failed to write function file {rel}"))?;
		debug!(path = %rel, lines = lines.len(), "wrote function");
	}

	for (rel, contents) in &output.files {
		let path = path.join(rel);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.with_context(|| format!("Failed to create directory for {rel}"))?;
		}
		std::fs::write(&path, contents).with_context(|| format!("Failed to write file {rel}"))?;
		debug!(path = %rel, "wrote file");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_path_to_resource() {
		assert_eq!(
			path_to_resource("data/demo/function/gen/main.mcfunction").unwrap(),
			"demo:gen/main"
		);
		assert_eq!(
			path_to_resource("out/data/demo/function/main.mcfunction").unwrap(),
			"demo:main"
		);
		assert!(path_to_resource("data/demo/function").is_err());
	}

	#[test]
	fn test_resource_to_path() {
		assert_eq!(
			resource_to_path("function", "demo:gen/main").unwrap(),
			"demo/function/gen/main"
		);
		assert!(resource_to_path("function", "no-namespace").is_err());
	}

	#[test]
	fn test_conversion_round_trips() {
		let path = "demo/function/a/b";
		let resource = path_to_resource(&format!("data/{path}.mcfunction")).unwrap();
		assert_eq!(resource_to_path(FUNCTION_FOLDER, &resource).unwrap(), path);

		let resource = "ns:segment/segment2";
		let path = resource_to_path(FUNCTION_FOLDER, resource).unwrap();
		assert_eq!(path_to_resource(&format!("data/{path}.mcfunction")).unwrap(), resource);
	}
}
