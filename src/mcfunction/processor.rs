use anyhow::{bail, Context};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{BuildError, SourceLine};
use crate::output::{path_to_resource, resource_to_path, FUNCTION_FOLDER};
use crate::parse::{extract_args, extract_resource, indent_of, indent_string, LineBuffer, LineCursor};
use crate::project::BuildSettings;
use crate::template::inline::InlineTemplate;
use crate::template::{is_inline_call, INLINE_CALL_PREFIX};

use super::registry::FunctionRegistry;

/// Processes one mcfunction source in two passes: inline template calls are
/// expanded into a flat line buffer, then indented blocks are lifted out
/// into their own function resources and flushed into the registry
pub struct Processor<'p> {
	path: String,
	templates: &'p FxHashMap<String, InlineTemplate>,
	settings: &'p BuildSettings,
}

impl<'p> Processor<'p> {
	pub fn new(
		path: impl Into<String>,
		templates: &'p FxHashMap<String, InlineTemplate>,
		settings: &'p BuildSettings,
	) -> Self {
		Self {
			path: path.into(),
			templates,
			settings,
		}
	}

	pub fn process(&self, source: &str, registry: &FunctionRegistry) -> anyhow::Result<()> {
		let mut buffer = LineBuffer::new();
		let mut cursor = LineCursor::new(source);
		self.expand_calls(&mut cursor, &mut buffer, 0, true)?;

		let resolved = self.resolve_blocks(&buffer)?;
		debug!(path = %self.path, functions = resolved.len(), "processed");

		for (path, lines) in resolved {
			if self.settings.legacy_folders {
				let mirror = path.replacen("/function/", "/functions/", 1);
				if mirror != path {
					registry.add_lines(&mirror, lines.clone())?;
				}
			}
			registry.add_lines(&path, lines)?;
		}
		Ok(())
	}

	/// Pass 1: recursive descent over the nesting. Each inline call captures
	/// its following indented block as an opaque sub-buffer, dispatches the
	/// template and splices the output at the call's indent
	fn expand_calls(
		&self,
		cursor: &mut LineCursor,
		out: &mut LineBuffer,
		base_indent: i64,
		is_root: bool,
	) -> anyhow::Result<()> {
		while let Some(raw_line) = cursor.peek() {
			let absolute_indent = indent_of(raw_line) as i64;
			let line_indent = absolute_indent - base_indent;
			let clean_line = raw_line.trim();

			if clean_line.is_empty() {
				cursor.next();
				out.push("");
				continue;
			}

			if line_indent <= 0 && !is_root {
				// this line belongs to the enclosing block
				return Ok(());
			}
			cursor.next();

			let rebased = line_indent.max(0) as usize;
			let aligned = format!("{}{}", indent_string(rebased), clean_line);

			if !is_inline_call(clean_line) {
				out.push(&aligned);
				continue;
			}

			let line_number = cursor.line_number();
			let contents = &clean_line[INLINE_CALL_PREFIX.len()..];
			let tokens = extract_args(contents);
			let Some(name) = tokens.first() else {
				return Err(self.err_empty_call(line_number, clean_line).into());
			};

			let Some(template) = self.templates.get(name) else {
				return Err(self.err_undefined_template(line_number, clean_line, name).into());
			};

			let call_args: Vec<String> = if template.is_passthrough() {
				let trailing = &contents.trim_start()[name.len()..];
				vec![trailing.trim().to_string()]
			} else {
				let required = template
					.required_args
					.as_ref()
					.expect("non-passthrough template declares arguments");
				let args = &tokens[1..];
				if args.len() != required.len() {
					return Err(self
						.err_mismatch_args(line_number, clean_line, name, required, args)
						.into());
				}
				args.to_vec()
			};

			let mut captured = LineBuffer::new();
			self.expand_calls(cursor, &mut captured, absolute_indent, false)?;

			let saved = out.swap_indent(indent_string(rebased));
			let result = template
				.call(out, &captured, &call_args, self.settings)
				.with_context(|| format!("In template call at {}:{line_number}", self.path));
			out.swap_indent(saved);
			result?;
		}

		Ok(())
	}

	/// Pass 2: walks the flat buffer re-deriving indent deltas and lifts
	/// every indented block into the function resource its preceding call
	/// line names. Returns the resolved buffers in first-touch order
	fn resolve_blocks(&self, buffer: &LineBuffer) -> anyhow::Result<Vec<(String, Vec<String>)>> {
		let resource = path_to_resource(&self.path)
			.with_context(|| format!("Failed to derive the resource of {}", self.path))?;
		let prefix = format!("{resource}/");

		let mut resolved: Vec<(String, Vec<String>)> = vec![(self.path.clone(), Vec::new())];
		let mut breadcrumbs: Vec<usize> = vec![0];
		let mut indents: Vec<i64> = vec![0];

		for (i, raw_line) in buffer.lines.iter().enumerate() {
			let formatted = raw_line.replace("./", &prefix);
			let clean = formatted.trim();

			loop {
				let current_indent = *indents.last().expect("indent stack is never empty");
				let delta = indent_of(raw_line) as i64 - current_indent;

				if delta == 0 || clean.is_empty() {
					let top = *breadcrumbs.last().expect("breadcrumb stack is never empty");
					resolved[top].1.push(clean.to_string());
					break;
				}

				if delta < 0 {
					if breadcrumbs.len() == 1 {
						bail!("unbalanced indentation in {}", self.path);
					}
					breadcrumbs.pop();
					indents.pop();
					continue;
				}

				// delta > 0: the previous line opens a nested resource
				if i == 0 {
					return Err(BuildError::syntax(self.path.clone(), "first line cannot be indented")
						.with_line(SourceLine::new(1, clean))
						.into());
				}

				let previous = &buffer.lines[i - 1];
				if previous.trim_end().ends_with('\\') {
					// continuation: stay in the current block, indent kept
					let top = *breadcrumbs.last().expect("breadcrumb stack is never empty");
					resolved[top].1.push(formatted.clone());
					break;
				}

				let previous_formatted = previous.replace("./", &prefix);
				let Some(resource_id) = extract_resource(&previous_formatted) else {
					return Err(BuildError::syntax(
						self.path.clone(),
						"indented block must be subsequent to a function call",
					)
					.with_line(SourceLine::new(i, previous_formatted.trim()))
					.into());
				};

				let path = match resource_to_path(FUNCTION_FOLDER, resource_id) {
					Ok(path) => path,
					Err(err) => {
						return Err(BuildError::syntax(
							self.path.clone(),
							format!("invalid resource {resource_id:?} in the function call: {err}"),
						)
						.with_line(SourceLine::new(i, previous_formatted.trim()))
						.into());
					}
				};
				let full = format!("data/{path}.mcfunction");

				let index = match resolved.iter().position(|(p, _)| p == &full) {
					Some(index) => index,
					None => {
						resolved.push((full, Vec::new()));
						resolved.len() - 1
					}
				};
				breadcrumbs.push(index);
				indents.push(indent_of(raw_line) as i64);
				resolved[index].1.push(clean.to_string());
				break;
			}
		}

		Ok(resolved)
	}

	fn err_empty_call(&self, line_number: usize, line: &str) -> BuildError {
		BuildError::syntax(
			self.path.clone(),
			format!("{INLINE_CALL_PREFIX:?} expects to run an inline template, but it's not followed by anything"),
		)
		.with_line(SourceLine::new(line_number, line))
	}

	fn err_undefined_template(&self, line_number: usize, line: &str, name: &str) -> BuildError {
		BuildError::syntax(
			self.path.clone(),
			format!("undefined inline template {name:?}"),
		)
		.with_line(SourceLine::new(line_number, line))
	}

	fn err_mismatch_args(
		&self,
		line_number: usize,
		line: &str,
		name: &str,
		required: &[String],
		args: &[String],
	) -> BuildError {
		let names: Vec<String> = required.iter().map(|arg| format!("<{arg}>")).collect();
		BuildError::validation(
			self.path.clone(),
			format!(
				"template {name:?} requires {} arguments ({}), but got {} ({})",
				required.len(),
				names.join(" "),
				args.len(),
				args.join(" "),
			),
		)
		.with_line(SourceLine::new(line_number, line))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ROOT: &str = "data/demo/function/main.mcfunction";

	fn process(source: &str) -> anyhow::Result<FunctionRegistry> {
		process_with(source, FxHashMap::default())
	}

	fn process_with(
		source: &str,
		templates: FxHashMap<String, InlineTemplate>,
	) -> anyhow::Result<FunctionRegistry> {
		let settings = BuildSettings::new();
		let registry = FunctionRegistry::new();
		Processor::new(ROOT, &templates, &settings).process(source, &registry)?;
		Ok(registry)
	}

	#[test]
	fn test_nested_block_is_lifted_out() {
		let registry = process("say hi\nfunction demo:child\n    say nested\nsay outer\n").unwrap();

		assert_eq!(
			registry.get(ROOT).unwrap(),
			vec!["say hi", "function demo:child", "say outer"]
		);
		assert_eq!(
			registry.get("data/demo/function/child.mcfunction").unwrap(),
			vec!["say nested"]
		);
	}

	#[test]
	fn test_deep_nesting() {
		let source = "function demo:a\n\tsay a\n\tfunction demo:a/b\n\t\tsay b\n\tsay a again\nsay root\n";
		let registry = process(source).unwrap();

		assert_eq!(registry.get(ROOT).unwrap(), vec!["function demo:a", "say root"]);
		assert_eq!(
			registry.get("data/demo/function/a.mcfunction").unwrap(),
			vec!["say a", "function demo:a/b", "say a again"]
		);
		assert_eq!(
			registry.get("data/demo/function/a/b.mcfunction").unwrap(),
			vec!["say b"]
		);
	}

	#[test]
	fn test_relative_resource_rewrite() {
		let source = "function ./child\n    say nested\n";
		let registry = process(source).unwrap();

		assert_eq!(registry.get(ROOT).unwrap(), vec!["function demo:main/child"]);
		assert_eq!(
			registry
				.get("data/demo/function/main/child.mcfunction")
				.unwrap(),
			vec!["say nested"]
		);
	}

	#[test]
	fn test_continuation_stays_in_block() {
		let source = "tellraw @a \\\n    {\"text\": \"split\"}\nsay next\n";
		let registry = process(source).unwrap();

		assert_eq!(
			registry.get(ROOT).unwrap(),
			vec!["tellraw @a \\", "\t{\"text\": \"split\"}", "say next"]
		);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn test_indent_without_call_is_an_error() {
		let err = process("say hi\n    say floating\n").unwrap_err();
		let err = err.downcast_ref::<BuildError>().unwrap();
		assert!(matches!(err, BuildError::Syntax(_)), "got {err}");
		assert!(err.to_string().contains("function call"));
	}

	#[test]
	fn test_first_line_indented_is_an_error() {
		let err = process("    say hi\n").unwrap_err();
		assert!(err.to_string().contains("first line"));
	}

	#[test]
	fn test_inline_call_expansion() {
		// the captured block keeps its relative indent, so the snippet
		// re-nests it behind its own function call
		let mut templates = FxHashMap::default();
		templates.insert(
			"wrap".to_string(),
			InlineTemplate::snippet(
				Some(vec!["who".into()]),
				"function demo:wrapped\n%[...]\nsay end %[who]\n",
			),
		);

		let source = "say first\n#~>wrap admin\n    say captured\nsay last\n";
		let registry = process_with(source, templates).unwrap();

		assert_eq!(
			registry.get(ROOT).unwrap(),
			vec![
				"say first",
				"function demo:wrapped",
				"say end admin",
				"say last"
			]
		);
		assert_eq!(
			registry
				.get("data/demo/function/wrapped.mcfunction")
				.unwrap(),
			vec!["say captured"]
		);
	}

	#[test]
	fn test_inline_call_inside_nested_block() {
		let mut templates = FxHashMap::default();
		templates.insert(
			"note".to_string(),
			InlineTemplate::snippet(Some(vec![]), "say noted\n"),
		);

		let source = "function demo:child\n    #~>note\n    say after\n";
		let registry = process_with(source, templates).unwrap();

		assert_eq!(
			registry.get("data/demo/function/child.mcfunction").unwrap(),
			vec!["say noted", "say after"]
		);
	}

	#[test]
	fn test_undefined_template_names_the_line() {
		let err = process("say ok\n#~>ghost arg\n").unwrap_err();
		let text = err.to_string();
		assert!(text.contains("ghost"), "got {text}");
		assert!(text.contains(":2"), "error should carry the line number: {text}");
	}

	#[test]
	fn test_argument_arity_mismatch() {
		let mut templates = FxHashMap::default();
		templates.insert(
			"pair".to_string(),
			InlineTemplate::snippet(Some(vec!["x".into(), "y".into()]), "say %[x] %[y]\n"),
		);

		let err = process_with("#~>pair only_one\n", templates).unwrap_err();
		let err = err.downcast_ref::<BuildError>().unwrap();
		assert!(matches!(err, BuildError::Validation(_)), "got {err}");
		let text = err.to_string();
		assert!(text.contains("requires 2 arguments"), "got {text}");
		assert!(text.contains("got 1"), "got {text}");
	}

	#[test]
	fn test_passthrough_receives_raw_text() {
		let mut templates = FxHashMap::default();
		templates.insert(
			"raw".to_string(),
			InlineTemplate::snippet(None, "say fixed\n"),
		);

		// quotes and extra spacing reach the template untouched
		let registry =
			process_with("#~>raw keep \"this whole\" tail\n", templates).unwrap();
		assert_eq!(registry.get(ROOT).unwrap(), vec!["say fixed"]);
	}

	#[test]
	fn test_empty_call_is_an_error() {
		let err = process("#~>\n").unwrap_err();
		assert!(err.to_string().contains("not followed by anything"));
	}

	#[test]
	fn test_legacy_folder_mirror() {
		let settings = crate::project::BuildSettingsBuilder::new()
			.legacy_folders(true)
			.build();
		let templates = FxHashMap::default();
		let registry = FunctionRegistry::new();
		Processor::new(ROOT, &templates, &settings)
			.process("function demo:child\n    say nested\n", &registry)
			.unwrap();

		assert_eq!(
			registry.get("data/demo/function/child.mcfunction").unwrap(),
			vec!["say nested"]
		);
		assert_eq!(
			registry
				.get("data/demo/functions/child.mcfunction")
				.unwrap(),
			vec!["say nested"]
		);
	}
}
