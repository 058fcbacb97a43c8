use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

use crate::common::Env;
use crate::error::BuildError;
use crate::parse::LineBuffer;
use crate::project::BuildSettings;
use crate::substitute::substitute_str;

use super::{Manifest, BODY_MARKER, SNIPPET_FILENAME};

/// A reusable script fragment invoked from within an mcfunction body.
/// Snippet templates splice the captured block into a static body at the
/// `%[...]` marker; exec templates delegate to an external program
pub struct InlineTemplate {
	/// Declared argument names, bound in order at the call site.
	/// `None` is the pass-through sentinel: the raw call-line text is handed
	/// over as a single synthetic argument
	pub required_args: Option<Vec<String>>,
	origin: String,
	body: InlineBody,
}

enum InlineBody {
	Snippet(String),
	Exec(PathBuf),
}

impl InlineTemplate {
	pub fn load(dir: &Path, manifest: Manifest) -> anyhow::Result<Self> {
		let snippet_path = dir.join(SNIPPET_FILENAME);
		if snippet_path.is_file() {
			let text = std::fs::read_to_string(&snippet_path)
				.with_context(|| format!("Failed to read {}", snippet_path.display()))?;
			return Ok(Self {
				required_args: manifest.arguments,
				origin: snippet_path.display().to_string(),
				body: InlineBody::Snippet(text),
			});
		}

		let mut entries: Vec<_> = std::fs::read_dir(dir)
			.with_context(|| format!("Failed to read {}", dir.display()))?
			.collect::<Result<_, _>>()
			.context("Failed to read a template entry")?;
		entries.sort_by_key(|entry| entry.file_name());

		for entry in entries {
			let path = entry.path();
			let is_call = entry.file_name().to_string_lossy().starts_with("call");
			if path.is_file() && is_call {
				return Ok(Self {
					required_args: manifest.arguments,
					origin: path.display().to_string(),
					body: InlineBody::Exec(path),
				});
			}
		}

		Err(BuildError::validation(
			dir.display().to_string(),
			format!("template contains no logic files, expected `{SNIPPET_FILENAME}` or an executable `call*`"),
		)
		.into())
	}

	/// Builds a snippet template directly from its body text
	pub fn snippet(required_args: Option<Vec<String>>, text: impl Into<String>) -> Self {
		Self {
			required_args,
			origin: SNIPPET_FILENAME.to_string(),
			body: InlineBody::Snippet(text.into()),
		}
	}

	pub fn is_passthrough(&self) -> bool {
		self.required_args.is_none()
	}

	/// Expands the template into `out`: the call-site arguments bind to the
	/// declared names and the captured nested lines are spliced in opaque,
	/// never substituted
	pub fn call(
		&self,
		out: &mut LineBuffer,
		captured: &LineBuffer,
		args: &[String],
		settings: &BuildSettings,
	) -> anyhow::Result<()> {
		match &self.body {
			InlineBody::Snippet(text) => self.call_snippet(text, out, captured, args, settings),
			InlineBody::Exec(program) => self.call_exec(program, out, captured, args),
		}
	}

	fn call_snippet(
		&self,
		text: &str,
		out: &mut LineBuffer,
		captured: &LineBuffer,
		args: &[String],
		settings: &BuildSettings,
	) -> anyhow::Result<()> {
		let mut env = Env::new();
		if let Some(required) = &self.required_args {
			for (name, value) in required.iter().zip(args) {
				env.set_var(name.clone(), value.as_str());
			}
		}

		let body = text.strip_suffix('\n').unwrap_or(text);
		let lines: Vec<&str> = body.split('\n').collect();

		let Some(marker) = lines.iter().position(|line| line.contains(BODY_MARKER)) else {
			// no splice point: captured lines are discarded
			return self.write_substituted(out, body, &env, settings);
		};

		let before = lines[..marker].join("\n");
		let after = lines[marker + 1..].join("\n");

		if !before.is_empty() {
			self.write_substituted(out, &before, &env, settings)?;
		}
		for line in &captured.lines {
			out.push(line);
		}
		if !after.is_empty() {
			self.write_substituted(out, &after, &env, settings)?;
		}
		Ok(())
	}

	fn write_substituted(
		&self,
		out: &mut LineBuffer,
		text: &str,
		env: &Env,
		settings: &BuildSettings,
	) -> anyhow::Result<()> {
		let substituted = substitute_str(text, env, settings)
			.map_err(|err| BuildError::format(self.origin.clone(), format!("{err:#}")))?;
		for line in substituted.split('\n') {
			out.push(line);
		}
		Ok(())
	}

	fn call_exec(
		&self,
		program: &Path,
		out: &mut LineBuffer,
		captured: &LineBuffer,
		args: &[String],
	) -> anyhow::Result<()> {
		let describe = format!("{} with {args:?}", program.display());

		let mut child = Command::new(program)
			.args(args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|err| BuildError::execution(describe.clone(), err))?;

		let input = captured.joined();
		let mut stdin = child.stdin.take().context("child stdin is piped")?;
		let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

		let output = child
			.wait_with_output()
			.map_err(|err| BuildError::execution(describe.clone(), err))?;
		let _ = writer.join();

		// splice stdout before surfacing any failure
		for line in String::from_utf8_lossy(&output.stdout).lines() {
			out.push(line);
		}

		let stderr = String::from_utf8_lossy(&output.stderr);
		if !output.status.success() {
			return Err(BuildError::execution(
				describe,
				format!("exited with {}: {}", output.status, stderr.trim()),
			)
			.into());
		}
		if !stderr.trim().is_empty() {
			return Err(
				BuildError::execution(describe, format!("wrote to stderr: {}", stderr.trim())).into(),
			);
		}
		Ok(())
	}
}
