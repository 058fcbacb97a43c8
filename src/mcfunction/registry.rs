use std::sync::Mutex;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::BuildError;

/// Accumulates every generated function body of one build, keyed by its
/// pack-relative path. Constructed per build invocation and passed by
/// reference through the build context; this is the only state shared
/// between concurrent tasks, guarded by a single mutex.
///
/// Appends to the same path accumulate. With strict mode on, flushing a
/// whole buffer to an already defined path is an error instead
#[derive(Debug)]
pub struct FunctionRegistry {
	strict: bool,
	inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
	functions: FxHashMap<String, Vec<String>>,
	namespaces: FxHashSet<String>,
}

impl FunctionRegistry {
	pub fn new() -> Self {
		Self::with_strict(false)
	}

	pub fn with_strict(strict: bool) -> Self {
		Self {
			strict,
			inner: Mutex::new(RegistryInner::default()),
		}
	}

	pub fn add_line(&self, path: &str, line: impl Into<String>) {
		let mut inner = self.lock();
		let line = line.into();
		scan_namespaces(&mut inner.namespaces, &line);
		inner.functions.entry(path.to_string()).or_default().push(line);
	}

	/// Flushes one resolved buffer into the registry under a single lock,
	/// so concurrent writers can never interleave their line lists
	pub fn add_lines(&self, path: &str, lines: Vec<String>) -> anyhow::Result<()> {
		let mut inner = self.lock();
		if self.strict && inner.functions.contains_key(path) {
			return Err(
				BuildError::validation(path, "function is already defined").into(),
			);
		}
		for line in &lines {
			scan_namespaces(&mut inner.namespaces, line);
		}
		inner.functions.entry(path.to_string()).or_default().extend(lines);
		Ok(())
	}

	pub fn contains(&self, path: &str) -> bool {
		self.lock().functions.contains_key(path)
	}

	pub fn get(&self, path: &str) -> Option<Vec<String>> {
		self.lock().functions.get(path).cloned()
	}

	pub fn len(&self) -> usize {
		self.lock().functions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().functions.is_empty()
	}

	/// Every namespace referenced by a registered line, sorted. This is the
	/// interface consumed by the automatic library installer
	pub fn used_namespaces(&self) -> Vec<String> {
		let inner = self.lock();
		let mut out: Vec<String> = inner.namespaces.iter().cloned().collect();
		out.sort();
		out
	}

	pub fn into_functions(self) -> FxHashMap<String, Vec<String>> {
		self.inner
			.into_inner()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.functions
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
		self.inner
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

impl Default for FunctionRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Records the namespace of every `namespace:value` shaped token on the
/// line. A leading `#` tag marker is stripped first
fn scan_namespaces(namespaces: &mut FxHashSet<String>, line: &str) {
	for token in line.split_whitespace() {
		let token = token.strip_prefix('#').unwrap_or(token);
		let Some((namespace, value)) = token.split_once(':') else {
			continue;
		};
		if namespace.is_empty() || value.is_empty() {
			continue;
		}
		let valid = namespace
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'));
		if valid && !namespaces.contains(namespace) {
			namespaces.insert(namespace.to_string());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lines_accumulate() {
		let registry = FunctionRegistry::new();
		registry.add_line("data/demo/function/a.mcfunction", "say one");
		registry.add_line("data/demo/function/a.mcfunction", "say two");
		assert_eq!(
			registry.get("data/demo/function/a.mcfunction").unwrap(),
			vec!["say one", "say two"]
		);
	}

	#[test]
	fn test_strict_rejects_redefinition() {
		let registry = FunctionRegistry::with_strict(true);
		registry
			.add_lines("data/demo/function/a.mcfunction", vec!["say one".into()])
			.unwrap();
		let err = registry
			.add_lines("data/demo/function/a.mcfunction", vec!["say two".into()])
			.unwrap_err();
		assert!(err.to_string().contains("already defined"));
	}

	#[test]
	fn test_namespace_scan() {
		let registry = FunctionRegistry::new();
		registry.add_line("p", "function demo:child");
		registry.add_line("p", "execute as @a run function #other.lib:tagged");
		registry.add_line("p", "say plain words");
		registry.add_line("p", "say Not:a_namespace");
		registry.add_line("p", "tellraw @a {\"text\":\"hi\"}");
		assert_eq!(registry.used_namespaces(), vec!["demo", "other.lib"]);
	}

	#[test]
	fn test_concurrent_flushes_do_not_interleave() {
		let registry = FunctionRegistry::new();
		std::thread::scope(|scope| {
			for task in 0..16 {
				let registry = &registry;
				scope.spawn(move || {
					let path = format!("data/demo/function/gen/{task}.mcfunction");
					let lines: Vec<String> =
						(0..100).map(|i| format!("say {task} {i}")).collect();
					registry.add_lines(&path, lines).unwrap();
				});
			}
		});

		assert_eq!(registry.len(), 16);
		for task in 0..16 {
			let lines = registry
				.get(&format!("data/demo/function/gen/{task}.mcfunction"))
				.unwrap();
			let expected: Vec<String> = (0..100).map(|i| format!("say {task} {i}")).collect();
			assert_eq!(lines, expected);
		}
	}
}
