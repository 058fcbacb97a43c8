use rustc_hash::FxHashMap;
use serde_json::Value;

/// One row of an iterator table
pub type Columns = Vec<String>;

/// A named iterator table: every row should have the arity of the first one
pub type Rows = Vec<Columns>;

/// The value-binding context placeholders are resolved against.
///
/// A key is looked up in `iterators` before `variables`. An environment is
/// created fresh for every definition or template invocation and is never
/// shared mutably between tasks
#[derive(Debug, Clone, Default)]
pub struct Env {
	pub variables: FxHashMap<String, Value>,
	pub iterators: FxHashMap<String, Columns>,
}

impl Env {
	pub fn new() -> Self {
		Self {
			variables: FxHashMap::default(),
			iterators: FxHashMap::default(),
		}
	}

	pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.variables.insert(name.into(), value.into());
	}

	pub fn set_iterator(&mut self, name: impl Into<String>, columns: Columns) {
		self.iterators.insert(name.into(), columns);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_iterator_shadows_variable() {
		let mut env = Env::new();
		env.set_var("x", "variable");
		env.set_iterator("x", vec!["column".into()]);
		assert!(env.iterators.contains_key("x"));
		assert!(env.variables.contains_key("x"));
	}
}
