/// Settings for a single build invocation
#[derive(Clone)]
pub struct BuildSettings {
	pub(crate) force_stringify: bool,
	pub(crate) legacy_folders: bool,
	pub(crate) strict_functions: bool,
}

impl BuildSettings {
	pub fn new() -> Self {
		Self {
			force_stringify: false,
			legacy_folders: false,
			strict_functions: false,
		}
	}
}

impl Default for BuildSettings {
	fn default() -> Self {
		Self::new()
	}
}

pub struct BuildSettingsBuilder {
	settings: BuildSettings,
}

impl BuildSettingsBuilder {
	pub fn new() -> Self {
		Self {
			settings: BuildSettings::new(),
		}
	}

	pub fn build(self) -> BuildSettings {
		self.settings
	}

	/// Inline non-primitive JSON values into strings with all whitespace
	/// stripped instead of failing the substitution
	pub fn force_stringify(mut self, value: bool) -> Self {
		self.settings.force_stringify = value;
		self
	}

	/// Mirror generated functions under the pluralized `functions` folder
	/// used by older game versions
	pub fn legacy_folders(mut self, value: bool) -> Self {
		self.settings.legacy_folders = value;
		self
	}

	/// Treat a re-definition of an already registered function as an error
	/// instead of accumulating lines
	pub fn strict_functions(mut self, value: bool) -> Self {
		self.settings.strict_functions = value;
		self
	}
}

impl Default for BuildSettingsBuilder {
	fn default() -> Self {
		Self::new()
	}
}
