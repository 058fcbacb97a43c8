use anyhow::{bail, Context};
use color_print::cprintln;
use dpg::mcfunction::{FunctionRegistry, Processor};
use dpg::project::BuildSettings;
use dpg::template::inline::InlineTemplate;
use include_dir::{include_dir, Dir};
use rustc_hash::FxHashMap;

static TESTS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/test/process/tests");

fn main() {
	let mut test_names = Vec::new();
	for file in TESTS.files() {
		let path = file.path();
		let file_name = path
			.file_name()
			.expect("Failed to get filename of file")
			.to_string_lossy();
		let file_stem = path
			.file_stem()
			.expect("Failed to get file stem of file")
			.to_string_lossy();
		if file_name.ends_with(".mcfunction") {
			test_names.push(file_stem);
		}
	}
	for test in test_names {
		cprintln!("     - Running processor test '<b>{test}</b>'");
		run_test(&test).expect(&format!("Test {test} failed"))
	}
}

/// The inline templates every test case can call
fn templates() -> FxHashMap<String, InlineTemplate> {
	let mut out = FxHashMap::default();
	out.insert(
		"banner".to_string(),
		InlineTemplate::snippet(None, "say ----------------\n"),
	);
	out.insert(
		"wrap".to_string(),
		InlineTemplate::snippet(
			Some(vec!["name".into()]),
			"function ./%[name]\n%[...]\nsay finished %[name]\n",
		),
	);
	out
}

fn run_test(test_name: &str) -> anyhow::Result<()> {
	let input_contents = TESTS
		.get_file(format!("{test_name}.mcfunction"))
		.expect("Input file does not exist")
		.contents_utf8()
		.context("Input file is not UTF-8")?;
	let output_contents = TESTS
		.get_file(format!("{test_name}.out"))
		.expect("Output file does not exist")
		.contents_utf8()
		.context("Output file is not UTF-8")?;

	let settings = BuildSettings::new();
	let registry = FunctionRegistry::new();
	let templates = templates();
	let path = format!("data/test/function/{test_name}.mcfunction");
	Processor::new(path.as_str(), &templates, &settings).process(input_contents, &registry)?;

	// The expected file lists every registered function as a `### <path>`
	// header followed by its lines
	let mut expected: Vec<(String, Vec<String>)> = Vec::new();
	for line in output_contents.lines() {
		if let Some(header) = line.strip_prefix("### ") {
			expected.push((header.trim().to_string(), Vec::new()));
		} else if let Some((_, lines)) = expected.last_mut() {
			lines.push(line.to_string());
		}
	}

	if registry.len() != expected.len() {
		bail!(
			"expected {} functions, but {} were registered",
			expected.len(),
			registry.len()
		);
	}
	for (path, expected_lines) in &expected {
		let Some(actual) = registry.get(path) else {
			bail!("expected function {path} was not registered");
		};
		assert_eq!(&actual, expected_lines, "Mismatch in {path}");
	}

	Ok(())
}
