use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dpg::build::run_build;
use dpg::output::write_pack;
use dpg::project::BuildSettingsBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	let res = run(cli);
	if let Err(e) = res {
		eprintln!("{e:#}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}

fn run(cli: Cli) -> anyhow::Result<()> {
	let settings = BuildSettingsBuilder::new()
		.force_stringify(cli.force_stringify)
		.legacy_folders(cli.legacy_folders)
		.strict_functions(cli.strict)
		.build();

	let root = PathBuf::from(cli.path.unwrap_or_else(|| ".".into()));
	let output = run_build(&root, &settings).context("Build failed")?;

	if !output.namespaces.is_empty() {
		info!(namespaces = ?output.namespaces, "referenced namespaces");
	}

	write_pack(&output, &PathBuf::from(cli.out)).context("Failed to write the generated pack")?;
	Ok(())
}

fn init_logging(verbose: bool) {
	let default = if verbose { "dpg=debug" } else { "dpg=info" };
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
		)
		.with_target(false)
		.init();
}

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
	/// The output directory
	#[arg(short, long)]
	out: String,
	/// Inline non-primitive JSON values as whitespace-stripped text instead
	/// of failing the substitution
	#[arg(long)]
	force_stringify: bool,
	/// Mirror generated functions under the legacy pluralized folder name
	#[arg(long)]
	legacy_folders: bool,
	/// Fail when a function resource is defined more than once
	#[arg(long)]
	strict: bool,
	/// Print debug logs
	#[arg(short, long)]
	verbose: bool,
	/// The project directory to build
	path: Option<String>,
}
