//! GSC grammar management binary.
//!
//! Wraps the `gsc-language` crate for use from the command line:
//! - `fetch` / `build` manage the compiled shared library
//! - `check` verifies the grammar loads (manifest and, if built, the library)
//! - `paths` prints the resolved search paths

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gsc_language::{
	FetchStatus, GrammarError, GrammarManifest, build_grammar, fetch_grammar, grammar_search_paths,
	load_grammar, load_grammar_configs, resolve_grammar_source, runtime_dir,
};
use tracing::info;

/// Grammar tool command line arguments.
#[derive(Parser, Debug)]
#[command(name = "gsc-grammar")]
#[command(about = "Fetch, build, and check the GSC tree-sitter grammar")]
struct Args {
	#[command(subcommand)]
	command: Command,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Fetch grammar sources from their pinned git revisions.
	Fetch,
	/// Compile fetched grammar sources into shared libraries (fetches first).
	Build,
	/// Verify that the grammar loads.
	Check,
	/// Print grammar search paths and the resolved grammar source.
	Paths,
}

fn main() -> ExitCode {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();

	if tracing::subscriber::set_global_default(subscriber).is_err() {
		eprintln!("failed to initialize logging");
		return ExitCode::FAILURE;
	}

	let ok = match args.command {
		Command::Fetch => fetch(),
		Command::Build => build(),
		Command::Check => check(),
		Command::Paths => paths(),
	};

	if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn fetch() -> bool {
	let configs = match load_grammar_configs() {
		Ok(configs) => configs,
		Err(e) => {
			eprintln!("failed to load grammar configuration: {e}");
			return false;
		}
	};

	let mut ok = true;
	for config in &configs {
		match fetch_grammar(config) {
			Ok(FetchStatus::UpToDate) => println!("{}: up to date", config.grammar_id),
			Ok(FetchStatus::Updated) => println!("{}: updated", config.grammar_id),
			Ok(FetchStatus::Local) => println!("{}: local source", config.grammar_id),
			Err(e) => {
				eprintln!("{}: fetch failed: {e}", config.grammar_id);
				ok = false;
			}
		}
	}

	ok
}

fn build() -> bool {
	if !fetch() {
		return false;
	}

	let configs = match load_grammar_configs() {
		Ok(configs) => configs,
		Err(e) => {
			eprintln!("failed to load grammar configuration: {e}");
			return false;
		}
	};

	let mut ok = true;
	for config in &configs {
		match build_grammar(config) {
			Ok(status) => {
				info!(grammar = %config.grammar_id, ?status, "Build finished");
				println!("{}: {:?}", config.grammar_id, status);
			}
			Err(e) => {
				eprintln!("{}: build failed: {e}", config.grammar_id);
				ok = false;
			}
		}
	}

	ok
}

fn check() -> bool {
	let manifest = match GrammarManifest::builtin() {
		Ok(manifest) => manifest,
		Err(e) => {
			eprintln!("Error loading Gsc grammar: {e}");
			return false;
		}
	};
	println!(
		"manifest ok: {} ({} rules, {} conflicts)",
		manifest.name,
		manifest.rule_count(),
		manifest.conflicts.len()
	);

	match load_grammar(&manifest.name) {
		Ok(grammar) => {
			println!("compiled grammar ok: {}", grammar.name());
			true
		}
		Err(GrammarError::NotFound(_)) => {
			println!("compiled grammar not built (run `gsc-grammar build`)");
			true
		}
		Err(e) => {
			eprintln!("Error loading Gsc grammar: {e}");
			false
		}
	}
}

fn paths() -> bool {
	println!("runtime dir: {}", runtime_dir().display());
	println!("search paths:");
	for path in grammar_search_paths() {
		println!("  {}", path.display());
	}
	println!("gsc grammar source: {:?}", resolve_grammar_source("gsc"));
	true
}
