//! Fetching and compiling the grammar's parser sources.
//!
//! The GSC parser ships as generated C: `src/parser.c`, plus `src/scanner.c`
//! if the grammar ever grows an external scanner. [`fetch_grammar`] pins the
//! source checkout to the revision recorded in `runtime/languages.toml`, and
//! [`build_grammar`] turns that checkout into the shared library the loader
//! dlopens.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::grammar::{cache_dir, grammar_library_name, grammar_search_paths, runtime_dir};

/// Errors that can occur while fetching or building the grammar.
#[derive(Debug, Error)]
pub enum GrammarBuildError {
	#[error("git is not available on PATH")]
	GitNotAvailable,
	#[error("failed to read languages.toml: {0}")]
	ConfigRead(#[from] std::io::Error),
	#[error("failed to parse languages.toml: {0}")]
	ConfigParse(#[from] toml::de::Error),
	#[error("`git {command}` failed: {stderr}")]
	GitCommand { command: String, stderr: String },
	#[error("compilation failed: {0}")]
	Compilation(String),
	#[error("no parser.c in {0}")]
	NoParserSource(PathBuf),
}

/// Result type for grammar build operations.
pub type Result<T> = std::result::Result<T, GrammarBuildError>;

/// One `[[grammar]]` entry from languages.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct GrammarConfig {
	/// The grammar name, which also names the output library.
	#[serde(rename = "name")]
	pub grammar_id: String,
	/// Where the parser sources come from.
	pub source: GrammarSource,
}

/// Where a grammar's sources live.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GrammarSource {
	/// A checkout already on disk.
	Local { path: String },
	/// A git repository, pinned to a revision.
	Git {
		#[serde(rename = "git")]
		remote: String,
		#[serde(rename = "rev")]
		revision: String,
		/// Subdirectory holding the grammar, for monorepo upstreams.
		subpath: Option<String>,
	},
}

#[derive(Debug, Deserialize)]
struct LanguagesConfig {
	#[serde(default)]
	grammar: Vec<GrammarConfig>,
}

/// Outcome of [`fetch_grammar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
	/// Checkout already at the pinned revision.
	UpToDate,
	/// Checkout moved to the pinned revision.
	Updated,
	/// Local source, nothing to fetch.
	Local,
}

/// Outcome of [`build_grammar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
	/// Library on disk is newer than every source file.
	AlreadyBuilt,
	/// Library was compiled.
	Built,
}

const LANGUAGES_TOML: &str = include_str!("../../../runtime/languages.toml");

/// Returns the grammar entries from the embedded `languages.toml`.
pub fn load_grammar_configs() -> Result<Vec<GrammarConfig>> {
	let config: LanguagesConfig = toml::from_str(LANGUAGES_TOML)?;
	Ok(config.grammar)
}

/// Where grammar checkouts live. They are disposable, so the cache dir.
pub fn grammar_sources_dir() -> PathBuf {
	cache_dir()
		.unwrap_or_else(runtime_dir)
		.join("grammars")
		.join("sources")
}

/// Where compiled grammar libraries are written: the first search path, so
/// the loader finds what the builder produces.
pub fn grammar_lib_dir() -> PathBuf {
	grammar_search_paths()
		.first()
		.cloned()
		.unwrap_or_else(|| runtime_dir().join("grammars"))
}

/// Returns the `src/` directory holding `parser.c` for a grammar.
pub fn grammar_src_dir(config: &GrammarConfig) -> PathBuf {
	let checkout = match &config.source {
		GrammarSource::Local { path } => PathBuf::from(path),
		GrammarSource::Git { subpath, .. } => {
			let dir = grammar_sources_dir().join(&config.grammar_id);
			match subpath {
				Some(subpath) => dir.join(subpath),
				None => dir,
			}
		}
	};
	checkout.join("src")
}

/// Brings the grammar checkout to its pinned revision.
///
/// Skips the network when the checkout is already at the pin. A checkout
/// whose revision cannot be read is thrown away and re-fetched rather than
/// trusted. Returns [`FetchStatus::Local`] for non-git sources.
pub fn fetch_grammar(config: &GrammarConfig) -> Result<FetchStatus> {
	let GrammarSource::Git { remote, revision, .. } = &config.source else {
		return Ok(FetchStatus::Local);
	};

	ensure_git_available()?;

	let checkout = grammar_sources_dir().join(&config.grammar_id);
	fetch_grammar_at(&checkout, &config.grammar_id, remote, revision)
}

fn fetch_grammar_at(checkout: &Path, grammar_id: &str, remote: &str, revision: &str) -> Result<FetchStatus> {
	if checkout.join(".git").exists()
		&& let Ok(current) = git(checkout, &["rev-parse", "HEAD"])
		&& !current.is_empty()
	{
		if current.starts_with(revision) || revision.starts_with(&current) {
			return Ok(FetchStatus::UpToDate);
		}

		info!(grammar = %grammar_id, rev = %revision, "Updating grammar checkout");
		git(checkout, &["fetch", "--depth", "1", remote, revision])?;
		git(checkout, &["checkout", "--quiet", "FETCH_HEAD"])?;
		return Ok(FetchStatus::Updated);
	}

	// Missing or unreadable checkout: start over.
	info!(grammar = %grammar_id, rev = %revision, "Fetching grammar checkout");
	if checkout.exists() {
		fs::remove_dir_all(checkout)?;
	}
	fs::create_dir_all(checkout)?;
	git(checkout, &["init", "--quiet"])?;
	git(checkout, &["fetch", "--depth", "1", remote, revision])?;
	git(checkout, &["checkout", "--quiet", "FETCH_HEAD"])?;

	Ok(FetchStatus::Updated)
}

fn ensure_git_available() -> Result<()> {
	Command::new("git")
		.arg("--version")
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map_err(|_| GrammarBuildError::GitNotAvailable)?;
	Ok(())
}

/// Runs git in `dir`, failing on a non-zero exit, and returns trimmed stdout.
fn git(dir: &Path, args: &[&str]) -> Result<String> {
	let output = Command::new("git")
		.args(args)
		.current_dir(dir)
		.output()
		.map_err(|_| GrammarBuildError::GitNotAvailable)?;

	if !output.status.success() {
		return Err(GrammarBuildError::GitCommand {
			command: args.join(" "),
			stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
		});
	}

	Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Compiles the grammar checkout into a shared library.
///
/// No-op when the library on disk is newer than every parser source. The
/// parser is plain C, so a single C compiler covers both compile and link;
/// objects come from the [`cc`] crate (which knows the target-specific
/// flags) and are linked with `-shared` by the same compiler.
pub fn build_grammar(config: &GrammarConfig) -> Result<BuildStatus> {
	let src_dir = grammar_src_dir(config);
	if !src_dir.join("parser.c").exists() {
		return Err(GrammarBuildError::NoParserSource(src_dir));
	}
	let sources = parser_sources(&src_dir);

	let lib_dir = grammar_lib_dir();
	fs::create_dir_all(&lib_dir)?;
	let lib_path = lib_dir.join(grammar_library_name(&config.grammar_id));

	if library_is_current(&sources, &lib_path) {
		return Ok(BuildStatus::AlreadyBuilt);
	}

	let compiler = c_compiler().ok_or_else(|| {
		GrammarBuildError::Compilation("no C compiler found; install clang or gcc, or set CC".into())
	})?;

	info!(grammar = %config.grammar_id, lib = %lib_path.display(), "Compiling grammar");

	let objects = compile_objects(&sources, &src_dir, &lib_dir, &config.grammar_id, compiler)?;
	link_library(&objects, &lib_path, compiler)?;

	debug!(grammar = %config.grammar_id, lib = %lib_path.display(), "Grammar compiled");
	Ok(BuildStatus::Built)
}

/// Parser translation units present in the grammar's `src/` directory.
fn parser_sources(src_dir: &Path) -> Vec<PathBuf> {
	["parser.c", "scanner.c"]
		.iter()
		.map(|file| src_dir.join(file))
		.filter(|path| path.exists())
		.collect()
}

/// True when the library exists and no source file is newer than it.
fn library_is_current(sources: &[PathBuf], lib_path: &Path) -> bool {
	let Ok(lib_mtime) = fs::metadata(lib_path).and_then(|m| m.modified()) else {
		return false;
	};

	sources.iter().all(|src| {
		fs::metadata(src)
			.and_then(|m| m.modified())
			.is_ok_and(|src_mtime| src_mtime <= lib_mtime)
	})
}

/// Returns the C compiler to use: `$CC` if set, otherwise the first of the
/// platform's usual names that runs.
pub(crate) fn c_compiler() -> Option<&'static str> {
	static COMPILER: OnceLock<Option<String>> = OnceLock::new();
	COMPILER
		.get_or_init(|| {
			if let Ok(cc) = std::env::var("CC") {
				return Some(cc);
			}

			#[cfg(windows)]
			let candidates = ["cl", "clang-cl", "clang", "gcc"];
			#[cfg(not(windows))]
			let candidates = ["cc", "clang", "gcc"];

			candidates
				.iter()
				.find(|name| {
					Command::new(name)
						.arg("--version")
						.stdout(Stdio::null())
						.stderr(Stdio::null())
						.status()
						.is_ok()
				})
				.map(|name| name.to_string())
		})
		.as_deref()
}

fn host_target_triple() -> String {
	std::env::var("TARGET").unwrap_or_else(|_| {
		let arch = std::env::consts::ARCH;
		match std::env::consts::OS {
			"windows" => format!("{arch}-pc-windows-msvc"),
			"macos" => format!("{arch}-apple-darwin"),
			_ => format!("{arch}-unknown-linux-gnu"),
		}
	})
}

/// Compiles the sources to position-independent objects and returns them.
fn compile_objects(
	sources: &[PathBuf],
	src_dir: &Path,
	lib_dir: &Path,
	grammar_id: &str,
	compiler: &str,
) -> Result<Vec<PathBuf>> {
	let target = host_target_triple();
	let obj_dir = lib_dir.join("obj").join(grammar_id);
	fs::create_dir_all(&obj_dir)?;

	let mut build = cc::Build::new();
	build
		.opt_level(2)
		.pic(true)
		.warnings(false)
		.cargo_metadata(false)
		.include(src_dir)
		.host(&target)
		.target(&target)
		.compiler(compiler)
		.out_dir(&obj_dir);
	for source in sources {
		build.file(source);
	}

	build
		.try_compile_intermediates()
		.map_err(|e| GrammarBuildError::Compilation(e.to_string()))
}

/// Links the objects into a shared library with the resolved compiler.
fn link_library(objects: &[PathBuf], lib_path: &Path, compiler: &str) -> Result<()> {
	let mut cmd = Command::new(compiler);

	#[cfg(unix)]
	{
		cmd.args(["-shared", "-fPIC"]).arg("-o").arg(lib_path);
		#[cfg(target_os = "linux")]
		cmd.arg("-Wl,-z,relro,-z,now");
	}
	#[cfg(windows)]
	{
		cmd.args(["/nologo", "/LD"]).arg(format!("/Fe:{}", lib_path.display()));
	}

	for object in objects {
		cmd.arg(object);
	}

	let output = cmd
		.output()
		.map_err(|e| GrammarBuildError::Compilation(e.to_string()))?;

	if output.status.success() {
		Ok(())
	} else {
		Err(GrammarBuildError::Compilation(
			String::from_utf8_lossy(&output.stderr).into(),
		))
	}
}
