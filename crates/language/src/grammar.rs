//! Grammar loading and search path configuration.
//!
//! A compiled GSC grammar is a shared library exporting `tree_sitter_gsc()`.
//! This module finds that library on the search paths, dlopens it, and wraps
//! the returned language pointer in an opaque [`Grammar`] handle.
//!
//! Libraries are looked up under `GSC_RUNTIME` first, then the workspace
//! `target/grammars/`, the user cache and data dirs, and finally next to the
//! executable. [`load_grammar_or_build`] compiles a missing library on demand.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::{Library, Symbol};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when loading a grammar.
#[derive(Error, Debug)]
pub enum GrammarError {
	/// No compiled library on any search path.
	#[error("no compiled grammar for `{0}` on any search path")]
	NotFound(String),

	/// dlopen failed, or the entry point returned a null language.
	#[error("could not load grammar library: {0}")]
	LoadError(String),

	/// The library exists but does not export the language entry point.
	#[error("grammar library does not export `{0}`")]
	MissingSymbol(String),

	/// Filesystem I/O error.
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
}

/// Opaque handle to a compiled GSC grammar.
///
/// Wraps the `TSLanguage` pointer returned by the library's
/// `tree_sitter_gsc()` entry point. The shared library stays mapped for as
/// long as the handle lives, which keeps the pointer valid; the language
/// itself is static data owned by the library and is never freed.
///
/// A `Grammar` can only be built from a non-null pointer. A failed load is
/// always a [`GrammarError`], never a null handle.
pub struct Grammar {
	name: String,
	language: NonNull<c_void>,
	_library: Library,
}

// SAFETY: the underlying TSLanguage is immutable static data.
unsafe impl Send for Grammar {}
unsafe impl Sync for Grammar {}

impl Grammar {
	/// Returns the grammar name (e.g. "gsc").
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the raw language pointer for handing to a parser binding.
	pub fn as_ptr(&self) -> *const c_void {
		self.language.as_ptr()
	}
}

impl fmt::Debug for Grammar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Grammar")
			.field("name", &self.name)
			.field("language", &self.language.as_ptr())
			.finish()
	}
}

/// Source a grammar handle can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarSource {
	/// A compiled shared library on disk.
	Library(PathBuf),
	/// The grammar manifest built into the binary, named by grammar id.
	Builtin(&'static str),
}

/// Resolves where the named grammar would be loaded from: the first matching
/// shared library on the search paths, or the embedded manifest when no
/// library has been built.
pub fn resolve_grammar_source(name: &str) -> GrammarSource {
	let lib_name = grammar_library_name(name);

	for dir in grammar_search_paths() {
		let candidate = dir.join(&lib_name);
		if candidate.exists() {
			return GrammarSource::Library(candidate);
		}
	}

	GrammarSource::Builtin("gsc")
}

/// Loads a grammar by name from the search paths.
///
/// Returns [`GrammarError::NotFound`] when no library exists; use
/// [`load_grammar_or_build`] to compile one on demand instead.
pub fn load_grammar(name: &str) -> Result<Grammar, GrammarError> {
	match resolve_grammar_source(name) {
		GrammarSource::Library(path) => load_grammar_from_path(&path, name),
		GrammarSource::Builtin(_) => Err(GrammarError::NotFound(name.to_string())),
	}
}

/// Loads a grammar by name, fetching and compiling it first if no library
/// exists. The build is attempted once; a second `NotFound` is final.
pub fn load_grammar_or_build(name: &str) -> Result<Grammar, GrammarError> {
	match load_grammar(name) {
		Err(GrammarError::NotFound(_)) => {}
		done => return done,
	}

	info!(grammar = name, "Grammar not built, fetching and compiling");
	if let Err(e) = build_from_config(name) {
		warn!(grammar = name, error = %e, "Grammar build failed");
		return Err(GrammarError::NotFound(name.to_string()));
	}

	load_grammar(name)
}

/// Runs the fetch+build pipeline for the named grammar's config entry.
fn build_from_config(name: &str) -> Result<(), GrammarError> {
	use crate::build::{build_grammar, fetch_grammar, load_grammar_configs};

	let config = load_grammar_configs()
		.map_err(|e| GrammarError::Io(std::io::Error::other(e.to_string())))?
		.into_iter()
		.find(|c| c.grammar_id == name)
		.ok_or_else(|| {
			GrammarError::NotFound(format!("{name} (no entry in languages.toml)"))
		})?;

	fetch_grammar(&config)
		.map_err(|e| GrammarError::Io(std::io::Error::other(format!("fetch: {e}"))))?;
	build_grammar(&config)
		.map_err(|e| GrammarError::Io(std::io::Error::other(format!("build: {e}"))))?;

	Ok(())
}

/// Loads a grammar from a specific library path.
fn load_grammar_from_path(path: &Path, name: &str) -> Result<Grammar, GrammarError> {
	let symbol_name = format!("tree_sitter_{}", name.replace('-', "_"));

	// SAFETY: loading a tree-sitter grammar library and calling its language
	// entry point, which takes no arguments and returns a pointer to static
	// TSLanguage data.
	unsafe {
		let library = Library::new(path)
			.map_err(|e| GrammarError::LoadError(format!("{}: {}", path.display(), e)))?;

		// The symbol borrow must end before the library moves into the handle.
		let language = {
			let entry: Symbol<unsafe extern "C" fn() -> *const c_void> = library
				.get(symbol_name.as_bytes())
				.map_err(|_| GrammarError::MissingSymbol(symbol_name.clone()))?;
			NonNull::new(entry().cast_mut())
		}
		.ok_or_else(|| {
			GrammarError::LoadError(format!(
				"{}: {} returned a null language",
				path.display(),
				symbol_name
			))
		})?;

		Ok(Grammar {
			name: name.to_string(),
			language,
			_library: library,
		})
	}
}

/// Returns the platform's library filename for a grammar name.
pub(crate) fn grammar_library_name(name: &str) -> String {
	let stem = name.replace('-', "_");
	let (prefix, ext) = if cfg!(target_os = "windows") {
		("", "dll")
	} else if cfg!(target_os = "macos") {
		("lib", "dylib")
	} else {
		("lib", "so")
	};
	format!("{prefix}{stem}.{ext}")
}

/// The primary runtime directory, `~/.local/share/gsc/` unless `GSC_RUNTIME`
/// overrides it.
pub fn runtime_dir() -> PathBuf {
	std::env::var_os("GSC_RUNTIME")
		.map(PathBuf::from)
		.or_else(|| data_local_dir().map(|d| d.join("gsc")))
		.unwrap_or_else(|| PathBuf::from("."))
}

/// The user cache directory for gsc, `~/.cache/gsc/`.
pub fn cache_dir() -> Option<PathBuf> {
	user_dir("XDG_CACHE_HOME", &[".cache"]).map(|dir| dir.join("gsc"))
}

fn data_local_dir() -> Option<PathBuf> {
	user_dir("XDG_DATA_HOME", &[".local", "share"])
}

/// Resolves a per-user directory: the XDG override if set, otherwise the
/// conventional path under `$HOME`. Windows has a single local-data root.
fn user_dir(xdg_env: &str, home_parts: &[&str]) -> Option<PathBuf> {
	#[cfg(unix)]
	{
		if let Some(dir) = std::env::var_os(xdg_env) {
			return Some(PathBuf::from(dir));
		}
		std::env::var_os("HOME").map(|home| {
			home_parts
				.iter()
				.fold(PathBuf::from(home), |dir, part| dir.join(part))
		})
	}
	#[cfg(windows)]
	{
		let _ = (xdg_env, home_parts);
		std::env::var_os("LOCALAPPDATA").map(PathBuf::from)
	}
	#[cfg(not(any(unix, windows)))]
	{
		let _ = (xdg_env, home_parts);
		None
	}
}

/// Directories searched for compiled grammar libraries, in priority order.
pub fn grammar_search_paths() -> Vec<PathBuf> {
	let mut dirs = Vec::new();

	// Explicit override wins.
	if let Some(runtime) = std::env::var_os("GSC_RUNTIME") {
		dirs.push(PathBuf::from(runtime).join("grammars"));
	}

	// Workspace-local output while developing in this repo.
	if let Ok(manifest) = std::env::var("CARGO_MANIFEST_DIR")
		&& let Some(workspace) = PathBuf::from(manifest).ancestors().nth(2)
	{
		dirs.push(workspace.join("target").join("grammars"));
	}

	// Where `gsc-grammar build` writes its output.
	if let Some(cache) = cache_dir() {
		dirs.push(cache.join("grammars"));
	}

	// Installed data dir, then next to the executable.
	if let Some(data) = data_local_dir() {
		dirs.push(data.join("gsc").join("grammars"));
	}
	if let Ok(exe) = std::env::current_exe()
		&& let Some(exe_dir) = exe.parent()
	{
		dirs.push(exe_dir.join("grammars"));
	}

	dirs
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Compiles a one-function C stub into a shared library named like a
	/// compiled gsc grammar. Returns `None` when no C compiler is around,
	/// letting callers skip.
	#[cfg(unix)]
	fn compile_stub(dir: &Path, source: &str) -> Option<PathBuf> {
		let compiler = crate::build::c_compiler()?;
		let src = dir.join("stub.c");
		std::fs::write(&src, source).ok()?;

		let lib = dir.join(grammar_library_name("gsc"));
		let status = std::process::Command::new(compiler)
			.args(["-shared", "-fPIC", "-o"])
			.arg(&lib)
			.arg(&src)
			.status()
			.ok()?;
		status.success().then_some(lib)
	}

	#[test]
	fn test_search_paths_not_empty() {
		assert!(!grammar_search_paths().is_empty());
	}

	#[test]
	fn test_grammar_library_name() {
		let name = grammar_library_name("gsc");
		#[cfg(target_os = "linux")]
		assert_eq!(name, "libgsc.so");
		#[cfg(target_os = "macos")]
		assert_eq!(name, "libgsc.dylib");
		#[cfg(target_os = "windows")]
		assert_eq!(name, "gsc.dll");
	}

	#[test]
	fn test_library_name_sanitizes_dashes() {
		assert!(grammar_library_name("tree-sitter-gsc").contains("tree_sitter_gsc"));
	}

	#[test]
	fn test_cache_dir_is_some() {
		#[cfg(unix)]
		assert!(cache_dir().is_some());
	}

	#[test]
	fn test_load_missing_grammar_is_not_found() {
		let err = load_grammar("no-such-grammar").unwrap_err();
		assert!(matches!(err, GrammarError::NotFound(_)));
	}

	#[test]
	fn test_load_non_library_file_is_load_error() {
		let dir = tempfile::tempdir().unwrap();
		let lib_path = dir.path().join(grammar_library_name("gsc"));
		std::fs::write(&lib_path, b"not a shared library").unwrap();

		let err = load_grammar_from_path(&lib_path, "gsc").unwrap_err();
		assert!(matches!(err, GrammarError::LoadError(_)));
	}

	#[test]
	fn test_resolve_source_falls_back_to_builtin() {
		// No compiled library for a bogus name on any search path.
		match resolve_grammar_source("no-such-grammar") {
			GrammarSource::Builtin(name) => assert_eq!(name, "gsc"),
			GrammarSource::Library(path) => panic!("unexpected library at {}", path.display()),
		}
	}

	#[cfg(unix)]
	#[test]
	fn test_loaded_grammar_exposes_non_null_language() {
		let dir = tempfile::tempdir().unwrap();
		let Some(lib) = compile_stub(
			dir.path(),
			"const void *tree_sitter_gsc(void) { static int tables; return &tables; }\n",
		) else {
			return;
		};

		let grammar = load_grammar_from_path(&lib, "gsc").unwrap();
		assert_eq!(grammar.name(), "gsc");
		assert!(!grammar.as_ptr().is_null());
	}

	#[cfg(unix)]
	#[test]
	fn test_null_language_pointer_is_load_error() {
		let dir = tempfile::tempdir().unwrap();
		let Some(lib) = compile_stub(
			dir.path(),
			"const void *tree_sitter_gsc(void) { return 0; }\n",
		) else {
			return;
		};

		let err = load_grammar_from_path(&lib, "gsc").unwrap_err();
		match err {
			GrammarError::LoadError(msg) => assert!(msg.contains("null language")),
			other => panic!("expected LoadError, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[test]
	fn test_library_without_entry_point_is_missing_symbol() {
		let dir = tempfile::tempdir().unwrap();
		let Some(lib) = compile_stub(
			dir.path(),
			"const void *tree_sitter_lua(void) { return 0; }\n",
		) else {
			return;
		};

		let err = load_grammar_from_path(&lib, "gsc").unwrap_err();
		assert!(matches!(err, GrammarError::MissingSymbol(_)));
	}
}
