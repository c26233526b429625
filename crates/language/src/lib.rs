// Grammar operations must report through tracing, not stderr.
#![deny(clippy::print_stderr)]

//! GSC (Game Script Code) language support.
//!
//! This crate locates, builds, and loads the compiled tree-sitter grammar for
//! GSC, the script language of Call of Duty: Black Ops III, and exposes the
//! language metadata that maps files to it.
//!
//! # Architecture
//!
//! * [`grammar`]: Dynamic grammar loading from shared libraries
//! * [`manifest`]: Builtin compiled grammar manifest
//! * [`build`]: Grammar fetching and compilation
//! * [`language`]: Language metadata (extensions, comment tokens)
//!
//! The grammar itself ships in two forms. The embedded manifest describes the
//! compiled grammar (rules, extras, conflicts) and always loads; the shared
//! library carries the parser tables and is fetched and compiled on demand.

pub mod build;
pub mod grammar;
pub mod language;
pub mod manifest;

pub use build::{
	BuildStatus, FetchStatus, GrammarBuildError, GrammarConfig, build_grammar, fetch_grammar,
	load_grammar_configs,
};
pub use grammar::{
	Grammar, GrammarError, GrammarSource, cache_dir, grammar_search_paths, load_grammar,
	load_grammar_or_build, resolve_grammar_source, runtime_dir,
};
pub use language::{LanguageData, LanguageId, LanguageLoader};
pub use manifest::{GrammarManifest, ManifestError};
