//! Language metadata and file-type association.
//!
//! Connects file types to the GSC grammar: which extensions belong to the
//! language, its comment delimiters, and a lazily loaded grammar handle.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::warn;

use crate::grammar::{Grammar, load_grammar_or_build};

/// Index of a registered language in a [`LanguageLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageId(u32);

impl LanguageId {
	fn idx(self) -> usize {
		self.0 as usize
	}
}

/// Language data with a lazily-loaded grammar handle.
#[derive(Debug)]
pub struct LanguageData {
	/// Language name (e.g. "gsc").
	pub name: String,
	/// Grammar name, usually the same as the language name.
	pub grammar_name: String,
	/// File extensions (without dot).
	pub extensions: Vec<String>,
	/// Line comment token(s).
	pub comment_tokens: Vec<String>,
	/// Block comment tokens (start, end).
	pub block_comment: Option<(String, String)>,
	/// Dev block delimiters, compiled out of shipping builds.
	pub dev_block: Option<(String, String)>,
	/// Documentation comment delimiters.
	pub doc_comment: Option<(String, String)>,
	grammar: OnceCell<Option<Grammar>>,
}

impl LanguageData {
	/// Metadata for GSC (Game Script Code), the Black Ops III script language.
	pub fn gsc() -> Self {
		Self {
			name: "gsc".to_string(),
			grammar_name: "gsc".to_string(),
			extensions: vec!["gsc".to_string(), "csc".to_string(), "gsh".to_string()],
			comment_tokens: vec!["//".to_string()],
			block_comment: Some(("/*".to_string(), "*/".to_string())),
			dev_block: Some(("/#".to_string(), "#/".to_string())),
			doc_comment: Some(("/@".to_string(), "@/".to_string())),
			grammar: OnceCell::new(),
		}
	}

	/// Returns the grammar handle, loading (and building) it on first access.
	///
	/// The outcome is cached either way: a failed load is logged once and
	/// stays `None` for the lifetime of this value.
	pub fn grammar(&self) -> Option<&Grammar> {
		self.grammar
			.get_or_init(|| match load_grammar_or_build(&self.grammar_name) {
				Ok(grammar) => Some(grammar),
				Err(e) => {
					warn!(grammar = %self.grammar_name, error = %e, "Failed to load grammar");
					None
				}
			})
			.as_ref()
	}
}

/// Registry of languages with extension-based path lookup.
#[derive(Debug, Default)]
pub struct LanguageLoader {
	languages: Vec<LanguageData>,
	by_extension: HashMap<String, LanguageId>,
}

impl LanguageLoader {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a loader with the builtin languages registered.
	pub fn with_builtin_languages() -> Self {
		let mut loader = Self::new();
		loader.register(LanguageData::gsc());
		loader
	}

	/// Registers a language and indexes its extensions.
	pub fn register(&mut self, language: LanguageData) -> LanguageId {
		let id = LanguageId(self.languages.len() as u32);
		for ext in &language.extensions {
			self.by_extension.insert(ext.clone(), id);
		}
		self.languages.push(language);
		id
	}

	/// Gets a language by ID.
	pub fn get(&self, id: LanguageId) -> Option<&LanguageData> {
		self.languages.get(id.idx())
	}

	/// Finds a language by name.
	pub fn language_for_name(&self, name: &str) -> Option<LanguageId> {
		self.languages
			.iter()
			.position(|language| language.name == name)
			.map(|idx| LanguageId(idx as u32))
	}

	/// Finds a language by file extension.
	pub fn language_for_path(&self, path: &Path) -> Option<LanguageId> {
		path.extension()
			.and_then(|ext| ext.to_str())
			.and_then(|ext| self.by_extension.get(ext).copied())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_gsc_defaults() {
		let data = LanguageData::gsc();
		assert_eq!(data.name, "gsc");
		assert_eq!(data.grammar_name, "gsc");
		assert!(data.extensions.iter().any(|e| e == "gsc"));
		assert_eq!(data.dev_block, Some(("/#".to_string(), "#/".to_string())));
	}

	#[test]
	fn test_loader_registration() {
		let loader = LanguageLoader::with_builtin_languages();

		let id = loader.language_for_name("gsc").unwrap();
		assert_eq!(loader.get(id).unwrap().name, "gsc");

		assert_eq!(loader.language_for_path(Path::new("zm_tomb.gsc")), Some(id));
		assert_eq!(loader.language_for_path(Path::new("clientfield.csc")), Some(id));
		assert_eq!(loader.language_for_path(Path::new("shared.gsh")), Some(id));
		assert_eq!(loader.language_for_path(Path::new("readme.md")), None);
	}

	#[test]
	fn test_unknown_language_name_is_none() {
		let loader = LanguageLoader::with_builtin_languages();
		assert_eq!(loader.language_for_name("lua"), None);
	}

	#[test]
	fn test_failed_grammar_load_is_cached() {
		// A grammar with no config entry cannot be built, so the handle must
		// come back `None` both times without retrying the pipeline.
		let mut data = LanguageData::gsc();
		data.grammar_name = "not-a-configured-grammar".to_string();

		assert!(data.grammar().is_none());
		assert!(data.grammar().is_none());
	}
}
