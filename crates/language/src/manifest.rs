//! Builtin compiled grammar manifest.
//!
//! `tree-sitter generate` emits parser tables together with a description of
//! the grammar. The manifest is that description: the rule inventory, extras,
//! conflict sets, field names, and the word token. It is embedded in the
//! binary so the grammar definition can be verified and inspected without a
//! compiled shared library on disk.

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

/// Embedded GSC manifest from `runtime/grammar/gsc.json`.
const GSC_MANIFEST: &str = include_str!("../../../runtime/grammar/gsc.json");

/// Errors that can occur when loading a grammar manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
	/// Manifest is not valid JSON.
	#[error("failed to parse grammar manifest: {0}")]
	Parse(#[from] serde_json::Error),

	/// Manifest parsed but describes an inconsistent grammar.
	#[error("invalid grammar manifest: {0}")]
	Validation(String),
}

/// Architecture-independent description of a compiled grammar.
///
/// A successfully loaded manifest is always internally consistent: the entry
/// rule, word token, extras, and every conflict member resolve to defined
/// rules, and rule names are unique.
#[derive(Debug, Clone, Deserialize)]
pub struct GrammarManifest {
	/// Grammar name (e.g. "gsc").
	pub name: String,
	/// The rule parsing starts from.
	pub entry: String,
	/// Keyword-extraction token, if the grammar declares one.
	pub word: Option<String>,
	/// All named rules, hidden rules included (leading underscore).
	pub rules: Vec<String>,
	/// Rules allowed anywhere between tokens (comments, dev blocks).
	#[serde(default)]
	pub extras: Vec<String>,
	/// Rule sets the grammar declares GLR conflicts for.
	#[serde(default)]
	pub conflicts: Vec<Vec<String>>,
	/// Field names used across all rules.
	#[serde(default)]
	pub fields: Vec<String>,
}

impl GrammarManifest {
	/// Loads and validates the embedded GSC grammar manifest.
	///
	/// This is the no-argument accessor the load check exercises: it either
	/// returns a usable manifest or an error, never an empty handle.
	pub fn builtin() -> Result<Self, ManifestError> {
		Self::from_json(GSC_MANIFEST)
	}

	/// Parses and validates a manifest from JSON text.
	pub fn from_json(json: &str) -> Result<Self, ManifestError> {
		let manifest: Self = serde_json::from_str(json)?;
		manifest.validate()?;
		Ok(manifest)
	}

	/// Returns true if the grammar defines the named rule.
	pub fn has_rule(&self, name: &str) -> bool {
		self.rules.iter().any(|r| r == name)
	}

	/// Number of named rules in the grammar.
	pub fn rule_count(&self) -> usize {
		self.rules.len()
	}

	fn validate(&self) -> Result<(), ManifestError> {
		if self.name.is_empty() {
			return Err(ManifestError::Validation("empty grammar name".into()));
		}
		if self.rules.is_empty() {
			return Err(ManifestError::Validation("no rules defined".into()));
		}

		let mut seen = HashSet::new();
		for rule in &self.rules {
			if !seen.insert(rule.as_str()) {
				return Err(ManifestError::Validation(format!("duplicate rule: {rule}")));
			}
		}

		if !seen.contains(self.entry.as_str()) {
			return Err(ManifestError::Validation(format!(
				"entry rule not defined: {}",
				self.entry
			)));
		}

		if let Some(word) = &self.word
			&& !seen.contains(word.as_str())
		{
			return Err(ManifestError::Validation(format!("word token not defined: {word}")));
		}

		for extra in &self.extras {
			if !seen.contains(extra.as_str()) {
				return Err(ManifestError::Validation(format!("extra not defined: {extra}")));
			}
		}

		for conflict in &self.conflicts {
			if conflict.len() < 2 {
				return Err(ManifestError::Validation(
					"conflict set with fewer than two members".into(),
				));
			}
			for member in conflict {
				if !seen.contains(member.as_str()) {
					return Err(ManifestError::Validation(format!(
						"conflict references undefined rule: {member}"
					)));
				}
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builtin_manifest_loads() {
		let manifest = GrammarManifest::builtin().expect("Error loading Gsc grammar");
		assert_eq!(manifest.name, "gsc");
		assert_eq!(manifest.entry, "source_file");
		assert_eq!(manifest.word.as_deref(), Some("identifier"));
	}

	#[test]
	fn test_builtin_manifest_has_core_rules() {
		let manifest = GrammarManifest::builtin().unwrap();
		for rule in [
			"function_definition",
			"class_definition",
			"wait_statement",
			"notify_statement",
			"thread_expression",
			"dev_block",
		] {
			assert!(manifest.has_rule(rule), "missing rule: {rule}");
		}
		assert!(!manifest.has_rule("lambda_expression"));
	}

	#[test]
	fn test_invalid_json_is_parse_error() {
		let err = GrammarManifest::from_json("{ not json").unwrap_err();
		assert!(matches!(err, ManifestError::Parse(_)));
	}

	#[test]
	fn test_undefined_entry_rule_fails_validation() {
		let json = r#"{"name": "gsc", "entry": "missing", "word": null, "rules": ["a"]}"#;
		let err = GrammarManifest::from_json(json).unwrap_err();
		assert!(matches!(err, ManifestError::Validation(_)));
	}

	#[test]
	fn test_duplicate_rule_fails_validation() {
		let json = r#"{"name": "gsc", "entry": "a", "word": null, "rules": ["a", "a"]}"#;
		let err = GrammarManifest::from_json(json).unwrap_err();
		assert!(matches!(err, ManifestError::Validation(_)));
	}

	#[test]
	fn test_undefined_conflict_member_fails_validation() {
		let json = r#"{
			"name": "gsc",
			"entry": "a",
			"word": null,
			"rules": ["a", "b"],
			"conflicts": [["a", "missing"]]
		}"#;
		let err = GrammarManifest::from_json(json).unwrap_err();
		assert!(matches!(err, ManifestError::Validation(_)));
	}

	#[test]
	fn test_extras_resolve_to_rules() {
		let manifest = GrammarManifest::builtin().unwrap();
		for extra in &manifest.extras {
			assert!(manifest.has_rule(extra));
		}
	}
}
