#![allow(unused_crate_dependencies)]

use gsc_language::{GrammarError, GrammarManifest, LanguageLoader, load_grammar};

#[test]
fn can_load_grammar() {
	let grammar = GrammarManifest::builtin().expect("Error loading Gsc grammar");
	assert_eq!(grammar.name, "gsc");
	assert!(grammar.rule_count() > 0);
}

#[test]
fn repeated_loads_yield_the_same_grammar() {
	let first = GrammarManifest::builtin().expect("Error loading Gsc grammar");
	let second = GrammarManifest::builtin().expect("Error loading Gsc grammar");

	assert_eq!(first.rule_count(), second.rule_count());
	assert_eq!(first.entry, second.entry);
	assert_eq!(first.conflicts, second.conflicts);
}

#[test]
fn grammar_covers_gsc_constructs() {
	let grammar = GrammarManifest::builtin().expect("Error loading Gsc grammar");

	// Script-engine statements that distinguish GSC from C-family languages.
	for rule in [
		"wait_statement",
		"waittill_statement",
		"notify_statement",
		"endon_statement",
		"thread_expression",
		"preprocessor_using",
		"anim_reference",
	] {
		assert!(grammar.has_rule(rule), "missing rule: {rule}");
	}
}

#[test]
fn missing_shared_library_reports_not_found() {
	// The compiled library is not present in a clean checkout; the loader
	// must say so rather than hand back an empty handle.
	match load_grammar("gsc-does-not-exist") {
		Err(GrammarError::NotFound(name)) => assert_eq!(name, "gsc-does-not-exist"),
		other => panic!("expected NotFound, got {other:?}"),
	}
}

#[test]
fn gsc_files_map_to_the_grammar() {
	let loader = LanguageLoader::with_builtin_languages();
	let id = loader.language_for_name("gsc").expect("gsc is registered");
	let data = loader.get(id).unwrap();

	assert_eq!(data.grammar_name, "gsc");

	let manifest = GrammarManifest::builtin().expect("Error loading Gsc grammar");
	assert_eq!(manifest.name, data.grammar_name);
}
